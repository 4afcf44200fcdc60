use std::path::Path;

use anyhow::Context;
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries;
use crate::models::{PatientId, Slot};
use crate::services::scheduling;

/// One row of the clinic's availability export.
#[derive(Debug, Deserialize)]
struct SlotRecord {
    date_slot: String,
    doctor_name: String,
    specialization: String,
    is_available: String,
    #[serde(default)]
    patient_to_attend: Option<String>,
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Pandas writes integer columns with missing values as floats (`1234567.0`).
fn parse_patient(raw: Option<&str>) -> anyhow::Result<Option<PatientId>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let digits = raw.strip_suffix(".0").unwrap_or(raw);
    let value: i64 = digits
        .parse()
        .with_context(|| format!("invalid patient_to_attend: {raw}"))?;
    PatientId::new(value)
        .map(Some)
        .ok_or_else(|| anyhow::anyhow!("patient_to_attend {raw}: {}", PatientId::FORMAT_HINT))
}

/// Rows are rewritten into the engine's canonical spelling so that seeded
/// slots are found by the same lookups the handlers use.
fn into_slot(record: SlotRecord) -> anyhow::Result<Slot> {
    let parsed = scheduling::parse_stored_slot(&record.date_slot)
        .with_context(|| format!("invalid date_slot: {}", record.date_slot))?;
    let is_available = parse_flag(&record.is_available)
        .with_context(|| format!("invalid is_available: {}", record.is_available))?;
    let patient_to_attend = parse_patient(record.patient_to_attend.as_deref())?;

    let slot = Slot {
        date_slot: scheduling::canonical_slot(&parsed),
        doctor_name: scheduling::normalize_name(&record.doctor_name)?,
        specialization: scheduling::normalize_specialization(&record.specialization)?,
        is_available,
        patient_to_attend,
    };
    if !slot.is_consistent() {
        anyhow::bail!(
            "slot {} / {} has is_available={} but patient_to_attend={:?}",
            slot.doctor_name,
            slot.date_slot,
            slot.is_available,
            slot.patient_to_attend
        );
    }
    Ok(slot)
}

/// Loads an availability CSV into the slot table, upserting on
/// (doctor_name, date_slot). All rows are written in one transaction.
pub fn import_csv(conn: &Connection, path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open slots CSV: {}", path.display()))?;

    let tx = conn
        .unchecked_transaction()
        .context("failed to start seed transaction")?;

    let mut count = 0;
    for (index, record) in reader.deserialize::<SlotRecord>().enumerate() {
        let line = index + 2;
        let record = record.with_context(|| format!("malformed CSV row at line {line}"))?;
        let slot = into_slot(record).with_context(|| format!("rejected CSV row at line {line}"))?;
        queries::upsert_slot(&tx, &slot)?;
        count += 1;
    }

    tx.commit().context("failed to commit seeded slots")?;
    tracing::info!(count, path = %path.display(), "seeded slots");
    Ok(count)
}
