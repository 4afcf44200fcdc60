//! Slot booking engine.
//!
//! Every operation re-reads the store; nothing is cached between calls. Each
//! mutation is a single compare-and-set statement, and reschedule runs both of
//! its statements inside one transaction so the old slot is never lost when
//! the new one cannot be claimed.
//!
//! This module is also the only place that knows the storage datetime format
//! (`DD-MM-YYYY H.MM`); callers always speak `DD-MM-YYYY HH:MM`.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{AppliedOperation, DoctorAvailability, Intent, PatientId, Slot, SlotView};

const DATE_FORMAT: &str = "%d-%m-%Y";
const DATETIME_FORMAT: &str = "%d-%m-%Y %H:%M";

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("{0}")]
    Validation(String),

    #[error("No available appointment for that time.")]
    SlotUnavailable,

    #[error("No matching appointment found.")]
    NotFound,

    #[error("slot store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl SchedulingError {
    pub fn is_store_failure(&self) -> bool {
        matches!(self, SchedulingError::Store(_))
    }
}

impl From<rusqlite::Error> for SchedulingError {
    fn from(e: rusqlite::Error) -> Self {
        SchedulingError::Store(e.into())
    }
}

// ── Validation & format conversion ──

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").expect("valid date regex"))
}

fn datetime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{2}-\d{2}-\d{4} \d{2}:\d{2}$").expect("valid datetime regex")
    })
}

pub fn validate_date(date: &str) -> Result<NaiveDate, SchedulingError> {
    let date = date.trim();
    if !date_pattern().is_match(date) {
        return Err(SchedulingError::Validation(
            "Date must be in DD-MM-YYYY format".to_string(),
        ));
    }
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| SchedulingError::Validation(format!("{date} is not a valid calendar date")))
}

pub fn validate_datetime(datetime: &str) -> Result<NaiveDateTime, SchedulingError> {
    let datetime = datetime.split_whitespace().collect::<Vec<_>>().join(" ");
    if !datetime_pattern().is_match(&datetime) {
        return Err(SchedulingError::Validation(
            "Datetime must be in DD-MM-YYYY HH:MM format".to_string(),
        ));
    }
    NaiveDateTime::parse_from_str(&datetime, DATETIME_FORMAT)
        .map_err(|_| SchedulingError::Validation(format!("{datetime} is not a valid date and time")))
}

/// Doctor names and specializations are matched lowercase; specializations
/// use underscores (`general dentist` -> `general_dentist`).
pub fn normalize_name(name: &str) -> Result<String, SchedulingError> {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if name.is_empty() {
        return Err(SchedulingError::Validation("Doctor name is required".to_string()));
    }
    Ok(name)
}

pub fn normalize_specialization(specialization: &str) -> Result<String, SchedulingError> {
    let spec = specialization
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    if spec.is_empty() {
        return Err(SchedulingError::Validation("Specialization is required".to_string()));
    }
    Ok(spec)
}

/// `01-06-2025 09:05` -> `01-06-2025 9.05`
fn to_storage(datetime: &NaiveDateTime) -> String {
    format!(
        "{} {}.{:02}",
        datetime.format(DATE_FORMAT),
        datetime.hour(),
        datetime.minute()
    )
}

fn storage_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a stored `DD-MM-YYYY H.MM` value.
pub fn parse_stored_slot(date_slot: &str) -> Option<NaiveDateTime> {
    let (date, time) = date_slot.trim().split_once(' ')?;
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    let (hour, minute) = time.split_once('.')?;
    if minute.len() != 2 {
        return None;
    }
    let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
    Some(date.and_time(time))
}

/// Storage form of a parsed slot time. Every row written to the slot table
/// goes through here so lookups and listings agree on one spelling.
pub fn canonical_slot(datetime: &NaiveDateTime) -> String {
    to_storage(datetime)
}

/// Storage form of a user-facing `DD-MM-YYYY HH:MM` value.
pub fn storage_slot(datetime: &str) -> Result<String, SchedulingError> {
    Ok(to_storage(&validate_datetime(datetime)?))
}

fn display_time(date_slot: &str) -> String {
    match parse_stored_slot(date_slot) {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => date_slot.to_string(),
    }
}

fn display_datetime(datetime: &NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

pub fn to_view(slot: Slot) -> SlotView {
    let parsed = parse_stored_slot(&slot.date_slot);
    SlotView {
        date: parsed
            .map(|dt| dt.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| slot.date_slot.chars().take(10).collect()),
        time: display_time(&slot.date_slot),
        doctor_name: slot.doctor_name,
        specialization: slot.specialization,
        is_available: slot.is_available,
        patient_to_attend: slot.patient_to_attend,
    }
}

// ── Reads ──

/// Open `HH:MM` times for a doctor on a `DD-MM-YYYY` day.
pub fn available_by_doctor(
    conn: &Connection,
    doctor: &str,
    date: &str,
) -> Result<Vec<String>, SchedulingError> {
    let doctor = normalize_name(doctor)?;
    let date = validate_date(date)?;

    let slots = queries::available_slots_for_doctor(conn, &doctor, &storage_date(&date))?;
    Ok(slots.iter().map(|s| display_time(&s.date_slot)).collect())
}

/// Open times for a specialization, grouped per doctor in first-seen order.
pub fn available_by_specialization(
    conn: &Connection,
    specialization: &str,
    date: &str,
) -> Result<Vec<DoctorAvailability>, SchedulingError> {
    let specialization = normalize_specialization(specialization)?;
    let date = validate_date(date)?;

    let slots =
        queries::available_slots_for_specialization(conn, &specialization, &storage_date(&date))?;

    let mut grouped: Vec<DoctorAvailability> = Vec::new();
    for slot in slots {
        let time = display_time(&slot.date_slot);
        match grouped.iter_mut().find(|g| g.doctor_name == slot.doctor_name) {
            Some(group) => group.times.push(time),
            None => grouped.push(DoctorAvailability {
                doctor_name: slot.doctor_name,
                times: vec![time],
            }),
        }
    }
    Ok(grouped)
}

pub fn list_slots(
    conn: &Connection,
    date: &str,
    doctor: Option<&str>,
) -> Result<Vec<SlotView>, SchedulingError> {
    let date = validate_date(date)?;
    let doctor = doctor.map(normalize_name).transpose()?;

    let slots = queries::list_slots(conn, &storage_date(&date), doctor.as_deref())?;
    Ok(slots.into_iter().map(to_view).collect())
}

// ── Mutations ──

pub fn book(
    conn: &Connection,
    doctor: &str,
    patient: PatientId,
    datetime: &str,
) -> Result<AppliedOperation, SchedulingError> {
    let doctor = normalize_name(doctor)?;
    let datetime = validate_datetime(datetime)?;

    if !queries::occupy_slot(conn, &doctor, &to_storage(&datetime), patient)? {
        tracing::info!(doctor = %doctor, patient_id = %patient, date_slot = %to_storage(&datetime), "slot unavailable");
        return Err(SchedulingError::SlotUnavailable);
    }

    tracing::info!(doctor = %doctor, patient_id = %patient, date_slot = %to_storage(&datetime), "slot booked");
    Ok(AppliedOperation::Booked {
        doctor,
        datetime: display_datetime(&datetime),
    })
}

pub fn cancel(
    conn: &Connection,
    doctor: &str,
    patient: PatientId,
    datetime: &str,
) -> Result<AppliedOperation, SchedulingError> {
    let doctor = normalize_name(doctor)?;
    let datetime = validate_datetime(datetime)?;

    if !queries::release_slot(conn, &doctor, &to_storage(&datetime), patient)? {
        tracing::info!(doctor = %doctor, patient_id = %patient, date_slot = %to_storage(&datetime), "no appointment to cancel");
        return Err(SchedulingError::NotFound);
    }

    tracing::info!(doctor = %doctor, patient_id = %patient, date_slot = %to_storage(&datetime), "slot released");
    Ok(AppliedOperation::Cancelled {
        doctor,
        datetime: display_datetime(&datetime),
    })
}

/// Moves a patient's appointment atomically. A missing old appointment fails
/// with `NotFound` before the new slot is touched; an unavailable new slot
/// rolls the release back and fails with `SlotUnavailable`.
pub fn reschedule(
    conn: &Connection,
    doctor: &str,
    patient: PatientId,
    old_datetime: &str,
    new_datetime: &str,
) -> Result<AppliedOperation, SchedulingError> {
    let doctor = normalize_name(doctor)?;
    let old = validate_datetime(old_datetime)?;
    let new = validate_datetime(new_datetime)?;

    let tx = conn.unchecked_transaction()?;

    if !queries::release_slot(&tx, &doctor, &to_storage(&old), patient)? {
        return Err(SchedulingError::NotFound);
    }

    if !queries::occupy_slot(&tx, &doctor, &to_storage(&new), patient)? {
        tx.rollback()?;
        tracing::info!(doctor = %doctor, patient_id = %patient, date_slot = %to_storage(&new), "reschedule target unavailable, kept original slot");
        return Err(SchedulingError::SlotUnavailable);
    }

    tx.commit()?;

    tracing::info!(doctor = %doctor, patient_id = %patient, from = %to_storage(&old), to = %to_storage(&new), "slot rescheduled");
    Ok(AppliedOperation::Rescheduled {
        doctor,
        from: display_datetime(&old),
        to: display_datetime(&new),
    })
}

/// Dispatches a booking-shaped intent to the matching mutation.
pub fn apply(conn: &Connection, intent: &Intent) -> Result<AppliedOperation, SchedulingError> {
    match intent {
        Intent::Book {
            doctor,
            patient_id,
            datetime,
        } => book(conn, doctor, *patient_id, datetime),
        Intent::Cancel {
            doctor,
            patient_id,
            datetime,
        } => cancel(conn, doctor, *patient_id, datetime),
        Intent::Reschedule {
            doctor,
            patient_id,
            old_datetime,
            new_datetime,
        } => reschedule(conn, doctor, *patient_id, old_datetime, new_datetime),
        Intent::AvailabilityByDoctor { .. }
        | Intent::AvailabilityBySpecialization { .. }
        | Intent::Unrecognized => Err(SchedulingError::Validation(
            "Only book, cancel and reschedule can change appointments".to_string(),
        )),
    }
}

/// Applies the inverse of a committed operation.
pub fn revert(
    conn: &Connection,
    patient: PatientId,
    op: &AppliedOperation,
) -> Result<AppliedOperation, SchedulingError> {
    match op {
        AppliedOperation::Booked { doctor, datetime } => cancel(conn, doctor, patient, datetime),
        AppliedOperation::Cancelled { doctor, datetime } => book(conn, doctor, patient, datetime),
        AppliedOperation::Rescheduled { doctor, from, to } => {
            reschedule(conn, doctor, patient, to, from)
        }
    }
}
