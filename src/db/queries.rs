use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{PatientId, PendingConfirmation, RunState, Slot};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Slots ──

pub fn upsert_slot(conn: &Connection, slot: &Slot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO slots (date_slot, doctor_name, specialization, is_available, patient_to_attend)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(doctor_name, date_slot) DO UPDATE SET
           specialization = excluded.specialization,
           is_available = excluded.is_available,
           patient_to_attend = excluded.patient_to_attend",
        params![
            slot.date_slot,
            slot.doctor_name,
            slot.specialization,
            slot.is_available,
            slot.patient_to_attend.map(PatientId::get),
        ],
    )?;
    Ok(())
}

pub fn get_slot(
    conn: &Connection,
    doctor_name: &str,
    date_slot: &str,
) -> anyhow::Result<Option<Slot>> {
    let slot = conn
        .query_row(
            "SELECT date_slot, doctor_name, specialization, is_available, patient_to_attend
             FROM slots WHERE doctor_name = ?1 AND date_slot = ?2",
            params![doctor_name, date_slot],
            parse_slot_row,
        )
        .optional()?;
    Ok(slot)
}

/// Open slots of one doctor on a `DD-MM-YYYY` day, in table order.
pub fn available_slots_for_doctor(
    conn: &Connection,
    doctor_name: &str,
    date: &str,
) -> anyhow::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT date_slot, doctor_name, specialization, is_available, patient_to_attend
         FROM slots
         WHERE doctor_name = ?1 AND substr(date_slot, 1, 10) = ?2 AND is_available = 1
         ORDER BY rowid ASC",
    )?;

    let rows = stmt.query_map(params![doctor_name, date], parse_slot_row)?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

/// Open slots of every doctor with the given specialization, in table order.
pub fn available_slots_for_specialization(
    conn: &Connection,
    specialization: &str,
    date: &str,
) -> anyhow::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT date_slot, doctor_name, specialization, is_available, patient_to_attend
         FROM slots
         WHERE specialization = ?1 AND substr(date_slot, 1, 10) = ?2 AND is_available = 1
         ORDER BY rowid ASC",
    )?;

    let rows = stmt.query_map(params![specialization, date], parse_slot_row)?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

pub fn list_slots(
    conn: &Connection,
    date: &str,
    doctor_name: Option<&str>,
) -> anyhow::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT date_slot, doctor_name, specialization, is_available, patient_to_attend
         FROM slots
         WHERE substr(date_slot, 1, 10) = ?1 AND (?2 IS NULL OR doctor_name = ?2)
         ORDER BY rowid ASC",
    )?;

    let rows = stmt.query_map(params![date, doctor_name], parse_slot_row)?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

pub fn list_all_slots(conn: &Connection) -> anyhow::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT date_slot, doctor_name, specialization, is_available, patient_to_attend
         FROM slots ORDER BY rowid ASC",
    )?;

    let rows = stmt.query_map([], parse_slot_row)?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

/// Distinct doctor names in the order they first appear in the table.
pub fn list_doctors(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT doctor_name FROM slots GROUP BY doctor_name ORDER BY MIN(rowid) ASC",
    )?;

    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut doctors = vec![];
    for row in rows {
        doctors.push(row?);
    }
    Ok(doctors)
}

/// Compare-and-set: claims the slot only if it is still open. Returns whether
/// a row changed.
pub fn occupy_slot(
    conn: &Connection,
    doctor_name: &str,
    date_slot: &str,
    patient: PatientId,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET is_available = 0, patient_to_attend = ?3
         WHERE doctor_name = ?1 AND date_slot = ?2
           AND is_available = 1 AND patient_to_attend IS NULL",
        params![doctor_name, date_slot, patient.get()],
    )?;
    Ok(count > 0)
}

/// Compare-and-set: frees the slot only if `patient` currently holds it.
pub fn release_slot(
    conn: &Connection,
    doctor_name: &str,
    date_slot: &str,
    patient: PatientId,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET is_available = 1, patient_to_attend = NULL
         WHERE doctor_name = ?1 AND date_slot = ?2 AND patient_to_attend = ?3",
        params![doctor_name, date_slot, patient.get()],
    )?;
    Ok(count > 0)
}

fn parse_slot_row(row: &rusqlite::Row) -> rusqlite::Result<Slot> {
    let patient: Option<i64> = row.get(4)?;
    Ok(Slot {
        date_slot: row.get(0)?,
        doctor_name: row.get(1)?,
        specialization: row.get(2)?,
        is_available: row.get(3)?,
        patient_to_attend: patient.and_then(PatientId::new),
    })
}

// ── Pending Confirmations ──

pub fn save_pending(conn: &Connection, pending: &PendingConfirmation) -> anyhow::Result<()> {
    let state_json = serde_json::to_string(&pending.state)?;
    let created_at = pending.created_at.format(TIMESTAMP_FORMAT).to_string();
    let expires_at = pending.expires_at.format(TIMESTAMP_FORMAT).to_string();

    conn.execute(
        "INSERT INTO pending_confirmations (patient_id, request_id, proposed_response, state, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(patient_id) DO UPDATE SET
           request_id = excluded.request_id,
           proposed_response = excluded.proposed_response,
           state = excluded.state,
           created_at = excluded.created_at,
           expires_at = excluded.expires_at",
        params![
            pending.patient_id.get(),
            pending.request_id.to_string(),
            pending.proposed_response,
            state_json,
            created_at,
            expires_at,
        ],
    )?;
    Ok(())
}

/// Unexpired pending entry for a patient, if any.
pub fn get_pending(
    conn: &Connection,
    patient: PatientId,
) -> anyhow::Result<Option<PendingConfirmation>> {
    let now = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
    let row = conn
        .query_row(
            "SELECT request_id, proposed_response, state, created_at, expires_at
             FROM pending_confirmations WHERE patient_id = ?1 AND expires_at > ?2",
            params![patient.get(), now],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((request_id, proposed_response, state_json, created_at, expires_at)) = row else {
        return Ok(None);
    };

    let state: RunState = serde_json::from_str(&state_json)?;

    Ok(Some(PendingConfirmation {
        request_id: request_id.parse()?,
        patient_id: patient,
        proposed_response,
        state,
        created_at: NaiveDateTime::parse_from_str(&created_at, TIMESTAMP_FORMAT)?,
        expires_at: NaiveDateTime::parse_from_str(&expires_at, TIMESTAMP_FORMAT)?,
    }))
}

pub fn delete_pending(conn: &Connection, patient: PatientId) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM pending_confirmations WHERE patient_id = ?1",
        params![patient.get()],
    )?;
    Ok(count > 0)
}

pub fn expire_old_pending(conn: &Connection) -> anyhow::Result<usize> {
    let now = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
    let count = conn.execute(
        "DELETE FROM pending_confirmations WHERE expires_at <= ?1",
        params![now],
    )?;
    Ok(count)
}
