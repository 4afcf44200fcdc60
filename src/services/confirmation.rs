//! Pending confirmations, one per patient.
//!
//! Entries live in `pending_confirmations` and are only touched while the
//! store mutex is held, so `resolve` always sees a whole entry. A newer
//! proposal for the same patient replaces the older one but inherits its
//! unconfirmed changes, so a later reject still reverts everything. Entries
//! past their expiry are treated as absent and their changes stand.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::models::{PatientId, PendingConfirmation, RunState};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("No pending request found.")]
    NoPendingRequest,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub accepted: bool,
    pub entry: PendingConfirmation,
}

pub fn propose(
    conn: &Connection,
    patient: PatientId,
    proposed_response: &str,
    mut state: RunState,
    ttl_minutes: i64,
) -> anyhow::Result<PendingConfirmation> {
    let purged = queries::expire_old_pending(conn)?;
    if purged > 0 {
        tracing::info!(purged, "expired pending confirmations");
    }

    if let Some(prior) = queries::get_pending(conn, patient)? {
        if !prior.state.applied.is_empty() {
            tracing::info!(
                patient_id = %patient,
                replaced = %prior.request_id,
                carried = prior.state.applied.len(),
                "carrying unconfirmed changes into newer proposal"
            );
            let mut applied = prior.state.applied;
            applied.append(&mut state.applied);
            state.applied = applied;
        }
    }

    let now = Utc::now().naive_utc();
    let pending = PendingConfirmation {
        request_id: Uuid::new_v4(),
        patient_id: patient,
        proposed_response: proposed_response.to_string(),
        state,
        created_at: now,
        expires_at: now + Duration::minutes(ttl_minutes),
    };

    queries::save_pending(conn, &pending)?;
    tracing::info!(patient_id = %patient, request_id = %pending.request_id, "confirmation pending");

    Ok(pending)
}

/// Removes and returns the patient's pending entry.
pub fn resolve(
    conn: &Connection,
    patient: PatientId,
    accept: bool,
) -> Result<Resolution, GateError> {
    let tx = conn.unchecked_transaction().map_err(anyhow::Error::from)?;

    let Some(entry) = queries::get_pending(&tx, patient)? else {
        return Err(GateError::NoPendingRequest);
    };
    queries::delete_pending(&tx, patient)?;

    tx.commit().map_err(anyhow::Error::from)?;

    tracing::info!(patient_id = %patient, request_id = %entry.request_id, accept, "confirmation resolved");
    Ok(Resolution {
        accepted: accept,
        entry,
    })
}

pub fn peek(conn: &Connection, patient: PatientId) -> anyhow::Result<Option<PendingConfirmation>> {
    queries::get_pending(conn, patient)
}
