use serde::Serialize;

use crate::errors::AppError;
use crate::models::{PatientId, PendingConfirmation, RunState};
use crate::services::confirmation;
use crate::services::scheduling;
use crate::services::supervisor::{self, SupervisorError};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    AwaitingConfirmation { proposed_response: String },
    Completed { message: String },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmStatus {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfirmOutcome {
    pub status: ConfirmStatus,
    pub message: String,
}

pub fn parse_patient_id(raw: i64) -> Result<PatientId, AppError> {
    PatientId::new(raw).ok_or_else(|| AppError::Validation(PatientId::FORMAT_HINT.to_string()))
}

/// Runs the supervisor over a fresh conversation. Runs that changed a slot
/// are parked behind the confirmation gate; everything else completes.
pub async fn start(state: &AppState, raw_patient: i64, query: &str) -> Result<StartOutcome, AppError> {
    let patient = parse_patient_id(raw_patient)?;
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::Validation("Query must not be empty".to_string()));
    }

    let mut run = RunState::new(patient, query);
    supervisor::run(state, &mut run).await.map_err(|e| match e {
        SupervisorError::StepLimit(_) => AppError::Internal(e.into()),
        SupervisorError::Handler(e) => AppError::Internal(e),
    })?;

    let reply = run
        .last_reply()
        .unwrap_or("Request handled successfully.")
        .to_string();

    if !run.needs_confirmation() {
        return Ok(StartOutcome::Completed { message: reply });
    }

    {
        let conn = state.db()?;
        confirmation::propose(&conn, patient, &reply, run, state.config.pending_ttl_minutes)?;
    }

    Ok(StartOutcome::AwaitingConfirmation {
        proposed_response: reply,
    })
}

/// Accepting keeps the applied changes. Rejecting reverts them newest first;
/// any change that can no longer be reverted is named in the reply.
pub fn confirm(state: &AppState, raw_patient: i64, accept: bool) -> Result<ConfirmOutcome, AppError> {
    let patient = parse_patient_id(raw_patient)?;

    let conn = state.db()?;
    let resolution = confirmation::resolve(&conn, patient, accept)?;

    if resolution.accepted {
        return Ok(ConfirmOutcome {
            status: ConfirmStatus::Confirmed,
            message: "Appointment confirmed successfully.".to_string(),
        });
    }

    let mut reverted = 0;
    let mut failed = Vec::new();
    for op in resolution.entry.state.applied.iter().rev() {
        match scheduling::revert(&conn, patient, op) {
            Ok(_) => reverted += 1,
            Err(e) if e.is_store_failure() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(patient_id = %patient, operation = ?op, error = %e, "could not revert operation");
                failed.push(op.describe());
            }
        }
    }

    let mut message = "Booking cancelled by user.".to_string();
    if reverted > 0 {
        message.push_str(&format!(" Reverted {reverted} change(s)."));
    }
    if !failed.is_empty() {
        message.push_str(&format!(" Could not revert: {}", failed.join(" ")));
    }

    Ok(ConfirmOutcome {
        status: ConfirmStatus::Cancelled,
        message,
    })
}

pub fn peek_pending(state: &AppState, raw_patient: i64) -> Result<Option<PendingConfirmation>, AppError> {
    let patient = parse_patient_id(raw_patient)?;
    let conn = state.db()?;
    Ok(confirmation::peek(&conn, patient)?)
}
