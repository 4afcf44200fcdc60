use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PatientId, RunState};

/// Outcome awaiting an explicit accept/reject from the patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingConfirmation {
    pub request_id: Uuid,
    pub patient_id: PatientId,
    pub proposed_response: String,
    pub state: RunState,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
