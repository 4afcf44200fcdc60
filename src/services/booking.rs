use std::sync::OnceLock;

use regex::Regex;
use tokio::time::timeout;

use crate::db::queries;
use crate::models::conversation::last_human;
use crate::models::{AppliedOperation, ChatMessage, Conversation, PatientId, Route};
use crate::services::ai::responder::{Operation, ToolRequest};
use crate::services::scheduling::{self, SchedulingError};
use crate::state::AppState;

pub const FORMAT_REQUEST: &str =
    "Please provide the appointment date and time in DD-MM-YYYY HH:MM format.";
pub const RESPONDER_FAILURE: &str =
    "Sorry, I couldn't process that booking request right now. Please try again.";
const NO_ACTION: &str =
    "I couldn't tell whether you want to book, cancel or reschedule. Could you rephrase?";

#[derive(Debug, Clone)]
pub struct BookingReply {
    pub message: ChatMessage,
    pub applied: Vec<AppliedOperation>,
}

pub(crate) fn datetime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d{2}-\d{2}-\d{4}\s+\d{2}:\d{2}").expect("valid datetime regex")
    })
}

pub fn has_datetime(text: &str) -> bool {
    datetime_pattern().is_match(text)
}

pub fn system_prompt(patient: PatientId) -> String {
    format!(
        "You are a booking agent for a dental clinic.\n\n\
         RULES:\n\
         - User ID is FIXED: {patient}. Never ask for, invent or substitute another ID\n\
         - Use ONLY the provided operations\n\
         - NEVER invent values the patient did not give\n\
         - Every datetime MUST be DD-MM-YYYY HH:MM"
    )
}

fn reply(content: impl Into<String>, applied: Vec<AppliedOperation>) -> BookingReply {
    BookingReply {
        message: ChatMessage::assistant(content, Route::Booking.node_name()),
        applied,
    }
}

/// Runs a booking-shaped request. Negative outcomes (slot taken, nothing to
/// cancel) become reply text; only slot store failures are errors.
pub async fn handle(
    state: &AppState,
    patient: PatientId,
    conversation: &Conversation,
) -> anyhow::Result<BookingReply> {
    let window = conversation.window(state.config.history_window);

    let latest = last_human(window).map(|m| m.content.as_str()).unwrap_or("");
    if !has_datetime(latest) {
        tracing::info!(patient_id = %patient, "booking request without date and time");
        return Ok(reply(FORMAT_REQUEST, vec![]));
    }

    let doctors = {
        let conn = state.db()?;
        queries::list_doctors(&conn)?
    };

    let prompt = system_prompt(patient);
    let request = ToolRequest {
        system_prompt: &prompt,
        messages: window,
        operations: &Operation::ALL,
        doctors: &doctors,
    };

    let plan = match timeout(
        state.config.collaborator_timeout,
        state.responder.plan(&request),
    )
    .await
    {
        Ok(Ok(plan)) => plan,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, patient_id = %patient, "tool responder failed");
            return Ok(reply(RESPONDER_FAILURE, vec![]));
        }
        Err(_) => {
            tracing::warn!(patient_id = %patient, "tool responder timed out");
            return Ok(reply(RESPONDER_FAILURE, vec![]));
        }
    };

    if plan.calls.is_empty() {
        let text = plan
            .reply
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| NO_ACTION.to_string());
        return Ok(reply(text, vec![]));
    }

    let mut lines = Vec::with_capacity(plan.calls.len());
    let mut applied = Vec::new();

    for call in plan.calls {
        let operation = call.operation();
        let intent = call.into_intent(patient);

        let outcome = {
            let conn = state.db()?;
            scheduling::apply(&conn, &intent)
        };

        match outcome {
            Ok(op) => {
                lines.push(op.describe());
                applied.push(op);
            }
            Err(SchedulingError::Store(e)) => return Err(e),
            Err(e) => {
                tracing::info!(operation = ?operation, patient_id = %patient, outcome = %e, "operation not applied");
                lines.push(e.to_string());
            }
        }
    }

    Ok(reply(lines.join("\n"), applied))
}
