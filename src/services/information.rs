use tokio::time::timeout;

use crate::models::{ChatMessage, DoctorAvailability, Intent, Route};
use crate::services::scheduling::{self, SchedulingError};
use crate::state::AppState;

pub const NO_AVAILABILITY: &str = "No availability found.";
pub const NO_RECORDS: &str = "No availability found in hospital records.";

/// Answers an availability question. Extraction problems degrade to a fixed
/// "nothing found" reply; only slot store failures are returned as errors.
pub async fn handle(state: &AppState, text: &str) -> anyhow::Result<ChatMessage> {
    let node = Route::Information.node_name();

    let extracted = timeout(
        state.config.collaborator_timeout,
        state.extractor.extract_availability(text),
    )
    .await;

    let intent = match extracted {
        Ok(Ok(intent)) => intent,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "intent extraction failed");
            return Ok(ChatMessage::assistant(NO_AVAILABILITY, node));
        }
        Err(_) => {
            tracing::warn!("intent extraction timed out");
            return Ok(ChatMessage::assistant(NO_AVAILABILITY, node));
        }
    };

    tracing::info!(intent = ?intent, "availability query");

    let lookup = {
        let conn = state.db()?;
        match &intent {
            Intent::AvailabilityByDoctor { doctor, date } => {
                scheduling::available_by_doctor(&conn, doctor, date)
                    .map(|times| format_doctor_availability(doctor, date, &times))
            }
            Intent::AvailabilityBySpecialization {
                specialization,
                date,
            } => scheduling::available_by_specialization(&conn, specialization, date)
                .map(|groups| format_specialization_availability(specialization, date, &groups)),
            _ => Ok(NO_AVAILABILITY.to_string()),
        }
    };

    let reply = match lookup {
        Ok(reply) => reply,
        Err(SchedulingError::Store(e)) => return Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "availability lookup rejected extracted values");
            NO_RECORDS.to_string()
        }
    };

    Ok(ChatMessage::assistant(reply, node))
}

pub fn format_doctor_availability(doctor: &str, date: &str, times: &[String]) -> String {
    if times.is_empty() {
        return format!("No availability for {doctor} on {date}.");
    }
    format!("Available slots for {doctor} on {date}: {}", times.join(", "))
}

pub fn format_specialization_availability(
    specialization: &str,
    date: &str,
    groups: &[DoctorAvailability],
) -> String {
    if groups.is_empty() {
        return format!("No availability for {specialization} on {date}.");
    }

    let mut output = format!("Availability for {specialization} on {date}:");
    for group in groups {
        output.push('\n');
        output.push_str(&format!("{}: {}", group.doctor_name, group.times.join(", ")));
    }
    output
}
