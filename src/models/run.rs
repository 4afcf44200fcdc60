use serde::{Deserialize, Serialize};

use super::{Conversation, PatientId};

/// Which handler the supervisor sent a message to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Information,
    Booking,
}

impl Route {
    pub fn node_name(&self) -> &'static str {
        match self {
            Route::Information => "information_node",
            Route::Booking => "booking_node",
        }
    }
}

/// A slot mutation that has been committed to the store. Datetimes are in
/// user-facing `DD-MM-YYYY HH:MM` format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedOperation {
    Booked {
        doctor: String,
        datetime: String,
    },
    Cancelled {
        doctor: String,
        datetime: String,
    },
    Rescheduled {
        doctor: String,
        from: String,
        to: String,
    },
}

impl AppliedOperation {
    pub fn describe(&self) -> String {
        match self {
            AppliedOperation::Booked { doctor, datetime } => {
                format!("Appointment successfully booked with {doctor} on {datetime}.")
            }
            AppliedOperation::Cancelled { doctor, datetime } => {
                format!("Appointment with {doctor} on {datetime} cancelled successfully.")
            }
            AppliedOperation::Rescheduled { doctor, from, to } => {
                format!("Appointment with {doctor} rescheduled from {from} to {to}.")
            }
        }
    }
}

/// Shared state threaded through one supervisor run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub patient_id: PatientId,
    /// Text of the human message most recently routed by the supervisor.
    pub query: String,
    pub route: Option<Route>,
    pub messages: Conversation,
    #[serde(default)]
    pub applied: Vec<AppliedOperation>,
    #[serde(default)]
    pub steps: usize,
}

impl RunState {
    pub fn new(patient_id: PatientId, query: &str) -> Self {
        Self {
            patient_id,
            query: String::new(),
            route: None,
            messages: Conversation::with_query(query),
            applied: Vec::new(),
            steps: 0,
        }
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.is_assistant())
            .map(|m| m.content.as_str())
    }

    /// Runs that committed a slot mutation need explicit human sign-off.
    pub fn needs_confirmation(&self) -> bool {
        self.route == Some(Route::Booking) && !self.applied.is_empty()
    }
}
