use serde::{Deserialize, Serialize};

use super::PatientId;

/// Structured interpretation of one inbound message. Built per message and
/// consumed immediately; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    AvailabilityByDoctor {
        doctor: String,
        date: String,
    },
    AvailabilityBySpecialization {
        specialization: String,
        date: String,
    },
    Book {
        doctor: String,
        patient_id: PatientId,
        datetime: String,
    },
    Cancel {
        doctor: String,
        patient_id: PatientId,
        datetime: String,
    },
    Reschedule {
        doctor: String,
        patient_id: PatientId,
        old_datetime: String,
        new_datetime: String,
    },
    Unrecognized,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityQueryKind {
    Doctor,
    Specialization,
}

/// Raw shape the extractor is asked to return for availability questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(rename = "type")]
    pub kind: Option<AvailabilityQueryKind>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl AvailabilityQuery {
    pub fn into_intent(self) -> Intent {
        let Some(date) = self.date.filter(|d| !d.trim().is_empty()) else {
            return Intent::Unrecognized;
        };
        match (self.kind, self.doctor_name, self.specialization) {
            (Some(AvailabilityQueryKind::Doctor), Some(doctor), _) => {
                Intent::AvailabilityByDoctor { doctor, date }
            }
            (Some(AvailabilityQueryKind::Specialization), _, Some(specialization)) => {
                Intent::AvailabilityBySpecialization {
                    specialization,
                    date,
                }
            }
            _ => Intent::Unrecognized,
        }
    }
}
