use serde::{Deserialize, Serialize};

use super::PatientId;

/// One row of the slot table, exactly as stored.
///
/// `date_slot` is in storage format (`DD-MM-YYYY H.MM`); only the scheduling
/// engine converts it to and from the user-facing `DD-MM-YYYY HH:MM`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub date_slot: String,
    pub doctor_name: String,
    pub specialization: String,
    pub is_available: bool,
    pub patient_to_attend: Option<PatientId>,
}

impl Slot {
    pub fn open(date_slot: &str, doctor_name: &str, specialization: &str) -> Self {
        Self {
            date_slot: date_slot.to_string(),
            doctor_name: doctor_name.to_string(),
            specialization: specialization.to_string(),
            is_available: true,
            patient_to_attend: None,
        }
    }

    /// Availability and occupancy must always agree.
    pub fn is_consistent(&self) -> bool {
        self.is_available == self.patient_to_attend.is_none()
    }
}

/// A slot rendered in user-facing date/time format.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlotView {
    pub doctor_name: String,
    pub specialization: String,
    pub date: String,
    pub time: String,
    pub is_available: bool,
    pub patient_to_attend: Option<PatientId>,
}

/// Open times for one doctor, used by specialization listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DoctorAvailability {
    pub doctor_name: String,
    pub times: Vec<String>,
}
