use std::fmt;

use serde::{Deserialize, Serialize};

/// Patient identifier: a 7 or 8 digit national id number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(u32);

impl PatientId {
    pub const FORMAT_HINT: &'static str = "ID must be 7 or 8 digits";

    pub fn new(raw: i64) -> Option<Self> {
        if (1_000_000..=99_999_999).contains(&raw) {
            Some(Self(raw as u32))
        } else {
            None
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
