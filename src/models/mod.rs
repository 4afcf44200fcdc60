pub mod conversation;
pub mod intent;
pub mod patient;
pub mod pending;
pub mod run;
pub mod slot;

pub use conversation::{ChatMessage, Conversation, Role};
pub use intent::{AvailabilityQuery, AvailabilityQueryKind, Intent};
pub use patient::PatientId;
pub use pending::PendingConfirmation;
pub use run::{AppliedOperation, Route, RunState};
pub use slot::{DoctorAvailability, Slot, SlotView};
