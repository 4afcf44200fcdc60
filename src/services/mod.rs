pub mod ai;
pub mod booking;
pub mod confirmation;
pub mod information;
pub mod scheduling;
pub mod seed;
pub mod supervisor;
pub mod workflow;
