//! The synchronization engine.
//!
//! A run wipes the target, replays every source `CREATE TABLE`, then copies
//! all rows table by table. Schema mirroring for every table finishes before
//! any data is copied. Cancellation is cooperative: it is checked before each
//! table and between phases, and never interrupts a statement already sent.
//!
//! A run that errors or is cancelled part way leaves the target partially
//! mirrored; there is no transaction spanning the whole run.

mod copier;
mod error;
mod job;
mod orchestrator;
pub mod progress;
mod schema;
mod stats;
mod status;

pub use error::{ControlError, SyncError};
pub use job::{RunOutcome, SyncPhase};
pub use orchestrator::SyncOrchestrator;
pub use schema::TableDescriptor;
pub use stats::SyncStats;
pub use status::{LastStatus, StatusTracker, SyncStatusState};
