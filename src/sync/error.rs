use thiserror::Error;

use super::job::SyncPhase;
use crate::db::DbError;

/// Run-level failures. Per-table failures never surface here.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot connect to {role} database: {source}")]
    Connection {
        role: &'static str,
        #[source]
        source: DbError,
    },

    #[error("{phase} failed while {action}: {source}")]
    Phase {
        phase: SyncPhase,
        action: String,
        #[source]
        source: DbError,
    },

    /// Cooperative stop observed at a checkpoint.
    #[error("Sync cancelled")]
    Cancelled,
}

/// Rejections of control calls. Neither changes the status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("Sync is already running")]
    AlreadyRunning,

    #[error("No sync process is running")]
    NotRunning,
}
