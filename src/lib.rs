pub mod config;
pub mod db;
pub mod network;
pub mod scheduler;
pub mod sync;

// Public exports
pub use config::Config;
pub use db::{Connector, MySqlConnector, SqlSession, SqlValue};
pub use sync::{ControlError, LastStatus, RunOutcome, SyncOrchestrator, SyncStats, SyncStatusState};
