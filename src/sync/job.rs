use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::copier;
use super::error::SyncError;
use super::progress::{COMPLETE, FOREIGN_KEYS_DISABLED, SOURCE_CONNECTED, TARGET_CONNECTED};
use super::schema;
use super::stats::SyncStats;
use super::status::{LastStatus, RunStatus};
use crate::db::{Connector, DbError, SqlSession};

/// Stage of a run, used to label phase errors and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Connecting,
    MirroringSchema,
    CopyingData,
    Finalizing,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Connecting => "connecting",
            SyncPhase::MirroringSchema => "schema mirroring",
            SyncPhase::CopyingData => "data copy",
            SyncPhase::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Result of one run as seen by in-process callers.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: LastStatus,
    pub stats: SyncStats,
    /// Set for `LastStatus::Error`.
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == LastStatus::Success
    }
}

/// Status writer and cancellation token shared by every step of a run.
pub(crate) struct RunContext {
    pub(crate) status: RunStatus,
    pub(crate) cancel: CancellationToken,
}

impl RunContext {
    /// Checkpoint between tables and phases.
    pub(crate) fn ensure_active(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One synchronization attempt. Owns its sessions for its whole lifetime.
pub(crate) struct SyncJob {
    source: Arc<dyn Connector>,
    target: Arc<dyn Connector>,
    ctx: RunContext,
}

impl SyncJob {
    pub(crate) fn new(
        source: Arc<dyn Connector>,
        target: Arc<dyn Connector>,
        status: RunStatus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            target,
            ctx: RunContext { status, cancel },
        }
    }

    pub(crate) async fn run(self) -> RunOutcome {
        let mut stats = SyncStats::default();
        let result = self.execute(&mut stats).await;

        let (status, error) = match result {
            Ok(()) => {
                log::info!("Sync completed");
                stats.log_summary();
                (LastStatus::Success, None)
            }
            Err(SyncError::Cancelled) => {
                log::info!("Sync cancelled");
                stats.log_summary();
                (LastStatus::Cancelled, None)
            }
            Err(e) => {
                log::error!("Error during sync: {e}");
                stats.log_summary();
                (LastStatus::Error, Some(e.to_string()))
            }
        };

        if !self.ctx.status.finish(status).await {
            log::debug!("Run was cancelled externally; final status {status:?} not recorded");
        }

        RunOutcome {
            status,
            stats,
            error,
        }
    }

    async fn execute(&self, stats: &mut SyncStats) -> Result<(), SyncError> {
        log::info!("Sync phase: {}", SyncPhase::Connecting);

        self.ctx
            .status
            .operation("Connecting to source database")
            .await;
        let mut source = self.connect(self.source.as_ref(), "source").await?;
        self.ctx.status.progress(SOURCE_CONNECTED).await;

        self.ctx
            .status
            .operation("Connecting to target database")
            .await;
        let mut target = match self.connect(self.target.as_ref(), "target").await {
            Ok(target) => target,
            Err(e) => {
                release(source, "source").await;
                return Err(e);
            }
        };
        self.ctx.status.progress(TARGET_CONNECTED).await;

        let result = self
            .mirror_and_copy(source.as_mut(), target.as_mut(), stats)
            .await;

        release(source, "source").await;
        release(target, "target").await;

        result
    }

    async fn connect(
        &self,
        connector: &dyn Connector,
        role: &'static str,
    ) -> Result<Box<dyn SqlSession>, SyncError> {
        let endpoint = connector.describe();
        let session = tokio::select! {
            _ = self.ctx.cancel.cancelled() => return Err(SyncError::Cancelled),
            session = connector.connect() => session,
        };
        let session = session.map_err(|source| SyncError::Connection { role, source })?;
        log::info!("Connected to {role} database {endpoint}");
        Ok(session)
    }

    async fn mirror_and_copy(
        &self,
        source: &mut dyn SqlSession,
        target: &mut dyn SqlSession,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        let ctx = &self.ctx;

        ctx.ensure_active()?;
        log::info!("Sync phase: {}", SyncPhase::MirroringSchema);
        ctx.status.operation("Disabling foreign key checks").await;
        target
            .set_foreign_key_checks(false)
            .await
            .map_err(phase_error(SyncPhase::MirroringSchema, "disabling foreign key checks"))?;
        ctx.status.progress(FOREIGN_KEYS_DISABLED).await;

        schema::wipe_target(target, ctx, stats).await?;
        ctx.ensure_active()?;
        let mut tables = schema::mirror_tables(source, target, ctx, stats).await?;

        ctx.ensure_active()?;
        log::info!(
            "Sync phase: {} ({} tables)",
            SyncPhase::CopyingData,
            tables.len()
        );
        copier::copy_tables(source, target, &mut tables, ctx, stats).await?;

        ctx.ensure_active()?;
        log::info!("Sync phase: {}", SyncPhase::Finalizing);
        ctx.status.operation("Re-enabling foreign key checks...").await;
        target
            .set_foreign_key_checks(true)
            .await
            .map_err(phase_error(SyncPhase::Finalizing, "re-enabling foreign key checks"))?;
        target
            .commit()
            .await
            .map_err(phase_error(SyncPhase::Finalizing, "committing target"))?;
        ctx.status.checkpoint("Sync completed", COMPLETE).await;

        Ok(())
    }
}

fn phase_error(phase: SyncPhase, action: &'static str) -> impl FnOnce(DbError) -> SyncError {
    move |source| SyncError::Phase {
        phase,
        action: action.to_string(),
        source,
    }
}

async fn release(mut session: Box<dyn SqlSession>, role: &str) {
    if let Err(e) = session.close().await {
        log::warn!("Error closing {role} connection: {e}");
    }
}
