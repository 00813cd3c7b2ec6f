use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::error::ControlError;
use super::job::{RunOutcome, SyncJob};
use super::stats::SyncStats;
use super::status::{LastStatus, RunStatus, StatusTracker, SyncStatusState};
use crate::db::Connector;
use crate::network::metrics;

struct ActiveJob {
    cancel: CancellationToken,
    status: RunStatus,
    /// `Some` once the job has ended. A closed channel without a value
    /// means the supervisor itself went away.
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl ActiveJob {
    fn is_finished(&self) -> bool {
        let ended = self.outcome.borrow().is_some();
        ended || self.outcome.has_changed().is_err()
    }

    /// The job's own terminal status is recorded once its sessions are
    /// released, slightly before the supervisor publishes the outcome.
    async fn is_done(&self) -> bool {
        self.is_finished() || self.status.is_closed().await
    }
}

/// Single-flight job controller.
///
/// `start`, `cancel` and `status` return immediately; the copy itself runs
/// on a spawned task and is observed through `status` or `join`.
pub struct SyncOrchestrator {
    source: Arc<dyn Connector>,
    target: Arc<dyn Connector>,
    status: StatusTracker,
    active: Mutex<Option<ActiveJob>>,
}

impl SyncOrchestrator {
    pub fn new(source: Arc<dyn Connector>, target: Arc<dyn Connector>) -> Self {
        Self {
            source,
            target,
            status: StatusTracker::new(),
            active: Mutex::new(None),
        }
    }

    /// Start a run in the background. Rejected while another run, including
    /// a cancelled one still finishing its current statement, is alive.
    pub async fn start(&self) -> Result<(), ControlError> {
        let mut active = self.active.lock().await;
        if let Some(job) = active.as_ref() {
            if !job.is_done().await {
                return Err(ControlError::AlreadyRunning);
            }
        }
        if self.status.snapshot().await.is_running {
            return Err(ControlError::AlreadyRunning);
        }

        let run_status = self.status.begin_run("Starting sync process").await;
        let job_status = run_status.clone();
        let cancel = CancellationToken::new();
        let job = SyncJob::new(
            Arc::clone(&self.source),
            Arc::clone(&self.target),
            run_status.clone(),
            cancel.clone(),
        );

        let (outcome_tx, outcome_rx) = watch::channel(None);
        let handle = tokio::spawn(job.run());
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Sync job aborted: {e}");
                    run_status.finish(LastStatus::Error).await;
                    RunOutcome {
                        status: LastStatus::Error,
                        stats: SyncStats::default(),
                        error: Some(e.to_string()),
                    }
                }
            };
            metrics::record_run(&outcome);
            let _ = outcome_tx.send(Some(outcome));
        });

        *active = Some(ActiveJob {
            cancel,
            status: job_status,
            outcome: outcome_rx,
        });
        log::info!("Sync started");
        Ok(())
    }

    /// Signal the active run to stop at its next checkpoint and record the
    /// cancellation right away.
    pub async fn cancel(&self) -> Result<(), ControlError> {
        let active = self.active.lock().await;
        let job = match active.as_ref() {
            Some(job) if !job.is_finished() && !job.cancel.is_cancelled() => job,
            _ => return Err(ControlError::NotRunning),
        };
        if !self.status.cancel_active().await {
            return Err(ControlError::NotRunning);
        }
        job.cancel.cancel();
        log::info!("Sync cancellation requested");
        Ok(())
    }

    pub async fn status(&self) -> SyncStatusState {
        self.status.snapshot().await
    }

    /// Wait for the current or most recent run to end.
    pub async fn join(&self) -> Option<RunOutcome> {
        let mut outcome = {
            let active = self.active.lock().await;
            active.as_ref()?.outcome.clone()
        };
        let result = outcome
            .wait_for(Option::is_some)
            .await
            .map(|done| (*done).clone());
        result.ok().flatten()
    }
}
