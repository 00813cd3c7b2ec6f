use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Terminal outcome of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastStatus {
    Success,
    Error,
    Cancelled,
}

/// Snapshot of the process-wide sync status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusState {
    pub is_running: bool,
    /// Completion time of the last successful run.
    pub last_sync: Option<DateTime<Utc>>,
    pub last_status: Option<LastStatus>,
    pub current_operation: Option<String>,
    /// 0..=100, non-decreasing within a run, reset to 0 when a run ends.
    pub progress: u8,
}

#[derive(Debug, Default)]
struct TrackerInner {
    state: SyncStatusState,
    /// Bumped whenever a run starts or is cancelled from outside; writes
    /// carrying an older generation are dropped.
    generation: u64,
}

/// Owner of the shared status. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> SyncStatusState {
        self.inner.lock().await.state.clone()
    }

    /// Mark a run as started and hand out the writer for it.
    pub(crate) async fn begin_run(&self, operation: &str) -> RunStatus {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        inner.state.is_running = true;
        inner.state.current_operation = Some(operation.to_string());
        inner.state.progress = 0;
        RunStatus {
            tracker: self.clone(),
            generation: inner.generation,
        }
    }

    /// Record an external cancellation. Returns false when nothing is
    /// running. The cancelled run's writer is detached afterwards.
    pub(crate) async fn cancel_active(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_running {
            return false;
        }
        inner.generation += 1;
        inner.state.is_running = false;
        inner.state.last_status = Some(LastStatus::Cancelled);
        inner.state.current_operation = None;
        inner.state.progress = 0;
        true
    }
}

/// Status writer owned by one run.
#[derive(Debug, Clone)]
pub struct RunStatus {
    tracker: StatusTracker,
    generation: u64,
}

impl RunStatus {
    async fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut SyncStatusState),
    {
        let mut inner = self.tracker.inner.lock().await;
        if inner.generation != self.generation {
            return false;
        }
        f(&mut inner.state);
        true
    }

    pub async fn operation(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|s| s.current_operation = Some(text)).await;
    }

    /// Raise progress to `value`. Lower values are ignored.
    pub async fn progress(&self, value: u8) {
        let value = value.min(100);
        self.update(|s| s.progress = s.progress.max(value)).await;
    }

    pub async fn checkpoint(&self, text: impl Into<String>, value: u8) {
        let text = text.into();
        let value = value.min(100);
        self.update(|s| {
            s.current_operation = Some(text);
            s.progress = s.progress.max(value);
        })
        .await;
    }

    /// True once `finish` has been recorded for this run. A run detached by
    /// `cancel_active` never counts as closed.
    pub(crate) async fn is_closed(&self) -> bool {
        let inner = self.tracker.inner.lock().await;
        inner.generation == self.generation && !inner.state.is_running
    }

    /// Close the run. Returns false if the run had already been detached by
    /// an external cancellation.
    pub async fn finish(&self, outcome: LastStatus) -> bool {
        self.update(|s| {
            s.is_running = false;
            s.last_status = Some(outcome);
            s.current_operation = None;
            s.progress = 0;
            if outcome == LastStatus::Success {
                s.last_sync = Some(Utc::now());
            }
        })
        .await
    }
}
