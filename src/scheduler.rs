use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::ScheduleConfig;
use crate::sync::{ControlError, SyncOrchestrator};

/// Starts a run once a day at a fixed local time.
pub struct DailyScheduler {
    at: NaiveTime,
    orchestrator: Arc<SyncOrchestrator>,
}

impl DailyScheduler {
    /// `None` when the configured time is not a valid wall-clock time.
    pub fn new(config: &ScheduleConfig, orchestrator: Arc<SyncOrchestrator>) -> Option<Self> {
        let at = NaiveTime::from_hms_opt(config.hour, config.minute, 0)?;
        Some(Self { at, orchestrator })
    }

    pub async fn run(self, shutdown: CancellationToken) {
        log::info!("Daily sync scheduled at {}", self.at.format("%H:%M"));

        loop {
            let now = Local::now().naive_local();
            let next = next_run(now, self.at);
            let wait = (next - now).to_std().unwrap_or_default();
            log::debug!("Next scheduled sync at {next}");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Scheduler stopped");
                    return;
                }
                _ = sleep(wait) => {}
            }

            match self.orchestrator.start().await {
                Ok(()) => log::info!("Scheduled sync started"),
                Err(ControlError::AlreadyRunning) => {
                    log::info!("Scheduled sync skipped: a sync is already running")
                }
                Err(e) => log::warn!("Scheduled sync not started: {e}"),
            }

            // The wall clock can lag the timer slightly; step past `at` so the
            // same occurrence is not picked again.
            sleep(std::time::Duration::from_secs(1)).await;
        }
    }
}

/// The first occurrence of `at` strictly after `now`.
pub fn next_run(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if now < today {
        today
    } else {
        (now.date() + Duration::days(1)).and_time(at)
    }
}
