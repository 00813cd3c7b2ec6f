use std::sync::atomic::{AtomicU64, Ordering};

use crate::sync::{LastStatus, RunOutcome, SyncStatusState};

pub static RUNS_SUCCEEDED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static RUNS_FAILED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static RUNS_CANCELLED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static ROWS_SYNCED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static TABLES_FAILED_TOTAL: AtomicU64 = AtomicU64::new(0);

pub fn record_run(outcome: &RunOutcome) {
    let counter = match outcome.status {
        LastStatus::Success => &RUNS_SUCCEEDED_TOTAL,
        LastStatus::Error => &RUNS_FAILED_TOTAL,
        LastStatus::Cancelled => &RUNS_CANCELLED_TOTAL,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    ROWS_SYNCED_TOTAL.fetch_add(outcome.stats.rows_synced, Ordering::Relaxed);
    TABLES_FAILED_TOTAL.fetch_add(outcome.stats.failed_tables.len() as u64, Ordering::Relaxed);
}

/// Prometheus text exposition of the run counters plus live status gauges.
pub fn render(status: &SyncStatusState) -> String {
    format!(
        concat!(
            "# TYPE dbmirror_runs_total counter\n",
            "dbmirror_runs_total{{outcome=\"success\"}} {}\n",
            "dbmirror_runs_total{{outcome=\"error\"}} {}\n",
            "dbmirror_runs_total{{outcome=\"cancelled\"}} {}\n",
            "# TYPE dbmirror_rows_synced_total counter\n",
            "dbmirror_rows_synced_total {}\n",
            "# TYPE dbmirror_tables_failed_total counter\n",
            "dbmirror_tables_failed_total {}\n",
            "# TYPE dbmirror_sync_running gauge\n",
            "dbmirror_sync_running {}\n",
            "# TYPE dbmirror_sync_progress gauge\n",
            "dbmirror_sync_progress {}\n",
        ),
        RUNS_SUCCEEDED_TOTAL.load(Ordering::Relaxed),
        RUNS_FAILED_TOTAL.load(Ordering::Relaxed),
        RUNS_CANCELLED_TOTAL.load(Ordering::Relaxed),
        ROWS_SYNCED_TOTAL.load(Ordering::Relaxed),
        TABLES_FAILED_TOTAL.load(Ordering::Relaxed),
        u8::from(status.is_running),
        status.progress,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncStats;

    #[test]
    fn record_run_bumps_outcome_and_row_counters() {
        let before_rows = ROWS_SYNCED_TOTAL.load(Ordering::Relaxed);
        let before_ok = RUNS_SUCCEEDED_TOTAL.load(Ordering::Relaxed);

        let mut stats = SyncStats {
            rows_synced: 7,
            ..SyncStats::default()
        };
        stats.mark_failed("broken");
        record_run(&RunOutcome {
            status: LastStatus::Success,
            stats,
            error: None,
        });

        // Other tests may record concurrently, so only lower bounds hold.
        assert!(ROWS_SYNCED_TOTAL.load(Ordering::Relaxed) >= before_rows + 7);
        assert!(RUNS_SUCCEEDED_TOTAL.load(Ordering::Relaxed) > before_ok);
        assert!(TABLES_FAILED_TOTAL.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn render_exports_expected_keys() {
        let status = SyncStatusState {
            is_running: true,
            progress: 55,
            ..SyncStatusState::default()
        };
        let body = render(&status);
        assert!(body.contains("dbmirror_runs_total{outcome=\"success\"}"));
        assert!(body.contains("dbmirror_runs_total{outcome=\"cancelled\"}"));
        assert!(body.contains("dbmirror_rows_synced_total"));
        assert!(body.contains("dbmirror_sync_running 1\n"));
        assert!(body.contains("dbmirror_sync_progress 55\n"));
    }
}
