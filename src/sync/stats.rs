use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub tables_created: usize,
    pub tables_deleted: usize,
    pub tables_synced: usize,
    pub rows_synced: u64,
    pub failed_tables: BTreeSet<String>,
}

impl SyncStats {
    pub fn mark_failed(&mut self, table: &str) {
        self.failed_tables.insert(table.to_string());
    }

    pub fn is_failed(&self, table: &str) -> bool {
        self.failed_tables.contains(table)
    }

    pub fn log_summary(&self) {
        log::info!("Sync statistics: {self}");
        log::info!("Tables created: {}", self.tables_created);
        log::info!("Tables synced: {}", self.tables_synced);
        log::info!("Rows synced: {}", self.rows_synced);
        if !self.failed_tables.is_empty() {
            log::warn!(
                "Failed to sync these tables: {}",
                self.failed_tables
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} deleted={} synced={} rows={} failed={}",
            self.tables_created,
            self.tables_deleted,
            self.tables_synced,
            self.rows_synced,
            self.failed_tables.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_tables_behave_as_a_set() {
        let mut stats = SyncStats::default();
        stats.mark_failed("orders");
        stats.mark_failed("orders");
        stats.mark_failed("audit");
        assert_eq!(stats.failed_tables.len(), 2);
        assert!(stats.is_failed("orders"));
        assert!(!stats.is_failed("users"));
    }

    #[test]
    fn display_is_a_single_summary_line() {
        let mut stats = SyncStats {
            tables_created: 3,
            tables_deleted: 1,
            tables_synced: 2,
            rows_synced: 42,
            ..SyncStats::default()
        };
        stats.mark_failed("c");
        assert_eq!(
            stats.to_string(),
            "created=3 deleted=1 synced=2 rows=42 failed=1"
        );
    }
}
