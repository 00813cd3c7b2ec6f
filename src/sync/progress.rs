//! Fixed progress checkpoints for one run.
//!
//! Each phase owns a band of the 0..=100 range and interpolates linearly
//! across it by fraction of tables processed.

pub const SOURCE_CONNECTED: u8 = 10;
pub const TARGET_CONNECTED: u8 = 20;
pub const FOREIGN_KEYS_DISABLED: u8 = 22;
pub const DROP_END: u8 = 28;
pub const CREATE_START: u8 = 30;
pub const CREATE_END: u8 = 50;
pub const COPY_START: u8 = 50;
pub const COPY_END: u8 = 95;
pub const COMPLETE: u8 = 100;

#[derive(Debug, Clone, Copy)]
pub struct PhaseProgress {
    start: u8,
    end: u8,
    total: usize,
}

impl PhaseProgress {
    pub fn new(start: u8, end: u8, total: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end, total }
    }

    /// Progress after `done` of `total` items. An empty phase is complete.
    pub fn at(&self, done: usize) -> u8 {
        if self.total == 0 {
            return self.end;
        }
        let span = usize::from(self.end - self.start);
        let advanced = span * done.min(self.total) / self.total;
        self.start + advanced as u8
    }
}
