//! Result of one `load` call

use fdw_common::db::{RunCounts, RunRecord, RunStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub rows_processed: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    pub status: RunStatus,
}

impl RunSummary {
    pub fn new(counts: RunCounts, status: RunStatus) -> Self {
        Self {
            rows_processed: counts.rows_processed,
            rows_loaded: counts.rows_loaded,
            rows_rejected: counts.rows_rejected,
            status,
        }
    }

    pub fn counts(&self) -> RunCounts {
        RunCounts {
            rows_processed: self.rows_processed,
            rows_loaded: self.rows_loaded,
            rows_rejected: self.rows_rejected,
        }
    }
}

impl From<&RunRecord> for RunSummary {
    fn from(run: &RunRecord) -> Self {
        Self::new(run.counts, run.status)
    }
}
