//! Collaborator interfaces consumed by the loader
//!
//! Every batched write must be all-or-nothing: an `Err` means none of the
//! batch was written, so the loader can retry it as a unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fdw_common::db::{RejectedRecord, RunCounts, RunRecord};
use fdw_common::Result;
use std::collections::HashSet;

use crate::models::{Dimension, FactRecord};

/// Read-only access to dimension primary keys
#[async_trait]
pub trait DimensionLookup: Send + Sync {
    async fn keys_for(&self, dimension: Dimension) -> Result<HashSet<String>>;
}

/// Idempotent fact writer
#[async_trait]
pub trait FactSink: Send + Sync {
    /// Insert records, silently skipping any whose natural key already exists.
    ///
    /// Returns how many rows were genuinely new.
    async fn insert_or_ignore(&self, records: &[FactRecord]) -> Result<u64>;
}

/// Append-only rejection audit log
#[async_trait]
pub trait RejectionSink: Send + Sync {
    async fn append(&self, rejections: &[RejectedRecord]) -> Result<()>;
}

/// Bookkeeping for one load attempt per (file_name, source)
#[async_trait]
pub trait RunTracker: Send + Sync {
    async fn find_run(&self, file_name: &str, source: &str) -> Result<Option<RunRecord>>;

    /// Create the run, or reset an unfinished one back to `running` with zero counts
    async fn start_run(
        &self,
        file_name: &str,
        source: &str,
        started_at: DateTime<Utc>,
    ) -> Result<RunRecord>;

    async fn complete_run(
        &self,
        file_name: &str,
        source: &str,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn fail_run(
        &self,
        file_name: &str,
        source: &str,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()>;
}
