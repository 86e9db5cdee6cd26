//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Lifecycle of one `pipeline_runs` row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(Error::Internal(format!("Unknown run status: {}", other))),
        }
    }
}

/// Row accounting for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub rows_processed: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
}

impl RunCounts {
    /// Every processed row is either loaded or rejected
    pub fn is_balanced(&self) -> bool {
        self.rows_loaded + self.rows_rejected == self.rows_processed
    }
}

/// One load attempt per (file_name, source)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub file_name: String,
    pub source: String,
    pub counts: RunCounts,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Append-only audit row for a fact record that was not loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub source: String,
    pub file_name: String,
    /// 1-based data row within the source file
    pub row_number: u64,
    /// Original row payload, kept for inspection and replay
    pub raw_data: String,
    /// Short reason label (e.g. "unknown carrier")
    pub reason: String,
    /// Offending value or field, when there is one
    pub detail: Option<String>,
    pub rejected_at: DateTime<Utc>,
}
