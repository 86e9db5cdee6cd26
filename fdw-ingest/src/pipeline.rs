//! End-to-end load of one flight file
//!
//! Shared by the CLI and the HTTP surface: optionally fills the date dimension
//! from the file, then streams the file through the chunked loader.

use fdw_common::config::LoaderConfig;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::db::sqlite_loader;
use crate::dimensions::dates::collect_flight_dates;
use crate::dimensions::ensure_dates_exist;
use crate::error::LoadResult;
use crate::loader::{LoadControl, RetryPolicy};
use crate::models::RunSummary;
use crate::source::FlightCsvSource;

/// Run-tracking source for flight files unless the caller names another
pub const FLIGHTS_SOURCE: &str = "flights";

/// Per-file load options
#[derive(Debug, Clone)]
pub struct FlightLoadOptions {
    pub source: String,
    pub chunk_size: usize,
    /// Add the file's flight dates to `date_dim` before loading
    pub ensure_dates: bool,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
}

impl FlightLoadOptions {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            source: FLIGHTS_SOURCE.to_string(),
            chunk_size: config.chunk_size,
            ensure_dates: false,
            retry: RetryPolicy::from_config(config),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Load one CSV file. `cancel` may be triggered from another task.
pub async fn load_flight_file(
    pool: &SqlitePool,
    path: &Path,
    options: &FlightLoadOptions,
    control: LoadControl,
) -> LoadResult<RunSummary> {
    let source = FlightCsvSource::new(path);
    let file_name = source.file_name();

    if options.ensure_dates {
        let dates = collect_flight_dates(PathBuf::from(path)).await?;
        let added = ensure_dates_exist(pool, dates).await?;
        info!(file_name, added, "Date dimension prepared");
    }

    let control = LoadControl {
        deadline: control.deadline.or(options.timeout),
        ..control
    };

    let loader = sqlite_loader(pool, options.retry.clone());
    loader
        .load_with_control(
            &file_name,
            &options.source,
            source.records(),
            options.chunk_size,
            &control,
        )
        .await
}
