//! The chunked fact loader

use chrono::Utc;
use fdw_common::db::{RejectedRecord, RunCounts, RunStatus};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{LoadError, LoadResult};
use crate::models::{DimensionSnapshot, FactRecord, RejectionReason, RunSummary};

use super::ports::{DimensionLookup, FactSink, RejectionSink, RunTracker};
use super::retry::RetryPolicy;
use super::validator::{ChunkPartition, RecordValidator};

/// Records per chunk when the caller has no preference
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Upper bound on up-front chunk allocation; larger chunks grow on demand
const PREALLOC_LIMIT: usize = 8_192;

/// Caller-side controls for one load
#[derive(Debug, Clone, Default)]
pub struct LoadControl {
    /// Triggering this fails the run at the next await point
    pub cancel: CancellationToken,
    /// Overall deadline measured from the start of chunk processing
    pub deadline: Option<Duration>,
}

impl LoadControl {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }
}

enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

/// Loads one file's fact records per call.
///
/// One instance may serve many files concurrently; a single file is always
/// processed chunk by chunk in order.
pub struct ChunkedFactLoader {
    lookup: Arc<dyn DimensionLookup>,
    facts: Arc<dyn FactSink>,
    rejections: Arc<dyn RejectionSink>,
    runs: Arc<dyn RunTracker>,
    retry: RetryPolicy,
}

impl ChunkedFactLoader {
    pub fn new(
        lookup: Arc<dyn DimensionLookup>,
        facts: Arc<dyn FactSink>,
        rejections: Arc<dyn RejectionSink>,
        runs: Arc<dyn RunTracker>,
    ) -> Self {
        Self {
            lookup,
            facts,
            rejections,
            runs,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load `records` for `(file_name, source)` without cancellation or deadline
    pub async fn load<S>(
        &self,
        file_name: &str,
        source: &str,
        records: S,
        chunk_size: usize,
    ) -> LoadResult<RunSummary>
    where
        S: Stream<Item = LoadResult<FactRecord>> + Send,
    {
        self.load_with_control(file_name, source, records, chunk_size, &LoadControl::default())
            .await
    }

    /// Load `records` for `(file_name, source)`.
    ///
    /// A run already completed for the pair is returned unchanged without
    /// reading the stream. Any failure after the run has started marks it
    /// failed before the error is returned.
    pub async fn load_with_control<S>(
        &self,
        file_name: &str,
        source: &str,
        records: S,
        chunk_size: usize,
        control: &LoadControl,
    ) -> LoadResult<RunSummary>
    where
        S: Stream<Item = LoadResult<FactRecord>> + Send,
    {
        if chunk_size == 0 {
            return Err(LoadError::InvalidRequest("chunk_size must be at least 1".to_string()));
        }
        if file_name.trim().is_empty() || source.trim().is_empty() {
            return Err(LoadError::InvalidRequest(
                "file_name and source must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self.runs.find_run(file_name, source).await? {
            if existing.status == RunStatus::Completed {
                info!(
                    file_name,
                    source,
                    rows_loaded = existing.counts.rows_loaded,
                    "File already loaded, skipping"
                );
                return Ok(RunSummary::from(&existing));
            }
            info!(
                file_name,
                source,
                previous_status = %existing.status,
                "Restarting unfinished run"
            );
        }

        self.runs.start_run(file_name, source, Utc::now()).await?;
        info!(file_name, source, chunk_size, "Load started");

        let mut progress = RunCounts::default();
        let processed = self
            .process_guarded(file_name, source, records, chunk_size, control, &mut progress)
            .await;

        // A run whose completion cannot be recorded is failed like any other
        let result = match processed {
            Ok(()) => {
                self.retry
                    .run("complete run", || {
                        self.runs.complete_run(file_name, source, progress, Utc::now())
                    })
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                info!(
                    file_name,
                    source,
                    rows_processed = progress.rows_processed,
                    rows_loaded = progress.rows_loaded,
                    rows_rejected = progress.rows_rejected,
                    "Load completed"
                );
                Ok(RunSummary::new(progress, RunStatus::Completed))
            }
            Err(err) => {
                let message = err.to_string();
                error!(
                    file_name,
                    source,
                    rows_committed = progress.rows_processed,
                    error = %message,
                    "Load failed"
                );

                let marked = self
                    .retry
                    .run("mark run failed", || {
                        self.runs
                            .fail_run(file_name, source, progress, Utc::now(), &message)
                    })
                    .await;
                if let Err(track_err) = marked {
                    error!(
                        file_name,
                        source,
                        error = %track_err,
                        "Could not mark run failed"
                    );
                }

                Err(err)
            }
        }
    }

    /// Race chunk processing against cancellation and the deadline
    async fn process_guarded<S>(
        &self,
        file_name: &str,
        source: &str,
        records: S,
        chunk_size: usize,
        control: &LoadControl,
        progress: &mut RunCounts,
    ) -> LoadResult<()>
    where
        S: Stream<Item = LoadResult<FactRecord>> + Send,
    {
        let started = Instant::now();

        let outcome = {
            let work = self.process(file_name, source, records, chunk_size, progress);
            tokio::pin!(work);

            tokio::select! {
                biased;
                _ = control.cancel.cancelled() => Err(Interrupt::Cancelled),
                _ = deadline_elapsed(control.deadline) => {
                    Err(Interrupt::TimedOut(started.elapsed()))
                }
                result = &mut work => Ok(result),
            }
        };

        match outcome {
            Ok(result) => result,
            Err(Interrupt::Cancelled) => {
                warn!(file_name, source, "Load cancelled by caller");
                Err(LoadError::Cancelled {
                    rows_committed: progress.rows_processed,
                })
            }
            Err(Interrupt::TimedOut(elapsed)) => {
                warn!(file_name, source, elapsed_ms = elapsed.as_millis() as u64, "Load deadline elapsed");
                Err(LoadError::TimedOut {
                    elapsed,
                    rows_committed: progress.rows_processed,
                })
            }
        }
    }

    async fn process<S>(
        &self,
        file_name: &str,
        source: &str,
        records: S,
        chunk_size: usize,
        progress: &mut RunCounts,
    ) -> LoadResult<()>
    where
        S: Stream<Item = LoadResult<FactRecord>> + Send,
    {
        let snapshot = DimensionSnapshot::capture(self.lookup.as_ref()).await?;
        let mut validator = RecordValidator::new(snapshot);

        tokio::pin!(records);
        let mut chunk_number: u64 = 0;

        loop {
            let chunk = next_chunk(records.as_mut(), chunk_size).await?;
            if chunk.is_empty() {
                break;
            }
            chunk_number += 1;

            let partition = validator.partition(chunk);
            let counts = self
                .write_chunk(file_name, source, chunk_number, &partition)
                .await?;

            // Only counted once both sink writes for the chunk succeeded
            progress.rows_processed += counts.rows_processed;
            progress.rows_loaded += counts.rows_loaded;
            progress.rows_rejected += counts.rows_rejected;

            info!(
                file_name,
                source,
                chunk = chunk_number,
                chunk_rows = counts.rows_processed,
                loaded = progress.rows_loaded,
                rejected = progress.rows_rejected,
                "Chunk committed"
            );
        }

        Ok(())
    }

    async fn write_chunk(
        &self,
        file_name: &str,
        source: &str,
        chunk_number: u64,
        partition: &ChunkPartition,
    ) -> LoadResult<RunCounts> {
        if !partition.accepted.is_empty() {
            let operation = format!("fact insert (chunk {})", chunk_number);
            let inserted = self
                .retry
                .run(&operation, || self.facts.insert_or_ignore(&partition.accepted))
                .await?;

            let skipped = partition.accepted.len() as u64 - inserted.min(partition.accepted.len() as u64);
            debug!(
                file_name,
                chunk = chunk_number,
                inserted,
                already_present = skipped,
                "Fact rows written"
            );
        }

        if !partition.rejected.is_empty() {
            let rejected_at = Utc::now();
            let rows: Vec<RejectedRecord> = partition
                .rejected
                .iter()
                .map(|(record, reason)| rejection_row(file_name, source, record, reason, rejected_at))
                .collect();

            let operation = format!("rejection append (chunk {})", chunk_number);
            self.retry
                .run(&operation, || self.rejections.append(&rows))
                .await?;
        }

        Ok(RunCounts {
            rows_processed: partition.len() as u64,
            rows_loaded: partition.accepted.len() as u64,
            rows_rejected: partition.rejected.len() as u64,
        })
    }
}

fn rejection_row(
    file_name: &str,
    source: &str,
    record: &FactRecord,
    reason: &RejectionReason,
    rejected_at: chrono::DateTime<Utc>,
) -> RejectedRecord {
    RejectedRecord {
        source: source.to_string(),
        file_name: file_name.to_string(),
        row_number: record.row_number,
        raw_data: record.raw.clone(),
        reason: reason.label().to_string(),
        detail: reason.detail(),
        rejected_at,
    }
}

/// Pull up to `chunk_size` records; an empty chunk means the stream is done
async fn next_chunk<S>(mut records: S, chunk_size: usize) -> LoadResult<Vec<FactRecord>>
where
    S: Stream<Item = LoadResult<FactRecord>> + Unpin,
{
    let mut chunk = Vec::with_capacity(chunk_size.min(PREALLOC_LIMIT));
    while chunk.len() < chunk_size {
        match records.next().await {
            Some(Ok(record)) => chunk.push(record),
            Some(Err(err)) => return Err(err),
            None => break,
        }
    }
    Ok(chunk)
}

async fn deadline_elapsed(deadline: Option<Duration>) {
    match deadline {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}
