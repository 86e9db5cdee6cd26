//! Shared fixtures for fdw-ingest integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fdw_common::db::{init_database, RejectedRecord, RunCounts, RunRecord, RunStatus};
use fdw_common::{Error, Result};
use futures::Stream;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use fdw_ingest::dimensions::{ensure_dates_exist, insert_carriers, Carrier};
use fdw_ingest::loader::{DimensionLookup, FactSink, RejectionSink, RunTracker};
use fdw_ingest::models::{Dimension, FactRecord, NaturalKey};
use fdw_ingest::{ChunkedFactLoader, LoadResult, RetryPolicy};

/// Database with carriers AA/DL, airports JFK/LAX/ATL/BOS and 2025-01-01..03
pub async fn seeded_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("warehouse.db")).await.unwrap();

    insert_carriers(&pool, &[Carrier::new("AA", Some(19805)), Carrier::new("DL", Some(19790))])
        .await
        .unwrap();
    for code in ["JFK", "LAX", "ATL", "BOS"] {
        sqlx::query("INSERT INTO airports (airport_code, airport_name) VALUES (?, ?)")
            .bind(code)
            .bind(format!("{} Airport", code))
            .execute(&pool)
            .await
            .unwrap();
    }
    ensure_dates_exist(&pool, (1..=3).map(|d| NaiveDate::from_ymd_opt(2025, 1, d).unwrap()))
        .await
        .unwrap();

    (dir, pool)
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        multiplier: 2.0,
    }
}

pub fn stream_of(records: Vec<FactRecord>) -> impl Stream<Item = LoadResult<FactRecord>> + Send {
    futures::stream::iter(records.into_iter().map(Ok))
}

/// `count` distinct valid flights, rows numbered from 1
pub fn valid_flights(count: u64) -> Vec<FactRecord> {
    (1..=count)
        .map(|i| FactRecord::flight(i, "2025-01-01", "AA", i as i64, "JFK", "LAX", "0800"))
        .collect()
}

/// Fixed dimension keys
pub struct StaticLookup {
    keys: HashMap<Dimension, HashSet<String>>,
    pub calls: AtomicU32,
}

impl StaticLookup {
    pub fn new(carriers: &[&str], airports: &[&str], dates: &[&str]) -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
        let mut keys = HashMap::new();
        keys.insert(Dimension::Carrier, set(carriers));
        keys.insert(Dimension::Airport, set(airports));
        keys.insert(Dimension::Date, set(dates));
        Self {
            keys,
            calls: AtomicU32::new(0),
        }
    }

    pub fn standard() -> Self {
        Self::new(&["AA", "DL"], &["JFK", "LAX", "ATL", "BOS"], &["2025-01-01", "2025-01-02"])
    }
}

#[async_trait]
impl DimensionLookup for StaticLookup {
    async fn keys_for(&self, dimension: Dimension) -> Result<HashSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys.get(&dimension).cloned().unwrap_or_default())
    }
}

/// Standard keys, except carrier "AA" disappears after the first carrier read
pub struct ShrinkingLookup {
    inner: StaticLookup,
    carrier_reads: AtomicU32,
    pub calls: AtomicU32,
}

impl ShrinkingLookup {
    pub fn new() -> Self {
        Self {
            inner: StaticLookup::standard(),
            carrier_reads: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DimensionLookup for ShrinkingLookup {
    async fn keys_for(&self, dimension: Dimension) -> Result<HashSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut keys = self.inner.keys_for(dimension).await?;
        if dimension == Dimension::Carrier && self.carrier_reads.fetch_add(1, Ordering::SeqCst) > 0 {
            keys.remove("AA");
        }
        Ok(keys)
    }
}

/// Fact store keyed on the natural key
#[derive(Default)]
pub struct MemoryFactSink {
    pub rows: Mutex<HashMap<NaturalKey, FactRecord>>,
    pub batches: Mutex<Vec<usize>>,
}

impl MemoryFactSink {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl FactSink for MemoryFactSink {
    async fn insert_or_ignore(&self, records: &[FactRecord]) -> Result<u64> {
        self.batches.lock().unwrap().push(records.len());
        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0;
        for record in records {
            if !rows.contains_key(&record.natural_key()) {
                rows.insert(record.natural_key(), record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// Wraps a fact sink and fails selected calls (1-based) with a transient error
pub struct FlakyFactSink {
    inner: Arc<dyn FactSink>,
    failing_calls: Mutex<HashSet<u32>>,
    fail_from: Option<u32>,
    pub calls: AtomicU32,
}

impl FlakyFactSink {
    /// Fail exactly the listed calls
    pub fn failing_calls(inner: Arc<dyn FactSink>, calls: &[u32]) -> Self {
        Self {
            inner,
            failing_calls: Mutex::new(calls.iter().copied().collect()),
            fail_from: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Succeed for the first `n` calls, fail every call after that
    pub fn failing_after(inner: Arc<dyn FactSink>, n: u32) -> Self {
        Self {
            inner,
            failing_calls: Mutex::new(HashSet::new()),
            fail_from: Some(n + 1),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl FactSink for FlakyFactSink {
    async fn insert_or_ignore(&self, records: &[FactRecord]) -> Result<u64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let listed = self.failing_calls.lock().unwrap().contains(&call);
        let past_limit = self.fail_from.map_or(false, |from| call >= from);
        if listed || past_limit {
            return Err(Error::Internal(format!("sink unavailable (call {})", call)));
        }
        self.inner.insert_or_ignore(records).await
    }
}

#[derive(Default)]
pub struct MemoryRejectionSink {
    pub rows: Mutex<Vec<RejectedRecord>>,
}

impl MemoryRejectionSink {
    pub fn reasons(&self) -> Vec<String> {
        self.rows.lock().unwrap().iter().map(|r| r.reason.clone()).collect()
    }
}

#[async_trait]
impl RejectionSink for MemoryRejectionSink {
    async fn append(&self, rejections: &[RejectedRecord]) -> Result<()> {
        self.rows.lock().unwrap().extend_from_slice(rejections);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRunTracker {
    pub runs: Mutex<HashMap<(String, String), RunRecord>>,
    pub starts: AtomicU32,
}

impl MemoryRunTracker {
    pub fn get(&self, file_name: &str, source: &str) -> Option<RunRecord> {
        self.runs
            .lock()
            .unwrap()
            .get(&(file_name.to_string(), source.to_string()))
            .cloned()
    }

    fn finish(
        &self,
        file_name: &str,
        source: &str,
        status: RunStatus,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&(file_name.to_string(), source.to_string()))
            .ok_or_else(|| Error::NotFound(file_name.to_string()))?;
        run.status = status;
        run.counts = counts;
        run.completed_at = Some(completed_at);
        run.error_message = error_message.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl RunTracker for MemoryRunTracker {
    async fn find_run(&self, file_name: &str, source: &str) -> Result<Option<RunRecord>> {
        Ok(self.get(file_name, source))
    }

    async fn start_run(
        &self,
        file_name: &str,
        source: &str,
        started_at: DateTime<Utc>,
    ) -> Result<RunRecord> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let run = RunRecord {
            file_name: file_name.to_string(),
            source: source.to_string(),
            counts: RunCounts::default(),
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            error_message: None,
        };
        self.runs
            .lock()
            .unwrap()
            .insert((file_name.to_string(), source.to_string()), run.clone());
        Ok(run)
    }

    async fn complete_run(
        &self,
        file_name: &str,
        source: &str,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.finish(file_name, source, RunStatus::Completed, counts, completed_at, None)
    }

    async fn fail_run(
        &self,
        file_name: &str,
        source: &str,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        self.finish(
            file_name,
            source,
            RunStatus::Failed,
            counts,
            completed_at,
            Some(error_message),
        )
    }
}

/// Run tracker whose `complete_run` always fails; everything else is delegated
pub struct CompletionFailingTracker {
    pub inner: Arc<MemoryRunTracker>,
    pub complete_calls: AtomicU32,
}

impl CompletionFailingTracker {
    pub fn new(inner: Arc<MemoryRunTracker>) -> Self {
        Self {
            inner,
            complete_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RunTracker for CompletionFailingTracker {
    async fn find_run(&self, file_name: &str, source: &str) -> Result<Option<RunRecord>> {
        self.inner.find_run(file_name, source).await
    }

    async fn start_run(
        &self,
        file_name: &str,
        source: &str,
        started_at: DateTime<Utc>,
    ) -> Result<RunRecord> {
        self.inner.start_run(file_name, source, started_at).await
    }

    async fn complete_run(
        &self,
        _file_name: &str,
        _source: &str,
        _counts: RunCounts,
        _completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let call = self.complete_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(Error::Internal(format!("run table locked (call {})", call)))
    }

    async fn fail_run(
        &self,
        file_name: &str,
        source: &str,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        self.inner
            .fail_run(file_name, source, counts, completed_at, error_message)
            .await
    }
}

/// Loader over in-memory collaborators, with handles to inspect them
pub struct MemoryHarness {
    pub lookup: Arc<StaticLookup>,
    pub facts: Arc<MemoryFactSink>,
    pub rejections: Arc<MemoryRejectionSink>,
    pub runs: Arc<MemoryRunTracker>,
}

impl MemoryHarness {
    pub fn new() -> Self {
        Self {
            lookup: Arc::new(StaticLookup::standard()),
            facts: Arc::new(MemoryFactSink::default()),
            rejections: Arc::new(MemoryRejectionSink::default()),
            runs: Arc::new(MemoryRunTracker::default()),
        }
    }

    pub fn loader(&self) -> ChunkedFactLoader {
        self.loader_with_sink(self.facts.clone())
    }

    /// Same collaborators but a different fact sink (e.g. a flaky wrapper)
    pub fn loader_with_sink(&self, facts: Arc<dyn FactSink>) -> ChunkedFactLoader {
        ChunkedFactLoader::new(
            self.lookup.clone(),
            facts,
            self.rejections.clone(),
            self.runs.clone(),
        )
        .with_retry_policy(fast_retry(3))
    }
}
