//! Pipeline run bookkeeping
//!
//! One `pipeline_runs` row per (file_name, source). Starting a run upserts the
//! row, so an earlier failed or interrupted attempt is reset rather than
//! duplicated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fdw_common::db::{RunCounts, RunRecord, RunStatus};
use fdw_common::time::{from_db_timestamp, to_db_timestamp};
use fdw_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::loader::RunTracker;

const RUN_COLUMNS: &str = "file_name, source, rows_processed, rows_loaded, rows_rejected, \
                           status, started_at, completed_at, error_message";

/// `RunTracker` backed by the `pipeline_runs` table
#[derive(Clone)]
pub struct SqliteRunTracker {
    pool: SqlitePool,
}

impl SqliteRunTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn finish_run(
        &self,
        file_name: &str,
        source: &str,
        status: RunStatus,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = ?,
                rows_processed = ?,
                rows_loaded = ?,
                rows_rejected = ?,
                completed_at = ?,
                error_message = ?
            WHERE file_name = ? AND source = ?
            "#,
        )
        .bind(status.as_str())
        .bind(counts.rows_processed as i64)
        .bind(counts.rows_loaded as i64)
        .bind(counts.rows_rejected as i64)
        .bind(to_db_timestamp(&completed_at))
        .bind(error_message)
        .bind(file_name)
        .bind(source)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "No run for file '{}' from source '{}'",
                file_name, source
            )));
        }

        debug!(file_name, source, status = %status, "Run finished");
        Ok(())
    }
}

#[async_trait]
impl RunTracker for SqliteRunTracker {
    async fn find_run(&self, file_name: &str, source: &str) -> Result<Option<RunRecord>> {
        get_run(&self.pool, file_name, source).await
    }

    async fn start_run(
        &self,
        file_name: &str,
        source: &str,
        started_at: DateTime<Utc>,
    ) -> Result<RunRecord> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (
                file_name, source, rows_processed, rows_loaded, rows_rejected,
                status, started_at, completed_at, error_message
            ) VALUES (?, ?, 0, 0, 0, 'running', ?, NULL, NULL)
            ON CONFLICT(file_name, source) DO UPDATE SET
                rows_processed = 0,
                rows_loaded = 0,
                rows_rejected = 0,
                status = 'running',
                started_at = excluded.started_at,
                completed_at = NULL,
                error_message = NULL
            "#,
        )
        .bind(file_name)
        .bind(source)
        .bind(to_db_timestamp(&started_at))
        .execute(&self.pool)
        .await?;

        get_run(&self.pool, file_name, source).await?.ok_or_else(|| {
            Error::Internal(format!("Run for '{}' vanished after start", file_name))
        })
    }

    async fn complete_run(
        &self,
        file_name: &str,
        source: &str,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.finish_run(file_name, source, RunStatus::Completed, counts, completed_at, None)
            .await
    }

    async fn fail_run(
        &self,
        file_name: &str,
        source: &str,
        counts: RunCounts,
        completed_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        self.finish_run(
            file_name,
            source,
            RunStatus::Failed,
            counts,
            completed_at,
            Some(error_message),
        )
        .await
    }
}

/// Look up the run for (file_name, source)
pub async fn get_run(pool: &SqlitePool, file_name: &str, source: &str) -> Result<Option<RunRecord>> {
    let sql = format!(
        "SELECT {} FROM pipeline_runs WHERE file_name = ? AND source = ?",
        RUN_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(file_name)
        .bind(source)
        .fetch_optional(pool)
        .await?;

    row.map(|row| run_from_row(&row)).transpose()
}

/// All runs, most recently started first
pub async fn list_runs(pool: &SqlitePool, source: Option<&str>) -> Result<Vec<RunRecord>> {
    let sql = format!(
        "SELECT {} FROM pipeline_runs WHERE (?1 IS NULL OR source = ?1) \
         ORDER BY started_at DESC, run_id DESC",
        RUN_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(source).fetch_all(pool).await?;

    rows.iter().map(run_from_row).collect()
}

/// Most recently started run of a source, if any
pub async fn latest_run(pool: &SqlitePool, source: &str) -> Result<Option<RunRecord>> {
    let sql = format!(
        "SELECT {} FROM pipeline_runs WHERE source = ? ORDER BY started_at DESC, run_id DESC LIMIT 1",
        RUN_COLUMNS
    );
    let row = sqlx::query(&sql).bind(source).fetch_optional(pool).await?;

    row.map(|row| run_from_row(&row)).transpose()
}

/// Mark runs left in `running` by a previous process as failed.
///
/// Called once at startup, before any load can begin. Returns the number of
/// runs touched.
pub async fn fail_stale_runs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET status = 'failed',
            completed_at = ?,
            error_message = 'Interrupted: process stopped while the run was in progress'
        WHERE status = 'running'
        "#,
    )
    .bind(to_db_timestamp(&Utc::now()))
    .execute(pool)
    .await?;

    let count = result.rows_affected();
    if count > 0 {
        warn!(count, "Marked stale running runs as failed");
    }
    Ok(count)
}

fn run_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(RunRecord {
        file_name: row.try_get("file_name")?,
        source: row.try_get("source")?,
        counts: RunCounts {
            rows_processed: row.try_get::<i64, _>("rows_processed")? as u64,
            rows_loaded: row.try_get::<i64, _>("rows_loaded")? as u64,
            rows_rejected: row.try_get::<i64, _>("rows_rejected")? as u64,
        },
        status: status.parse()?,
        started_at: from_db_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(from_db_timestamp).transpose()?,
        error_message: row.try_get("error_message")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdw_common::db::init_database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("runs.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_start_creates_running_row() {
        let (_dir, pool) = setup().await;
        let tracker = SqliteRunTracker::new(pool.clone());

        let run = tracker.start_run("a.csv", "bts", Utc::now()).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.counts, RunCounts::default());
        assert!(run.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_restart_resets_failed_run() {
        let (_dir, pool) = setup().await;
        let tracker = SqliteRunTracker::new(pool.clone());
        let counts = RunCounts {
            rows_processed: 10,
            rows_loaded: 8,
            rows_rejected: 2,
        };

        tracker.start_run("a.csv", "bts", Utc::now()).await.unwrap();
        tracker
            .fail_run("a.csv", "bts", counts, Utc::now(), "sink down")
            .await
            .unwrap();

        let failed = tracker.find_run("a.csv", "bts").await.unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.counts, counts);
        assert_eq!(failed.error_message.as_deref(), Some("sink down"));

        let restarted = tracker.start_run("a.csv", "bts", Utc::now()).await.unwrap();
        assert_eq!(restarted.status, RunStatus::Running);
        assert_eq!(restarted.counts, RunCounts::default());
        assert!(restarted.error_message.is_none());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pipeline_runs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_finish_unknown_run_is_not_found() {
        let (_dir, pool) = setup().await;
        let tracker = SqliteRunTracker::new(pool);

        let result = tracker
            .complete_run("missing.csv", "bts", RunCounts::default(), Utc::now())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_same_file_different_source_is_separate_run() {
        let (_dir, pool) = setup().await;
        let tracker = SqliteRunTracker::new(pool.clone());

        tracker.start_run("a.csv", "bts", Utc::now()).await.unwrap();
        tracker.start_run("a.csv", "replay", Utc::now()).await.unwrap();

        assert_eq!(list_runs(&pool, None).await.unwrap().len(), 2);
        assert_eq!(list_runs(&pool, Some("replay")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_stale_runs() {
        let (_dir, pool) = setup().await;
        let tracker = SqliteRunTracker::new(pool.clone());

        tracker.start_run("a.csv", "bts", Utc::now()).await.unwrap();
        tracker.start_run("b.csv", "bts", Utc::now()).await.unwrap();
        tracker
            .complete_run("b.csv", "bts", RunCounts::default(), Utc::now())
            .await
            .unwrap();

        assert_eq!(fail_stale_runs(&pool).await.unwrap(), 1);
        let stale = get_run(&pool, "a.csv", "bts").await.unwrap().unwrap();
        assert_eq!(stale.status, RunStatus::Failed);
        assert!(stale.completed_at.is_some());
    }
}
