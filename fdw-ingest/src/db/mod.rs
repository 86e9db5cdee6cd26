//! SQLite adapters for the loader's collaborators

pub mod dimensions;
pub mod flights;
pub mod rejections;
pub mod runs;

pub use dimensions::{count_dimension, SqliteDimensionLookup};
pub use flights::{count_flights, SqliteFactSink};
pub use rejections::{count_by_reason, list_rejections, ReasonCount, RejectionFilter, SqliteRejectionSink};
pub use runs::{fail_stale_runs, get_run, latest_run, list_runs, SqliteRunTracker};

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::loader::{ChunkedFactLoader, RetryPolicy};

/// Loader wired to SQLite adapters sharing one pool
pub fn sqlite_loader(pool: &SqlitePool, retry: RetryPolicy) -> ChunkedFactLoader {
    ChunkedFactLoader::new(
        Arc::new(SqliteDimensionLookup::new(pool.clone())),
        Arc::new(SqliteFactSink::new(pool.clone())),
        Arc::new(SqliteRejectionSink::new(pool.clone())),
        Arc::new(SqliteRunTracker::new(pool.clone())),
    )
    .with_retry_policy(retry)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDate;
    use fdw_common::db::init_database;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    use crate::dimensions::{ensure_dates_exist, insert_carriers, Carrier};

    /// Fresh database with carriers AA/DL, airports JFK/LAX/ATL and two January dates
    pub async fn seeded_pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();

        insert_carriers(&pool, &[Carrier::new("AA", None), Carrier::new("DL", None)])
            .await
            .unwrap();
        for code in ["JFK", "LAX", "ATL"] {
            sqlx::query("INSERT INTO airports (airport_code, airport_name) VALUES (?, ?)")
                .bind(code)
                .bind(format!("{} Airport", code))
                .execute(&pool)
                .await
                .unwrap();
        }
        ensure_dates_exist(
            &pool,
            [
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            ],
        )
        .await
        .unwrap();

        (dir, pool)
    }
}
