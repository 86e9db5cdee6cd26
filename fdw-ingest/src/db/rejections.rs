//! Rejected record audit log

use async_trait::async_trait;
use fdw_common::db::RejectedRecord;
use fdw_common::time::{from_db_timestamp, to_db_timestamp};
use fdw_common::Result;
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::loader::RejectionSink;

const ROWS_PER_STATEMENT: usize = 1_000;

/// Default page size for rejection queries
pub const DEFAULT_REJECTION_LIMIT: u32 = 100;

/// `RejectionSink` appending to `rejected_records`
#[derive(Clone)]
pub struct SqliteRejectionSink {
    pool: SqlitePool,
}

impl SqliteRejectionSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RejectionSink for SqliteRejectionSink {
    async fn append(&self, rejections: &[RejectedRecord]) -> Result<()> {
        if rejections.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for batch in rejections.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO rejected_records (source, file_name, row_number, raw_data, \
                 rejection_reason, rejection_detail, rejected_at) ",
            );
            builder.push_values(batch, |mut row, rejection| {
                row.push_bind(rejection.source.as_str())
                    .push_bind(rejection.file_name.as_str())
                    .push_bind(rejection.row_number as i64)
                    .push_bind(rejection.raw_data.as_str())
                    .push_bind(rejection.reason.as_str())
                    .push_bind(rejection.detail.as_deref())
                    .push_bind(to_db_timestamp(&rejection.rejected_at));
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Rejection counts for one reason label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: u64,
}

/// Filter for rejection queries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct RejectionFilter<'a> {
    pub source: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub limit: u32,
}

/// Rejections in file order, newest file first
pub async fn list_rejections(
    pool: &SqlitePool,
    filter: &RejectionFilter<'_>,
) -> Result<Vec<RejectedRecord>> {
    let limit = if filter.limit == 0 {
        DEFAULT_REJECTION_LIMIT
    } else {
        filter.limit
    };

    let rows = sqlx::query(
        r#"
        SELECT source, file_name, row_number, raw_data,
               rejection_reason, rejection_detail, rejected_at
        FROM rejected_records
        WHERE (?1 IS NULL OR source = ?1)
          AND (?2 IS NULL OR file_name = ?2)
        ORDER BY rejection_id
        LIMIT ?3
        "#,
    )
    .bind(filter.source)
    .bind(filter.file_name)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let rejected_at: String = row.try_get("rejected_at")?;
            Ok(RejectedRecord {
                source: row.try_get("source")?,
                file_name: row.try_get("file_name")?,
                row_number: row.try_get::<i64, _>("row_number")? as u64,
                raw_data: row.try_get("raw_data")?,
                reason: row.try_get("rejection_reason")?,
                detail: row.try_get("rejection_detail")?,
                rejected_at: from_db_timestamp(&rejected_at)?,
            })
        })
        .collect()
}

/// Rejections per reason for one file
pub async fn count_by_reason(
    pool: &SqlitePool,
    source: &str,
    file_name: &str,
) -> Result<Vec<ReasonCount>> {
    let rows = sqlx::query(
        r#"
        SELECT rejection_reason, COUNT(*) AS n
        FROM rejected_records
        WHERE source = ? AND file_name = ?
        GROUP BY rejection_reason
        ORDER BY n DESC, rejection_reason
        "#,
    )
    .bind(source)
    .bind(file_name)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ReasonCount {
                reason: row.try_get("rejection_reason")?,
                count: row.try_get::<i64, _>("n")? as u64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fdw_common::db::init_database;
    use tempfile::TempDir;

    fn rejection(file: &str, row: u64, reason: &str) -> RejectedRecord {
        RejectedRecord {
            source: "bts".to_string(),
            file_name: file.to_string(),
            row_number: row,
            raw_data: format!("raw-{}", row),
            reason: reason.to_string(),
            detail: Some("ZZ".to_string()),
            rejected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_filter() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("rej.db")).await.unwrap();
        let sink = SqliteRejectionSink::new(pool.clone());

        sink.append(&[
            rejection("a.csv", 3, "unknown carrier"),
            rejection("a.csv", 9, "unknown carrier"),
            rejection("b.csv", 1, "malformed field"),
        ])
        .await
        .unwrap();

        let all = list_rejections(&pool, &RejectionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let filter = RejectionFilter {
            file_name: Some("a.csv"),
            ..RejectionFilter::default()
        };
        let only_a = list_rejections(&pool, &filter).await.unwrap();
        let rows: Vec<u64> = only_a.iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![3, 9]);
        assert_eq!(only_a[0].raw_data, "raw-3");
        assert_eq!(only_a[0].detail.as_deref(), Some("ZZ"));

        let limited = RejectionFilter {
            limit: 1,
            ..RejectionFilter::default()
        };
        assert_eq!(list_rejections(&pool, &limited).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_count_by_reason() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("rej.db")).await.unwrap();
        let sink = SqliteRejectionSink::new(pool.clone());

        sink.append(&[
            rejection("a.csv", 1, "unknown carrier"),
            rejection("a.csv", 2, "malformed field"),
            rejection("a.csv", 3, "unknown carrier"),
        ])
        .await
        .unwrap();

        let counts = count_by_reason(&pool, "bts", "a.csv").await.unwrap();
        assert_eq!(
            counts[0],
            ReasonCount {
                reason: "unknown carrier".to_string(),
                count: 2
            }
        );
        assert_eq!(counts.len(), 2);
    }
}
