//! Flight fact writes

use async_trait::async_trait;
use fdw_common::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::loader::FactSink;
use crate::models::FactRecord;

/// Rows per INSERT statement; 32 binds each keeps us well under SQLite's limit
pub const ROWS_PER_STATEMENT: usize = 500;

const INSERT_HEAD: &str = "INSERT INTO flights (\
    flight_date, carrier_code, tail_number, flight_number, \
    origin_airport, origin_city, origin_state, \
    dest_airport, dest_city, dest_state, \
    scheduled_dep, actual_dep, dep_delay, dep_delay_minutes, dep_delay_15, \
    scheduled_arr, actual_arr, arr_delay, arr_delay_minutes, arr_delay_15, \
    cancelled, cancellation_code, diverted, distance, air_time, \
    scheduled_elapsed, actual_elapsed, \
    carrier_delay, weather_delay, nas_delay, security_delay, late_aircraft_delay) ";

const ON_CONFLICT: &str = " ON CONFLICT(flight_date, carrier_code, flight_number, origin_airport, scheduled_dep) DO NOTHING";

/// `FactSink` writing into the `flights` table.
///
/// Each call runs in one transaction, so a failed batch leaves nothing behind.
#[derive(Clone)]
pub struct SqliteFactSink {
    pool: SqlitePool,
}

impl SqliteFactSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FactSink for SqliteFactSink {
    async fn insert_or_ignore(&self, records: &[FactRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        if let Some(bad) = records
            .iter()
            .find(|r| r.flight_number.is_none() || r.scheduled_dep.is_none())
        {
            return Err(Error::InvalidInput(format!(
                "Row {} is missing a natural key field",
                bad.row_number
            )));
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for batch in records.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(INSERT_HEAD);
            builder.push_values(batch, |mut row, record| {
                let m = &record.measures;
                row.push_bind(record.flight_date.as_str())
                    .push_bind(record.carrier_code.as_str())
                    .push_bind(m.tail_number.as_deref())
                    .push_bind(record.flight_number)
                    .push_bind(record.origin_airport.as_str())
                    .push_bind(m.origin_city.as_deref())
                    .push_bind(m.origin_state.as_deref())
                    .push_bind(record.dest_airport.as_str())
                    .push_bind(m.dest_city.as_deref())
                    .push_bind(m.dest_state.as_deref())
                    .push_bind(record.scheduled_dep.as_deref())
                    .push_bind(m.actual_dep.as_deref())
                    .push_bind(m.dep_delay)
                    .push_bind(m.dep_delay_minutes)
                    .push_bind(m.dep_delay_15)
                    .push_bind(m.scheduled_arr.as_deref())
                    .push_bind(m.actual_arr.as_deref())
                    .push_bind(m.arr_delay)
                    .push_bind(m.arr_delay_minutes)
                    .push_bind(m.arr_delay_15)
                    .push_bind(m.cancelled)
                    .push_bind(m.cancellation_code.as_deref())
                    .push_bind(m.diverted)
                    .push_bind(m.distance)
                    .push_bind(m.air_time)
                    .push_bind(m.scheduled_elapsed)
                    .push_bind(m.actual_elapsed)
                    .push_bind(m.carrier_delay)
                    .push_bind(m.weather_delay)
                    .push_bind(m.nas_delay)
                    .push_bind(m.security_delay)
                    .push_bind(m.late_aircraft_delay);
            });
            builder.push(ON_CONFLICT);

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(
            records = records.len(),
            inserted,
            "Flight batch committed"
        );
        Ok(inserted)
    }
}

/// Number of rows in the flights table
pub async fn count_flights(pool: &SqlitePool) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flights")
        .fetch_one(pool)
        .await?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::seeded_pool;

    #[tokio::test]
    async fn test_insert_skips_existing_natural_keys() {
        let (_dir, pool) = seeded_pool().await;
        let sink = SqliteFactSink::new(pool.clone());

        let first = vec![
            FactRecord::flight(1, "2025-01-01", "AA", 100, "JFK", "LAX", "0800"),
            FactRecord::flight(2, "2025-01-01", "AA", 101, "JFK", "LAX", "0900"),
        ];
        assert_eq!(sink.insert_or_ignore(&first).await.unwrap(), 2);

        let again = vec![
            FactRecord::flight(1, "2025-01-01", "AA", 100, "JFK", "LAX", "0800"),
            FactRecord::flight(3, "2025-01-01", "AA", 102, "JFK", "LAX", "1000"),
        ];
        assert_eq!(sink.insert_or_ignore(&again).await.unwrap(), 1);
        assert_eq!(count_flights(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_batches_larger_than_one_statement() {
        let (_dir, pool) = seeded_pool().await;
        let sink = SqliteFactSink::new(pool.clone());

        let records: Vec<FactRecord> = (1..=(ROWS_PER_STATEMENT as u64 * 2 + 7))
            .map(|i| FactRecord::flight(i, "2025-01-01", "AA", i as i64, "JFK", "LAX", "0800"))
            .collect();

        let inserted = sink.insert_or_ignore(&records).await.unwrap();
        assert_eq!(inserted, records.len() as u64);
        assert_eq!(count_flights(&pool).await.unwrap(), records.len() as u64);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let (_dir, pool) = seeded_pool().await;
        let sink = SqliteFactSink::new(pool.clone());

        // Second row violates the carrier foreign key
        let records = vec![
            FactRecord::flight(1, "2025-01-01", "AA", 100, "JFK", "LAX", "0800"),
            FactRecord::flight(2, "2025-01-01", "ZZ", 100, "JFK", "LAX", "0800"),
        ];
        assert!(sink.insert_or_ignore(&records).await.is_err());
        assert_eq!(count_flights(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_field_is_invalid_input() {
        let (_dir, pool) = seeded_pool().await;
        let sink = SqliteFactSink::new(pool);

        let mut record = FactRecord::flight(1, "2025-01-01", "AA", 100, "JFK", "LAX", "0800");
        record.scheduled_dep = None;
        let result = sink.insert_or_ignore(&[record]).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
