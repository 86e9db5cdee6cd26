//! Post-load data quality checks

use fdw_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::{count_dimension, count_flights, latest_run};
use crate::models::Dimension;
use crate::weather::count_observations;

/// Arrival delays outside this range (minutes) are treated as corrupt
pub const ARR_DELAY_RANGE: (f64, f64) = (-150.0, 5000.0);

/// Highest acceptable rejection rate for the latest flight run, in percent
pub const MAX_REJECTION_RATE_PCT: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub checks: Vec<QualityCheck>,
}

impl QualityReport {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.checks.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

fn check(name: &'static str, passed: bool, detail: String) -> QualityCheck {
    if passed {
        info!(check = name, %detail, "Quality check passed");
    } else {
        warn!(check = name, %detail, "Quality check failed");
    }
    QualityCheck { name, passed, detail }
}

/// Run every check against the warehouse.
///
/// `flight_source` names the run-tracking source whose latest run is judged
/// for its rejection rate.
pub async fn run_quality_checks(pool: &SqlitePool, flight_source: &str) -> Result<QualityReport> {
    let mut checks = Vec::new();

    let airports = count_dimension(pool, Dimension::Airport).await?;
    checks.push(check("airports_not_empty", airports > 0, format!("{} rows", airports)));

    let carriers = count_dimension(pool, Dimension::Carrier).await?;
    checks.push(check("carriers_not_empty", carriers > 0, format!("{} rows", carriers)));

    let flights = count_flights(pool).await?;
    checks.push(check("flights_not_empty", flights > 0, format!("{} rows", flights)));

    let orphan_origins: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM flights f
        LEFT JOIN airports a ON f.origin_airport = a.airport_code
        WHERE a.airport_code IS NULL
        "#,
    )
    .fetch_one(pool)
    .await?;
    checks.push(check(
        "no_orphan_origin_airports",
        orphan_origins == 0,
        format!("{} flights with unknown origin", orphan_origins),
    ));

    let orphan_dests: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM flights f
        LEFT JOIN airports a ON f.dest_airport = a.airport_code
        WHERE a.airport_code IS NULL
        "#,
    )
    .fetch_one(pool)
    .await?;
    checks.push(check(
        "no_orphan_destination_airports",
        orphan_dests == 0,
        format!("{} flights with unknown destination", orphan_dests),
    ));

    let bad_delays: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM flights WHERE arr_delay IS NOT NULL AND (arr_delay < ? OR arr_delay > ?)",
    )
    .bind(ARR_DELAY_RANGE.0)
    .bind(ARR_DELAY_RANGE.1)
    .fetch_one(pool)
    .await?;
    checks.push(check(
        "arrival_delays_in_range",
        bad_delays == 0,
        format!("{} flights outside [{}, {}] minutes", bad_delays, ARR_DELAY_RANGE.0, ARR_DELAY_RANGE.1),
    ));

    if let Some(run) = latest_run(pool, flight_source).await? {
        let total = run.counts.rows_loaded + run.counts.rows_rejected;
        if total > 0 {
            let rate = run.counts.rows_rejected as f64 / total as f64 * 100.0;
            checks.push(check(
                "rejection_rate",
                rate < MAX_REJECTION_RATE_PCT,
                format!(
                    "{:.2}% ({}/{}) in {}",
                    rate, run.counts.rows_rejected, total, run.file_name
                ),
            ));
        }
    }

    let observations = count_observations(pool).await?;
    checks.push(check(
        "weather_not_empty",
        observations > 0,
        format!("{} observations", observations),
    ));

    let airports_with_weather: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT w.airport_code) FROM weather_observations w
        JOIN airports a ON w.airport_code = a.airport_code
        "#,
    )
    .fetch_one(pool)
    .await?;
    checks.push(check(
        "airports_with_weather",
        airports_with_weather > 0,
        format!("{} of {} airports", airports_with_weather, airports),
    ));

    let dates_with_weather: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT w.observation_date) FROM weather_observations w
        JOIN date_dim d ON w.observation_date = d.date_id
        "#,
    )
    .fetch_one(pool)
    .await?;
    checks.push(check(
        "dates_with_weather",
        dates_with_weather > 0,
        format!("{} dates", dates_with_weather),
    ));

    let report = QualityReport { checks };
    info!(passed = report.passed(), failed = report.failed(), "Quality checks finished");
    Ok(report)
}
