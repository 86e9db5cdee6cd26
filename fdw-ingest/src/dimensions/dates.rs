//! Date dimension generation

use chrono::{Datelike, NaiveDate, Weekday};
use fdw_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

use super::read_csv_blocking;
use crate::source::columns::{self as col, HeaderIndex};
use crate::source::csv_reader::decode_row;
use crate::source::convert::parse_date;

/// One `date_dim` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRow {
    pub date_id: String,
    pub year: i32,
    pub quarter: u32,
    pub month: u32,
    pub day_of_month: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub day_name: String,
    pub month_name: String,
    pub is_weekend: bool,
    pub season: &'static str,
}

impl DateRow {
    pub fn from_date(date: NaiveDate) -> Self {
        let weekday = date.weekday();
        Self {
            date_id: date.format("%Y-%m-%d").to_string(),
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
            month: date.month(),
            day_of_month: date.day(),
            day_of_week: weekday.num_days_from_monday(),
            day_name: date.format("%A").to_string(),
            month_name: date.format("%B").to_string(),
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            season: season(date.month()),
        }
    }
}

/// Meteorological season (northern hemisphere)
pub fn season(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "Winter",
        3..=5 => "Spring",
        6..=8 => "Summer",
        _ => "Fall",
    }
}

/// Insert any of `dates` missing from `date_dim`; existing rows are left alone.
///
/// Returns how many rows were new.
pub async fn ensure_dates_exist<I>(pool: &SqlitePool, dates: I) -> Result<u64>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
    if unique.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut added = 0u64;

    for date in &unique {
        let row = DateRow::from_date(*date);
        let result = sqlx::query(
            r#"
            INSERT INTO date_dim (date_id, year, quarter, month, day_of_month,
                                  day_of_week, day_name, month_name, is_weekend, season)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(date_id) DO NOTHING
            "#,
        )
        .bind(&row.date_id)
        .bind(row.year)
        .bind(row.quarter as i64)
        .bind(row.month as i64)
        .bind(row.day_of_month as i64)
        .bind(row.day_of_week as i64)
        .bind(&row.day_name)
        .bind(&row.month_name)
        .bind(row.is_weekend)
        .bind(row.season)
        .execute(&mut *tx)
        .await?;

        added += result.rows_affected();
    }

    tx.commit().await?;

    info!(processed = unique.len(), added, "Date dimension updated");
    Ok(added)
}

/// Distinct flight dates in a BTS CSV file; unparseable dates are skipped
pub async fn collect_flight_dates(path: PathBuf) -> Result<BTreeSet<NaiveDate>> {
    read_csv_blocking(path, |reader| {
        let index = HeaderIndex::new(reader.headers()?);
        let mut dates = BTreeSet::new();
        for bytes in reader.byte_records() {
            let (row, bad_field) = decode_row(&bytes?);
            if bad_field.is_some() {
                continue;
            }
            if let Some(date) = parse_date(index.get(&row, col::FLIGHT_DATE)) {
                dates.insert(date);
            }
        }
        Ok(dates)
    })
    .await
}

/// Collect dates from every file and make sure they exist
pub async fn generate_from_files(pool: &SqlitePool, paths: &[PathBuf]) -> Result<u64> {
    let mut all_dates = BTreeSet::new();
    for path in paths {
        let dates = collect_flight_dates(path.clone()).await?;
        info!(file = %path.display(), dates = dates.len(), "Read flight dates");
        all_dates.extend(dates);
    }
    ensure_dates_exist(pool, all_dates).await
}
