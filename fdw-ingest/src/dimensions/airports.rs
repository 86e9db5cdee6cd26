//! Airport dimension from OpenFlights `airports.dat`
//!
//! The file has no header row and 14 columns:
//! id, name, city, country, IATA, ICAO, latitude, longitude, altitude,
//! UTC offset, DST, tz database name, type, source. `\N` marks NULL.
//! Only airports with a 3-character IATA code are kept.

use chrono::Utc;
use csv::{ReaderBuilder, StringRecord};
use fdw_common::db::RunCounts;
use fdw_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use super::read_blocking;
use crate::db::SqliteRunTracker;
use crate::loader::RunTracker;
use crate::source::file_name_of;

/// Run-tracking source for airport loads
pub const AIRPORTS_SOURCE: &str = "airports";

const COL_NAME: usize = 1;
const COL_CITY: usize = 2;
const COL_COUNTRY: usize = 3;
const COL_IATA: usize = 4;
const COL_LATITUDE: usize = 6;
const COL_LONGITUDE: usize = 7;
const COL_ALTITUDE: usize = 8;
const COL_TIMEZONE: usize = 11;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Airport {
    pub code: String,
    pub name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<i64>,
    pub timezone: Option<String>,
}

/// Parsed airports plus what was dropped along the way
#[derive(Debug, Default)]
pub struct AirportParse {
    pub airports: Vec<Airport>,
    pub rows_read: u64,
    pub without_iata: u64,
    pub duplicates: u64,
    /// Kept, but latitude or longitude lies outside the valid range
    pub out_of_range: u64,
}

/// Parse `airports.dat` content
pub fn parse_airports<R: Read>(reader: R) -> std::result::Result<AirportParse, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    parse_records(reader.records())
}

fn parse_records<I>(records: I) -> std::result::Result<AirportParse, csv::Error>
where
    I: Iterator<Item = std::result::Result<StringRecord, csv::Error>>,
{
    let mut parse = AirportParse::default();
    let mut seen = HashSet::new();

    for record in records {
        let record = record?;
        parse.rows_read += 1;

        let Some(code) = field(&record, COL_IATA).filter(|code| code.chars().count() == 3) else {
            parse.without_iata += 1;
            continue;
        };
        if !seen.insert(code.to_string()) {
            parse.duplicates += 1;
            continue;
        }

        let latitude = field(&record, COL_LATITUDE).and_then(|v| v.parse::<f64>().ok());
        let longitude = field(&record, COL_LONGITUDE).and_then(|v| v.parse::<f64>().ok());
        let in_range = latitude.map_or(true, |lat| (-90.0..=90.0).contains(&lat))
            && longitude.map_or(true, |lon| (-180.0..=180.0).contains(&lon));
        if !in_range {
            parse.out_of_range += 1;
            warn!(code, ?latitude, ?longitude, "Airport coordinates out of range");
        }

        parse.airports.push(Airport {
            code: code.to_string(),
            name: field(&record, COL_NAME).unwrap_or(code).to_string(),
            city: field(&record, COL_CITY).map(str::to_string),
            country: field(&record, COL_COUNTRY).map(str::to_string),
            latitude,
            longitude,
            altitude: field(&record, COL_ALTITUDE)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v.round() as i64),
            timezone: field(&record, COL_TIMEZONE).map(str::to_string),
        });
    }

    Ok(parse)
}

fn field(record: &StringRecord, index: usize) -> Option<&str> {
    record
        .get(index)
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "\\N")
}

/// Insert airports that are not present yet; returns how many were new
pub async fn insert_airports(pool: &SqlitePool, airports: &[Airport]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for airport in airports {
        let result = sqlx::query(
            r#"
            INSERT INTO airports (airport_code, airport_name, city, country,
                                  latitude, longitude, altitude, timezone)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(airport_code) DO NOTHING
            "#,
        )
        .bind(&airport.code)
        .bind(&airport.name)
        .bind(&airport.city)
        .bind(&airport.country)
        .bind(airport.latitude)
        .bind(airport.longitude)
        .bind(airport.altitude)
        .bind(&airport.timezone)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Load an `airports.dat` file and record the run under source `airports`
pub async fn load_airports(pool: &SqlitePool, path: &Path) -> Result<u64> {
    let file_name = file_name_of(path);
    let tracker = SqliteRunTracker::new(pool.clone());
    tracker.start_run(&file_name, AIRPORTS_SOURCE, Utc::now()).await?;

    let parse = match read_blocking(path.to_path_buf(), false, |reader| parse_records(reader.records())).await {
        Ok(parse) => parse,
        Err(err) => {
            let message = err.to_string();
            tracker
                .fail_run(&file_name, AIRPORTS_SOURCE, RunCounts::default(), Utc::now(), &message)
                .await?;
            return Err(err);
        }
    };

    info!(
        rows = parse.rows_read,
        valid = parse.airports.len(),
        without_iata = parse.without_iata,
        duplicates = parse.duplicates,
        out_of_range = parse.out_of_range,
        "Parsed airports"
    );

    let inserted = insert_airports(pool, &parse.airports).await?;

    let kept = parse.airports.len() as u64;
    let counts = RunCounts {
        rows_processed: kept,
        rows_loaded: kept,
        rows_rejected: 0,
    };
    tracker
        .complete_run(&file_name, AIRPORTS_SOURCE, counts, Utc::now())
        .await?;

    info!(file_name, inserted, "Loaded airports");
    Ok(inserted)
}
