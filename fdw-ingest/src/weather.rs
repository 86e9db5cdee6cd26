//! Weather observations
//!
//! Airport observation CSVs (one row per airport and observation time) are
//! loaded into `weather_observations`. Rows whose airport or date is missing
//! from the dimensions are rejected with an audit entry, the same way flight
//! rows are. Rerunning a file only inserts observations not yet present.

use chrono::Utc;
use csv::{ByteRecord, Reader};
use fdw_common::db::{RejectedRecord, RunCounts};
use fdw_common::{Error, Result};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::db::{SqliteDimensionLookup, SqliteRejectionSink, SqliteRunTracker};
use crate::dimensions::read_csv_blocking;
use crate::loader::{DimensionLookup, RejectionSink, RunTracker};
use crate::models::{Dimension, MalformedField};
use crate::source::columns::HeaderIndex;
use crate::source::convert::{normalize_date, optional_float, optional_text};
use crate::source::csv_reader::{decode_row, raw_payload};
use crate::source::file_name_of;

/// Run-tracking source for weather loads
pub const WEATHER_SOURCE: &str = "weather";

pub const AIRPORT_CODE: &str = "airport_code";
pub const OBSERVATION_DATE: &str = "observation_date";
pub const OBSERVATION_TIME: &str = "observation_time";
pub const AVG_TEMPERATURE: &str = "avg_temperature";
pub const MAX_TEMPERATURE: &str = "max_temperature";
pub const MIN_TEMPERATURE: &str = "min_temperature";
pub const AVG_WIND_SPEED: &str = "avg_wind_speed";
pub const MAX_WIND_SPEED: &str = "max_wind_speed";
pub const AVG_VISIBILITY: &str = "avg_visibility";
pub const PRECIPITATION: &str = "precipitation";
pub const SNOW_DEPTH: &str = "snow_depth";
pub const CONDITIONS: &str = "conditions";

/// Columns a weather file cannot be loaded without
pub const REQUIRED: [&str; 2] = [AIRPORT_CODE, OBSERVATION_TIME];

/// 12 binds per row
const ROWS_PER_STATEMENT: usize = 500;

/// One observation row as stored.
///
/// Temperatures are Fahrenheit, wind speeds mph, visibility miles,
/// precipitation and snow depth inches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherObservation {
    pub airport_code: String,
    /// `YYYY-MM-DD`, taken from the time when the file has no date column
    pub observation_date: String,
    pub observation_time: String,
    pub avg_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub avg_wind_speed: Option<f64>,
    pub max_wind_speed: Option<f64>,
    pub avg_visibility: Option<f64>,
    pub precipitation: Option<f64>,
    pub snow_depth: Option<f64>,
    pub conditions: Option<String>,
}

impl WeatherObservation {
    /// Any measure outside its physically plausible range
    pub fn out_of_range(&self) -> bool {
        let limits = [
            (self.avg_temperature, -60.0, 130.0),
            (self.max_temperature, -60.0, 135.0),
            (self.min_temperature, -70.0, 125.0),
            (self.avg_wind_speed, 0.0, 200.0),
            (self.max_wind_speed, 0.0, 300.0),
            (self.avg_visibility, 0.0, 50.0),
            (self.precipitation, 0.0, f64::INFINITY),
            (self.snow_depth, 0.0, f64::INFINITY),
        ];
        limits
            .iter()
            .any(|(value, min, max)| value.map_or(false, |v| v < *min || v > *max))
    }
}

/// Why a weather row was not loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherRejection {
    UnknownAirport(String),
    UnknownDate(String),
    MalformedField { field: String, value: String },
}

impl WeatherRejection {
    pub fn label(&self) -> &'static str {
        match self {
            WeatherRejection::UnknownAirport(_) => "unknown airport",
            WeatherRejection::UnknownDate(_) => "unknown observation date",
            WeatherRejection::MalformedField { .. } => "malformed field",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            WeatherRejection::UnknownAirport(value) | WeatherRejection::UnknownDate(value) => {
                value.clone()
            }
            WeatherRejection::MalformedField { field, value } => format!("{}={:?}", field, value),
        }
    }
}

/// One data row of a weather file
#[derive(Debug, Clone)]
pub struct WeatherRow {
    /// 1-based data row
    pub row_number: u64,
    pub raw: String,
    pub observation: WeatherObservation,
    /// First conversion problem in the row
    pub malformed: Option<MalformedField>,
}

impl WeatherRow {
    /// Airport first, then date, then conversion problems
    pub fn rejection(
        &self,
        airports: &HashSet<String>,
        dates: &HashSet<String>,
    ) -> Option<WeatherRejection> {
        let obs = &self.observation;
        if !airports.contains(&obs.airport_code) {
            return Some(WeatherRejection::UnknownAirport(obs.airport_code.clone()));
        }
        if !dates.contains(&obs.observation_date) {
            return Some(WeatherRejection::UnknownDate(obs.observation_date.clone()));
        }
        self.malformed.as_ref().map(|m| WeatherRejection::MalformedField {
            field: m.field.clone(),
            value: m.value.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub struct WeatherParse {
    pub rows: Vec<WeatherRow>,
    /// Required columns absent from the header; no rows are read when non-empty
    pub missing_columns: Vec<&'static str>,
}

/// Read every row of a weather CSV with a header row
pub fn parse_weather<R: Read>(reader: &mut Reader<R>) -> csv::Result<WeatherParse> {
    let index = HeaderIndex::new(reader.headers()?);
    let missing_columns = index.missing(&REQUIRED);
    if !missing_columns.is_empty() {
        return Ok(WeatherParse {
            rows: Vec::new(),
            missing_columns,
        });
    }

    let mut rows = Vec::new();
    let mut bytes = ByteRecord::new();
    while reader.read_byte_record(&mut bytes)? {
        let row_number = rows.len() as u64 + 1;
        rows.push(parse_weather_row(row_number, &index, &bytes));
    }

    Ok(WeatherParse {
        rows,
        missing_columns,
    })
}

fn parse_weather_row(row_number: u64, index: &HeaderIndex, bytes: &ByteRecord) -> WeatherRow {
    let (row, bad_field) = decode_row(bytes);
    let mut malformed = bad_field.map(|position| MalformedField {
        field: index.name_at(position).unwrap_or("unnamed column").to_string(),
        value: row.get(position).unwrap_or("").to_string(),
    });

    let observation_time = index.get(&row, OBSERVATION_TIME).to_string();
    let date_text = match index.get(&row, OBSERVATION_DATE) {
        "" => observation_time
            .split(|c: char| c == ' ' || c == 'T')
            .next()
            .unwrap_or(""),
        text => text,
    };
    let observation_date = normalize_date(date_text);

    let mut float = |column: &str| -> Option<f64> {
        let text = index.get(&row, column);
        optional_float(text).unwrap_or_else(|_| {
            if malformed.is_none() {
                malformed = Some(MalformedField {
                    field: column.to_string(),
                    value: text.to_string(),
                });
            }
            None
        })
    };

    let observation = WeatherObservation {
        airport_code: index.get(&row, AIRPORT_CODE).to_uppercase(),
        observation_date,
        avg_temperature: float(AVG_TEMPERATURE),
        max_temperature: float(MAX_TEMPERATURE),
        min_temperature: float(MIN_TEMPERATURE),
        avg_wind_speed: float(AVG_WIND_SPEED),
        max_wind_speed: float(MAX_WIND_SPEED),
        avg_visibility: float(AVG_VISIBILITY),
        precipitation: float(PRECIPITATION),
        snow_depth: float(SNOW_DEPTH),
        conditions: optional_text(index.get(&row, CONDITIONS)),
        observation_time,
    };

    if observation.observation_time.is_empty() && malformed.is_none() {
        malformed = Some(MalformedField {
            field: OBSERVATION_TIME.to_string(),
            value: String::new(),
        });
    }

    WeatherRow {
        row_number,
        raw: raw_payload(&row),
        observation,
        malformed,
    }
}

/// Insert observations not present yet; returns how many were new
pub async fn insert_observations(
    pool: &SqlitePool,
    observations: &[WeatherObservation],
) -> Result<u64> {
    if observations.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for batch in observations.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO weather_observations (\
             airport_code, observation_date, observation_time, \
             avg_temperature, max_temperature, min_temperature, \
             avg_wind_speed, max_wind_speed, avg_visibility, \
             precipitation, snow_depth, conditions) ",
        );
        builder.push_values(batch, |mut row, obs| {
            row.push_bind(obs.airport_code.as_str())
                .push_bind(obs.observation_date.as_str())
                .push_bind(obs.observation_time.as_str())
                .push_bind(obs.avg_temperature)
                .push_bind(obs.max_temperature)
                .push_bind(obs.min_temperature)
                .push_bind(obs.avg_wind_speed)
                .push_bind(obs.max_wind_speed)
                .push_bind(obs.avg_visibility)
                .push_bind(obs.precipitation)
                .push_bind(obs.snow_depth)
                .push_bind(obs.conditions.as_deref());
        });
        builder.push(" ON CONFLICT(airport_code, observation_time) DO NOTHING");

        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Load one weather file and record the run under source `weather`
pub async fn load_weather(pool: &SqlitePool, path: &Path) -> Result<RunCounts> {
    let file_name = file_name_of(path);
    let tracker = SqliteRunTracker::new(pool.clone());
    tracker.start_run(&file_name, WEATHER_SOURCE, Utc::now()).await?;

    match load_file(pool, path, &file_name).await {
        Ok(counts) => {
            tracker
                .complete_run(&file_name, WEATHER_SOURCE, counts, Utc::now())
                .await?;
            Ok(counts)
        }
        Err(err) => {
            let message = err.to_string();
            tracker
                .fail_run(&file_name, WEATHER_SOURCE, RunCounts::default(), Utc::now(), &message)
                .await?;
            Err(err)
        }
    }
}

async fn load_file(pool: &SqlitePool, path: &Path, file_name: &str) -> Result<RunCounts> {
    let parse = read_csv_blocking(path.to_path_buf(), |reader| parse_weather(reader)).await?;
    if !parse.missing_columns.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{}: missing required column(s): {}",
            file_name,
            parse.missing_columns.join(", ")
        )));
    }

    // Snapshot once so every row of the file is judged against the same keys
    let lookup = SqliteDimensionLookup::new(pool.clone());
    let airports = lookup.keys_for(Dimension::Airport).await?;
    let dates = lookup.keys_for(Dimension::Date).await?;

    let rejected_at = Utc::now();
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    let mut out_of_range = 0usize;

    for row in parse.rows {
        match row.rejection(&airports, &dates) {
            Some(reason) => rejected.push(RejectedRecord {
                source: WEATHER_SOURCE.to_string(),
                file_name: file_name.to_string(),
                row_number: row.row_number,
                raw_data: row.raw,
                reason: reason.label().to_string(),
                detail: Some(reason.detail()),
                rejected_at,
            }),
            None => {
                if row.observation.out_of_range() {
                    out_of_range += 1;
                }
                accepted.push(row.observation);
            }
        }
    }

    if out_of_range > 0 {
        warn!(file_name, out_of_range, "Weather observations outside plausible ranges");
    }

    let inserted = insert_observations(pool, &accepted).await?;
    if !rejected.is_empty() {
        SqliteRejectionSink::new(pool.clone()).append(&rejected).await?;
    }

    let counts = RunCounts {
        rows_processed: (accepted.len() + rejected.len()) as u64,
        rows_loaded: accepted.len() as u64,
        rows_rejected: rejected.len() as u64,
    };
    info!(
        file_name,
        inserted,
        already_present = accepted.len() as u64 - inserted.min(accepted.len() as u64),
        rejected = counts.rows_rejected,
        "Weather observations loaded"
    );
    Ok(counts)
}

/// Number of rows in weather_observations
pub async fn count_observations(pool: &SqlitePool) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weather_observations")
        .fetch_one(pool)
        .await?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::seeded_pool;
    use crate::db::{get_run, list_rejections, RejectionFilter};
    use fdw_common::db::RunStatus;
    use std::io::Cursor;

    const HEADER: &str = "airport_code,observation_date,observation_time,avg_temperature,avg_wind_speed,avg_visibility,precipitation,conditions";

    fn parse(csv: &str) -> WeatherParse {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(Cursor::new(csv.as_bytes().to_vec()));
        parse_weather(&mut reader).unwrap()
    }

    fn keys(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_rows_and_derive_date() {
        let csv = "airport_code,observation_time,avg_temperature,conditions\n\
                   jfk,2025-01-01 10:51,31.0,Clear\n\
                   LAX,1/2/2025 08:00,,\n";
        let parse = parse(csv);

        assert!(parse.missing_columns.is_empty());
        assert_eq!(parse.rows.len(), 2);
        let first = &parse.rows[0].observation;
        assert_eq!(first.airport_code, "JFK");
        assert_eq!(first.observation_date, "2025-01-01");
        assert_eq!(first.avg_temperature, Some(31.0));
        assert_eq!(first.conditions.as_deref(), Some("Clear"));
        assert_eq!(parse.rows[1].observation.observation_date, "2025-01-02");
        assert_eq!(parse.rows[1].observation.avg_temperature, None);
    }

    #[test]
    fn test_missing_required_columns_reported() {
        let parse = parse("airport_code,avg_temperature\nJFK,30\n");
        assert_eq!(parse.missing_columns, vec![OBSERVATION_TIME]);
        assert!(parse.rows.is_empty());
    }

    #[test]
    fn test_rejection_precedence() {
        let csv = format!(
            "{}\nXXX,2025-01-01,2025-01-01 10:00,warm,,,,\n\
             JFK,2025-03-01,2025-03-01 10:00,warm,,,,\n\
             JFK,2025-01-01,2025-01-01 10:00,warm,,,,\n\
             JFK,2025-01-01,2025-01-01 11:00,40,5,10,0,Clear\n",
            HEADER
        );
        let parse = parse(&csv);
        let airports = keys(&["JFK", "LAX"]);
        let dates = keys(&["2025-01-01"]);

        let reasons: Vec<Option<&'static str>> = parse
            .rows
            .iter()
            .map(|row| row.rejection(&airports, &dates).map(|r| r.label()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                Some("unknown airport"),
                Some("unknown observation date"),
                Some("malformed field"),
                None
            ]
        );
    }

    #[test]
    fn test_out_of_range_measures() {
        let csv = format!("{}\nJFK,2025-01-01,2025-01-01 10:00,40,250,10,0,Windy\n", HEADER);
        assert!(parse(&csv).rows[0].observation.out_of_range());

        let csv = format!("{}\nJFK,2025-01-01,2025-01-01 10:00,40,25,10,0,Windy\n", HEADER);
        assert!(!parse(&csv).rows[0].observation.out_of_range());
    }

    #[tokio::test]
    async fn test_load_weather_is_idempotent() {
        let (dir, pool) = seeded_pool().await;
        let path = dir.path().join("weather_jan.csv");
        std::fs::write(
            &path,
            format!(
                "{}\nJFK,2025-01-01,2025-01-01 10:00,40,5,10,0,Clear\n\
                 JFK,2025-01-01,2025-01-01 11:00,41,6,10,0,Clear\n\
                 SFO,2025-01-01,2025-01-01 10:00,60,3,10,0,Clear\n",
                HEADER
            ),
        )
        .unwrap();

        let first = load_weather(&pool, &path).await.unwrap();
        assert_eq!(first.rows_processed, 3);
        assert_eq!(first.rows_loaded, 2);
        assert_eq!(first.rows_rejected, 1);
        assert_eq!(count_observations(&pool).await.unwrap(), 2);

        let second = load_weather(&pool, &path).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(count_observations(&pool).await.unwrap(), 2);

        let run = get_run(&pool, "weather_jan.csv", WEATHER_SOURCE).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        let filter = RejectionFilter {
            source: Some(WEATHER_SOURCE),
            ..RejectionFilter::default()
        };
        let rejections = list_rejections(&pool, &filter).await.unwrap();
        assert_eq!(rejections[0].reason, "unknown airport");
        assert_eq!(rejections[0].detail.as_deref(), Some("SFO"));
    }

    #[tokio::test]
    async fn test_missing_column_fails_run() {
        let (dir, pool) = seeded_pool().await;
        let path = dir.path().join("weather_bad.csv");
        std::fs::write(&path, "airport_code,avg_temperature\nJFK,40\n").unwrap();

        assert!(load_weather(&pool, &path).await.is_err());
        let run = get_run(&pool, "weather_bad.csv", WEATHER_SOURCE).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("observation_time"));
    }
}
