//! Database initialization
//!
//! Creates the warehouse schema on first run. Every statement is
//! `CREATE ... IF NOT EXISTS`, so opening an existing database is a no-op.

use crate::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every connection, in milliseconds
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Open (creating if needed) the warehouse database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them,
    // not just the first one
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every warehouse table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_carriers_table(pool).await?;
    create_airports_table(pool).await?;
    create_date_dim_table(pool).await?;
    create_flights_table(pool).await?;
    create_weather_observations_table(pool).await?;
    create_rejected_records_table(pool).await?;
    create_pipeline_runs_table(pool).await?;
    Ok(())
}

pub async fn create_carriers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS carriers (
            carrier_code TEXT PRIMARY KEY,
            carrier_name TEXT NOT NULL,
            dot_id INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_airports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS airports (
            airport_code TEXT PRIMARY KEY,
            airport_name TEXT NOT NULL,
            city TEXT,
            country TEXT,
            latitude REAL,
            longitude REAL,
            altitude INTEGER,
            timezone TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_date_dim_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS date_dim (
            date_id TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            quarter INTEGER NOT NULL,
            month INTEGER NOT NULL,
            day_of_month INTEGER NOT NULL,
            day_of_week INTEGER NOT NULL,
            day_name TEXT NOT NULL,
            month_name TEXT NOT NULL,
            is_weekend INTEGER NOT NULL,
            season TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_flights_table(pool: &SqlitePool) -> Result<()> {
    // The UNIQUE constraint is the natural key the fact sink resolves conflicts on
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flights (
            flight_id INTEGER PRIMARY KEY AUTOINCREMENT,
            flight_date TEXT NOT NULL REFERENCES date_dim(date_id),
            carrier_code TEXT NOT NULL REFERENCES carriers(carrier_code),
            tail_number TEXT,
            flight_number INTEGER NOT NULL,
            origin_airport TEXT NOT NULL REFERENCES airports(airport_code),
            origin_city TEXT,
            origin_state TEXT,
            dest_airport TEXT NOT NULL REFERENCES airports(airport_code),
            dest_city TEXT,
            dest_state TEXT,
            scheduled_dep TEXT NOT NULL,
            actual_dep TEXT,
            dep_delay REAL,
            dep_delay_minutes REAL,
            dep_delay_15 INTEGER,
            scheduled_arr TEXT,
            actual_arr TEXT,
            arr_delay REAL,
            arr_delay_minutes REAL,
            arr_delay_15 INTEGER,
            cancelled INTEGER NOT NULL DEFAULT 0,
            cancellation_code TEXT,
            diverted INTEGER NOT NULL DEFAULT 0,
            distance REAL,
            air_time REAL,
            scheduled_elapsed REAL,
            actual_elapsed REAL,
            carrier_delay REAL,
            weather_delay REAL,
            nas_delay REAL,
            security_delay REAL,
            late_aircraft_delay REAL,
            UNIQUE (flight_date, carrier_code, flight_number, origin_airport, scheduled_dep)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flights_origin ON flights(origin_airport)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flights_dest ON flights(dest_airport)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_weather_observations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_observations (
            observation_id INTEGER PRIMARY KEY AUTOINCREMENT,
            airport_code TEXT NOT NULL REFERENCES airports(airport_code),
            observation_date TEXT NOT NULL REFERENCES date_dim(date_id),
            observation_time TEXT NOT NULL,
            avg_temperature REAL,
            max_temperature REAL,
            min_temperature REAL,
            avg_wind_speed REAL,
            max_wind_speed REAL,
            avg_visibility REAL,
            precipitation REAL,
            snow_depth REAL,
            conditions TEXT,
            UNIQUE (airport_code, observation_time)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_rejected_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rejected_records (
            rejection_id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            file_name TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            raw_data TEXT NOT NULL,
            rejection_reason TEXT NOT NULL,
            rejection_detail TEXT,
            rejected_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rejected_records_file ON rejected_records(source, file_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_pipeline_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL,
            source TEXT NOT NULL,
            rows_processed INTEGER NOT NULL DEFAULT 0,
            rows_loaded INTEGER NOT NULL DEFAULT 0,
            rows_rejected INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL CHECK (status IN ('running', 'completed', 'failed')),
            started_at TEXT NOT NULL,
            completed_at TEXT,
            error_message TEXT,
            UNIQUE (file_name, source)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
