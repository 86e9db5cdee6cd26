//! Tests for warehouse database initialization

use fdw_common::db::init::{create_schema, init_database};
use tempfile::TempDir;

const TABLES: [&str; 7] = [
    "carriers",
    "airports",
    "date_dim",
    "flights",
    "weather_observations",
    "rejected_records",
    "pipeline_runs",
];

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sub").join("warehouse.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_all_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("warehouse.db")).await.unwrap();

    for table in TABLES {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("warehouse.db");

    let pool = init_database(&db_path).await.unwrap();
    create_schema(&pool).await.unwrap();
    pool.close().await;

    let reopened = init_database(&db_path).await;
    assert!(reopened.is_ok(), "Failed to reopen database: {:?}", reopened.err());
}

#[tokio::test]
async fn test_pipeline_runs_unique_per_file_and_source() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("warehouse.db")).await.unwrap();

    let insert = "INSERT INTO pipeline_runs (file_name, source, status, started_at) VALUES (?, ?, 'running', '2025-01-01T00:00:00.000Z')";
    sqlx::query(insert).bind("jan.csv").bind("flights").execute(&pool).await.unwrap();
    sqlx::query(insert).bind("jan.csv").bind("weather").execute(&pool).await.unwrap();

    let duplicate = sqlx::query(insert).bind("jan.csv").bind("flights").execute(&pool).await;
    assert!(duplicate.is_err(), "duplicate (file_name, source) must violate UNIQUE");
}

#[tokio::test]
async fn test_run_status_is_constrained() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("warehouse.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO pipeline_runs (file_name, source, status, started_at) VALUES ('a.csv', 'flights', 'paused', '2025-01-01T00:00:00.000Z')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_foreign_keys_enforced_on_flights() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("warehouse.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO flights (flight_date, carrier_code, flight_number, origin_airport, dest_airport, scheduled_dep) VALUES ('2025-01-01', 'ZZ', 1, 'AAA', 'BBB', '0800')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "orphan flight row must be refused");
}
