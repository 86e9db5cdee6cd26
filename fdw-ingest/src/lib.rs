//! fdw-ingest library interface
//!
//! Chunked, idempotent loading of flight fact records into the warehouse,
//! plus the dimension and weather loaders, quality checks and the HTTP
//! surface around it.

pub mod api;
pub mod db;
pub mod dimensions;
pub mod error;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod source;
pub mod weather;

pub use crate::error::{ApiError, ApiResult, LoadError, LoadResult};
pub use crate::loader::{ChunkedFactLoader, LoadControl, RetryPolicy};
pub use crate::models::RunSummary;

use axum::Router;
use chrono::{DateTime, Utc};
use fdw_common::config::LoaderConfig;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Identifies an in-flight load: (source, file_name)
pub type LoadKey = (String, String);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub loader_config: Arc<LoaderConfig>,
    /// Cancellation tokens of loads running in the background
    pub active_loads: Arc<RwLock<HashMap<LoadKey, CancellationToken>>>,
    pub startup_time: DateTime<Utc>,
    /// Last load failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, loader_config: LoaderConfig) -> Self {
        Self {
            db,
            loader_config: Arc::new(loader_config),
            active_loads: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::run_routes())
        .merge(api::rejection_routes())
        .merge(api::load_routes())
        .merge(api::quality_routes())
        .with_state(state)
}
