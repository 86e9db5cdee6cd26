//! Background flight loads
//!
//! POST /loads starts a load and returns immediately; POST /loads/cancel
//! triggers the load's cancellation token. Progress is read from GET /runs.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::loader::LoadControl;
use crate::pipeline::{load_flight_file, FlightLoadOptions, FLIGHTS_SOURCE};
use crate::source::file_name_of;
use crate::{AppState, LoadKey};

/// POST /loads request
#[derive(Debug, Deserialize)]
pub struct StartLoadRequest {
    /// Path of the CSV file on the server
    pub path: String,
    pub source: Option<String>,
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub ensure_dates: bool,
}

/// POST /loads response
#[derive(Debug, Serialize)]
pub struct StartLoadResponse {
    pub file_name: String,
    pub source: String,
    pub chunk_size: usize,
    pub accepted_at: DateTime<Utc>,
}

/// Frees a load's slot in `active_loads` when its task ends, panics included
struct ActiveLoadGuard {
    active_loads: Arc<RwLock<HashMap<LoadKey, CancellationToken>>>,
    key: Option<LoadKey>,
}

impl ActiveLoadGuard {
    fn new(active_loads: Arc<RwLock<HashMap<LoadKey, CancellationToken>>>, key: LoadKey) -> Self {
        Self {
            active_loads,
            key: Some(key),
        }
    }
}

impl Drop for ActiveLoadGuard {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        match self.active_loads.try_write() {
            Ok(mut active) => {
                active.remove(&key);
            }
            Err(_) => {
                // Lock is busy; finish the removal on the runtime
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let active_loads = self.active_loads.clone();
                    handle.spawn(async move {
                        active_loads.write().await.remove(&key);
                    });
                }
            }
        }
    }
}

/// POST /loads/cancel request
#[derive(Debug, Deserialize)]
pub struct CancelLoadRequest {
    pub file_name: String,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelLoadResponse {
    pub file_name: String,
    pub source: String,
    pub cancel_requested_at: DateTime<Utc>,
}

/// POST /loads
///
/// 202 with the tracked file name, 409 if the same file and source are
/// already loading in this process.
pub async fn start_load(
    State(state): State<AppState>,
    Json(request): Json<StartLoadRequest>,
) -> ApiResult<(StatusCode, Json<StartLoadResponse>)> {
    let path = PathBuf::from(&request.path);
    if !path.is_file() {
        return Err(ApiError::BadRequest(format!(
            "File does not exist: {}",
            request.path
        )));
    }

    let mut options = FlightLoadOptions::from_config(&state.loader_config);
    if let Some(source) = request.source.filter(|s| !s.trim().is_empty()) {
        options.source = source;
    }
    if let Some(chunk_size) = request.chunk_size {
        if chunk_size == 0 {
            return Err(ApiError::BadRequest("chunk_size must be at least 1".to_string()));
        }
        options.chunk_size = chunk_size;
    }
    options.ensure_dates = request.ensure_dates;

    let file_name = file_name_of(&path);
    let key: LoadKey = (options.source.clone(), file_name.clone());
    let token = CancellationToken::new();

    {
        let mut active = state.active_loads.write().await;
        if active.contains_key(&key) {
            return Err(ApiError::Conflict(format!(
                "'{}' from source '{}' is already loading",
                file_name, options.source
            )));
        }
        active.insert(key.clone(), token.clone());
    }

    let response = StartLoadResponse {
        file_name: file_name.clone(),
        source: options.source.clone(),
        chunk_size: options.chunk_size,
        accepted_at: Utc::now(),
    };

    tracing::info!(
        file_name = %file_name,
        source = %options.source,
        chunk_size = options.chunk_size,
        "Background load accepted"
    );

    let task_state = state.clone();
    tokio::spawn(async move {
        let guard = ActiveLoadGuard::new(task_state.active_loads.clone(), key.clone());
        let control = LoadControl {
            cancel: token,
            deadline: None,
        };
        let result = load_flight_file(&task_state.db, &path, &options, control).await;

        drop(guard);

        match result {
            Ok(summary) => {
                tracing::info!(
                    file_name = %key.1,
                    source = %key.0,
                    rows_loaded = summary.rows_loaded,
                    rows_rejected = summary.rows_rejected,
                    "Background load finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    file_name = %key.1,
                    source = %key.0,
                    error = %e,
                    "Background load failed"
                );
                *task_state.last_error.write().await = Some(format!("{}: {}", key.1, e));
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /loads/cancel
pub async fn cancel_load(
    State(state): State<AppState>,
    Json(request): Json<CancelLoadRequest>,
) -> ApiResult<Json<CancelLoadResponse>> {
    let source = request.source.unwrap_or_else(|| FLIGHTS_SOURCE.to_string());
    let key: LoadKey = (source.clone(), request.file_name.clone());

    let token = state
        .active_loads
        .read()
        .await
        .get(&key)
        .cloned()
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No load of '{}' from source '{}' is running",
                request.file_name, source
            ))
        })?;

    token.cancel();
    tracing::info!(file_name = %request.file_name, source = %source, "Load cancellation requested");

    Ok(Json(CancelLoadResponse {
        file_name: request.file_name,
        source,
        cancel_requested_at: Utc::now(),
    }))
}

pub fn load_routes() -> Router<AppState> {
    Router::new()
        .route("/loads", post(start_load))
        .route("/loads/cancel", post(cancel_load))
}
