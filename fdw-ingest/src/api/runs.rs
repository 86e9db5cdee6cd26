//! Run tracking queries
//!
//! GET /runs, GET /runs/:source/:file_name

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use fdw_common::db::RunRecord;
use serde::{Deserialize, Serialize};

use crate::db::{count_by_reason, get_run, list_runs, ReasonCount};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunRecord>,
}

#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    pub run: RunRecord,
    pub rejections_by_reason: Vec<ReasonCount>,
    /// True when another load of this file is running in this process
    pub in_flight: bool,
}

/// GET /runs
pub async fn get_runs(
    State(state): State<AppState>,
    Query(query): Query<RunListQuery>,
) -> ApiResult<Json<RunListResponse>> {
    let runs = list_runs(&state.db, query.source.as_deref()).await?;
    Ok(Json(RunListResponse { runs }))
}

/// GET /runs/:source/:file_name
pub async fn get_run_detail(
    State(state): State<AppState>,
    Path((source, file_name)): Path<(String, String)>,
) -> ApiResult<Json<RunDetailResponse>> {
    let run = get_run(&state.db, &file_name, &source)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No run for '{}' from source '{}'", file_name, source))
        })?;

    let rejections_by_reason = count_by_reason(&state.db, &source, &file_name).await?;
    let in_flight = state
        .active_loads
        .read()
        .await
        .contains_key(&(source.clone(), file_name.clone()));

    Ok(Json(RunDetailResponse {
        run,
        rejections_by_reason,
        in_flight,
    }))
}

pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", get(get_runs))
        .route("/runs/:source/:file_name", get(get_run_detail))
}
