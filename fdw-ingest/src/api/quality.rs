//! GET /quality

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::pipeline::FLIGHTS_SOURCE;
use crate::quality::{run_quality_checks, QualityReport};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QualityQuery {
    /// Source whose latest run is judged for its rejection rate
    pub source: Option<String>,
}

pub async fn get_quality(
    State(state): State<AppState>,
    Query(query): Query<QualityQuery>,
) -> ApiResult<Json<QualityReport>> {
    let source = query.source.as_deref().unwrap_or(FLIGHTS_SOURCE);
    let report = run_quality_checks(&state.db, source).await?;
    Ok(Json(report))
}

pub fn quality_routes() -> Router<AppState> {
    Router::new().route("/quality", get(get_quality))
}
