//! GET /rejections

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use fdw_common::db::RejectedRecord;
use serde::{Deserialize, Serialize};

use crate::db::rejections::DEFAULT_REJECTION_LIMIT;
use crate::db::{list_rejections, RejectionFilter};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_LIMIT: u32 = 10_000;

#[derive(Debug, Deserialize)]
pub struct RejectionQuery {
    pub source: Option<String>,
    pub file_name: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RejectionListResponse {
    pub rejections: Vec<RejectedRecord>,
}

pub async fn get_rejections(
    State(state): State<AppState>,
    Query(query): Query<RejectionQuery>,
) -> ApiResult<Json<RejectionListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_REJECTION_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let filter = RejectionFilter {
        source: query.source.as_deref(),
        file_name: query.file_name.as_deref(),
        limit,
    };
    let rejections = list_rejections(&state.db, &filter).await?;

    Ok(Json(RejectionListResponse { rejections }))
}

pub fn rejection_routes() -> Router<AppState> {
    Router::new().route("/rejections", get(get_rejections))
}
