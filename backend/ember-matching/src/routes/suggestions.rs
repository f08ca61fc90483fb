use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use ember_shared::errors::AppResult;
use ember_shared::types::ApiResponse;

use crate::matching::limiter::LimiterStatus;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    premium: Option<bool>,
}

/// GET /suggestions/:user_id/status
pub async fn get_suggestion_status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(params): Query<StatusParams>,
) -> AppResult<Json<ApiResponse<LimiterStatus>>> {
    let settings = state.settings();
    let status = state.limiter.status(
        user_id,
        params.premium.unwrap_or(false),
        &settings.daily_suggestion_limits,
    );
    Ok(Json(ApiResponse::ok(status)))
}
