use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use ember_shared::errors::AppResult;
use ember_shared::types::ApiResponse;

use crate::matching::compatibility;
use crate::store;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatsResponse {
    pub total_matches: i64,
    pub active_matches: i64,
    pub average_compatibility_score: Option<f64>,
    pub last_match_at: Option<DateTime<Utc>>,
    pub top_reasons: Vec<String>,
}

/// GET /matches/:user_id/stats
pub async fn get_match_stats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<MatchStatsResponse>>> {
    let stats = store::match_stats(&state.db, user_id)?;

    Ok(Json(ApiResponse::ok(MatchStatsResponse {
        total_matches: stats.total_matches,
        active_matches: stats.active_matches,
        average_compatibility_score: stats
            .average_compatibility_score
            .map(compatibility::round1),
        last_match_at: stats.last_match_at,
        top_reasons: stats.top_reasons,
    })))
}
