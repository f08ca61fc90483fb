//! Service-to-service endpoints, gated by the shared internal API key.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use ember_shared::errors::{AppError, AppResult, ErrorCode};
use ember_shared::middleware::InternalApiKey;
use ember_shared::types::ApiResponse;

use crate::events::publisher;
use crate::matching::compatibility;
use crate::models::{Match, NewMatch};
use crate::store;
use crate::AppState;

// --- Mutual-match sink ---

#[derive(Debug, Deserialize)]
pub struct MutualMatchPayload {
    pub user1_id: i64,
    pub user2_id: i64,
    pub compatibility_score: Option<f64>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MutualMatchResponse {
    #[serde(rename = "match")]
    pub created_match: Match,
    pub created: bool,
}

/// POST /internal/matches - called by the swipe service on a mutual like.
/// The pair is canonicalized and the upsert is idempotent.
pub async fn record_mutual_match(
    _key: InternalApiKey,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MutualMatchPayload>,
) -> AppResult<Json<ApiResponse<MutualMatchResponse>>> {
    if payload.user1_id == payload.user2_id {
        return Err(AppError::bad_request("cannot match a user with themselves"));
    }

    // Fail-open safety check: a pair with a standing block never matches.
    if state.safety.is_blocked(payload.user1_id, payload.user2_id).await
        || state.safety.is_blocked(payload.user2_id, payload.user1_id).await
    {
        tracing::warn!(
            user1_id = payload.user1_id,
            user2_id = payload.user2_id,
            "mutual match rejected, pair has a standing block"
        );
        return Err(AppError::new(
            ErrorCode::Forbidden,
            "users cannot be matched",
        ));
    }

    let score = match payload.compatibility_score {
        Some(score) => score.clamp(0.0, 100.0),
        None => {
            // The swipe service does not always carry a score; compute one
            // when both profiles are available.
            let settings = state.settings();
            let a = store::profile_by_user_id(&state.db, payload.user1_id)?;
            let b = store::profile_by_user_id(&state.db, payload.user2_id)?;
            match (a, b) {
                (Some(a), Some(b)) => {
                    compatibility::score_pair(&a, &b, &settings.scoring, Utc::now()).overall
                }
                _ => 0.0,
            }
        }
    };

    let source = payload.source.unwrap_or_else(|| "mutual_like".into());
    let new_match = NewMatch::canonical(payload.user1_id, payload.user2_id, score, source);
    let (row, created) = store::upsert_match(&state.db, new_match)?;

    if created {
        // Best-effort fan-out; match creation never depends on it.
        publisher::publish_match_created(&state.rabbitmq, &row).await;
        tracing::info!(
            match_id = row.id,
            user1_id = row.user1_id,
            user2_id = row.user2_id,
            "match created"
        );
    }

    Ok(Json(ApiResponse::ok(MutualMatchResponse {
        created_match: row,
        created,
    })))
}

// --- Activity pings ---

#[derive(Debug, Deserialize)]
pub struct ActivityPingRequest {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ActivityPingResponse {
    pub updated: bool,
}

/// POST /internal/activity - single last-active ping; unknown users are
/// ignored.
pub async fn update_activity(
    _key: InternalApiKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivityPingRequest>,
) -> AppResult<Json<ApiResponse<ActivityPingResponse>>> {
    let updated = store::touch_last_active(&state.db, req.user_id, Utc::now())?;
    Ok(Json(ApiResponse::ok(ActivityPingResponse { updated })))
}

#[derive(Debug, Deserialize)]
pub struct ActivityBatchRequest {
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ActivityBatchResponse {
    pub updated: usize,
    pub total: usize,
}

/// POST /internal/activity/batch
pub async fn update_activity_batch(
    _key: InternalApiKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivityBatchRequest>,
) -> AppResult<Json<ApiResponse<ActivityBatchResponse>>> {
    let total = req.user_ids.len();
    let updated = store::touch_last_active_batch(&state.db, &req.user_ids, Utc::now())?;
    Ok(Json(ApiResponse::ok(ActivityBatchResponse { updated, total })))
}

// --- Deletions ---

#[derive(Debug, Serialize)]
pub struct DeletionResponse {
    pub removed: usize,
}

/// DELETE /internal/matches/:user_id - remove every match either side of
/// which is the target user.
pub async fn delete_user_matches(
    _key: InternalApiKey,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<DeletionResponse>>> {
    let removed = store::delete_matches_for_user(&state.db, user_id)?;
    publisher::publish_match_deleted(&state.rabbitmq, user_id, removed as i64).await;
    tracing::info!(user_id, removed, "matches deleted");
    Ok(Json(ApiResponse::ok(DeletionResponse { removed })))
}

/// DELETE /internal/users/:user_id - account-deletion cascade.
pub async fn delete_user(
    _key: InternalApiKey,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<DeletionResponse>>> {
    let removed = store::cascade_delete_user(&state.db, user_id)?;
    publisher::publish_match_deleted(&state.rabbitmq, user_id, removed as i64).await;
    tracing::info!(user_id, removed_matches = removed, "user cascade-deleted");
    Ok(Json(ApiResponse::ok(DeletionResponse { removed })))
}
