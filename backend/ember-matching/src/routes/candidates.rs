use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use ember_shared::errors::AppResult;
use ember_shared::types::ApiResponse;

use crate::matching::compatibility;
use crate::matching::strategies::resolver::{self, StrategyKind};
use crate::matching::strategies::{daily_pick, live, precomputed, CandidateRequest, StrategyOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateParams {
    limit: Option<i64>,
    min_score: Option<f64>,
    active_within: Option<i64>,
    only_verified: Option<bool>,
    strategy: Option<String>,
    premium: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub user_id: i64,
    pub age: i32,
    pub gender: String,
    pub city: Option<String>,
    pub compatibility: f64,
    pub compatibility_score: f64,
    pub activity_score: f64,
    pub desirability_score: f64,
    pub strategy_used: String,
    pub is_verified: bool,
    pub interests: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResponse {
    pub candidates: Vec<CandidateRecord>,
    pub total_filtered: usize,
    pub total_scored: usize,
    pub strategy_used: String,
    pub elapsed_ms: u64,
    pub queue_exhausted: bool,
    pub suggestions_remaining: i64,
}

impl CandidateResponse {
    fn empty(strategy_used: &str, queue_exhausted: bool) -> Self {
        Self {
            candidates: vec![],
            total_filtered: 0,
            total_scored: 0,
            strategy_used: strategy_used.into(),
            elapsed_ms: 0,
            queue_exhausted,
            suggestions_remaining: 0,
        }
    }

    fn from_outcome(outcome: StrategyOutcome) -> Self {
        let strategy_used = outcome.strategy_used.clone();
        let candidates = outcome
            .candidates
            .into_iter()
            .map(|c| CandidateRecord {
                user_id: c.profile.user_id,
                age: c.profile.age,
                gender: c.profile.gender.clone(),
                city: c.profile.city.clone(),
                compatibility: compatibility::round1(c.final_score),
                compatibility_score: compatibility::round1(c.compat_score),
                activity_score: compatibility::round1(c.activity_score),
                desirability_score: compatibility::round1(c.desirability_score),
                strategy_used: strategy_used.clone(),
                is_verified: c.profile.is_verified,
                interests: c.profile.interest_list(),
            })
            .collect();

        Self {
            candidates,
            total_filtered: outcome.total_filtered,
            total_scored: outcome.total_scored,
            strategy_used,
            elapsed_ms: outcome.elapsed_ms,
            queue_exhausted: outcome.queue_exhausted,
            suggestions_remaining: outcome.suggestions_remaining,
        }
    }
}

/// GET /candidates/:user_id
///
/// Query values clamp instead of erroring; a non-integer user id yields an
/// empty list rather than a 4xx.
pub async fn get_candidates(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<CandidateParams>,
) -> AppResult<Json<ApiResponse<CandidateResponse>>> {
    let Ok(user_id) = user_id.trim().parse::<i64>() else {
        return Ok(Json(ApiResponse::ok(CandidateResponse::empty("Live", true))));
    };

    let settings = state.settings();
    let request = CandidateRequest {
        limit: params
            .limit
            .unwrap_or(settings.default_limit)
            .clamp(1, settings.max_limit),
        min_score: params
            .min_score
            .unwrap_or(settings.default_min_score)
            .clamp(0.0, 100.0),
        active_within_days: params.active_within.map(|days| days.clamp(1, 365)),
        only_verified: params.only_verified.unwrap_or(false),
    };

    // Daily view budget: an exhausted user gets an empty, exhausted queue.
    let decision = state.limiter.check_and_increment(
        user_id,
        params.premium.unwrap_or(false),
        &settings.daily_suggestion_limits,
    );
    if !decision.allowed {
        tracing::debug!(user_id, "daily suggestion limit reached");
        return Ok(Json(
            ApiResponse::ok(CandidateResponse::empty("Live", true))
                .with_message("daily suggestion limit reached"),
        ));
    }

    let kind = resolver::resolve(&state, params.strategy.as_deref());
    let outcome = match kind {
        StrategyKind::Live => live::get_candidates(&state, user_id, &request).await,
        StrategyKind::PreComputed => precomputed::get_candidates(&state, user_id, &request).await,
        StrategyKind::DailyPick => daily_pick::get_candidates(&state, user_id, &request).await,
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) if settings.fallback_to_live_on_error => {
            tracing::warn!(user_id, error = %e, strategy = kind.name(), "strategy failed, falling back to live");
            ember_shared::middleware::record_strategy_fallback(kind.name());
            live::get_candidates(&state, user_id, &request).await?
        }
        Err(e) => return Err(e),
    };

    ember_shared::middleware::record_candidate_request(
        &outcome.strategy_used,
        outcome.elapsed_ms as f64 / 1000.0,
        outcome.candidates.len(),
    );
    tracing::debug!(
        user_id,
        strategy = %outcome.strategy_used,
        total_filtered = outcome.total_filtered,
        total_scored = outcome.total_scored,
        filter_trace = ?state.pipeline.trace(),
        "candidates produced"
    );

    Ok(Json(ApiResponse::ok(CandidateResponse::from_outcome(outcome))))
}
