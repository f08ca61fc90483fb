//! Pre-computed strategy: serve from the background score table, re-checking
//! dealbreakers, and top up from Live when the cache runs short.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use ember_shared::errors::AppResult;

use crate::matching::filters::FilterContext;
use crate::models::Profile;
use crate::store;
use crate::AppState;

use super::{effective_min_score, live, CandidateRequest, RankedCandidate, StrategyOutcome};

pub async fn get_candidates(
    state: &Arc<AppState>,
    user_id: i64,
    request: &CandidateRequest,
) -> AppResult<StrategyOutcome> {
    let started = Instant::now();
    let settings = state.settings();

    let requester = match store::profile_by_user_id(&state.db, user_id)? {
        Some(profile) if profile.is_active => profile,
        _ => {
            tracing::debug!(user_id, "requester missing or inactive, empty precomputed result");
            return Ok(StrategyOutcome::empty("PreComputed", started));
        }
    };

    let ttl_hours = settings.background_scoring.score_ttl_hours;
    let rows = store::fresh_scores_for_user(&state.db, user_id, request.limit * 3, ttl_hours)?;
    if rows.is_empty() {
        tracing::debug!(user_id, "no fresh precomputed scores, falling back to live");
        return live::get_candidates(state, user_id, request).await;
    }

    // Dealbreakers may have changed since the rows were computed; re-run the
    // pipeline restricted to the cached candidate ids.
    let swiped_ids = state.swipe.swiped_ids(user_id).await;
    let blocked_ids = state.safety.blocked_ids(user_id).await;
    let ctx = FilterContext {
        requester: requester.clone(),
        swiped_ids,
        blocked_ids,
        active_within_days: request.active_within_days.or(settings.active_within_days),
        only_verified: request.only_verified,
    };

    let candidate_ids: Vec<i64> = rows.iter().map(|r| r.target_user_id).collect();
    let surviving = state.pipeline.run_restricted(
        &state.db,
        &ctx,
        &candidate_ids,
        candidate_ids.len() as i64,
    )?;
    let by_id: HashMap<i64, Profile> =
        surviving.into_iter().map(|p| (p.user_id, p)).collect();
    let total_filtered = by_id.len();

    let min_score = effective_min_score(request, &settings);

    // Rows arrive best-overall first; the compat sub-signal is retrieved from
    // the lifestyle column, where the refresher stores it.
    let mut ranked: Vec<RankedCandidate> = Vec::with_capacity(request.limit as usize);
    for row in &rows {
        if ranked.len() as i64 >= request.limit {
            break;
        }
        let Some(profile) = by_id.get(&row.target_user_id) else {
            continue;
        };
        if row.overall_score < min_score {
            continue;
        }
        ranked.push(RankedCandidate {
            profile: profile.clone(),
            final_score: row.overall_score,
            compat_score: row.lifestyle_score,
            activity_score: row.activity_score,
            desirability_score: profile.desirability_score,
        });
    }
    let total_scored = ranked.len();

    // Supplement from Live when the cache could not fill the request.
    if (ranked.len() as i64) < request.limit {
        let remainder = request.limit - ranked.len() as i64;
        let supplement_request = CandidateRequest {
            limit: remainder,
            ..request.clone()
        };
        match live::get_candidates(state, user_id, &supplement_request).await {
            Ok(live_outcome) => {
                let seen: HashSet<i64> = ranked.iter().map(|c| c.profile.user_id).collect();
                for candidate in live_outcome.candidates {
                    if !seen.contains(&candidate.profile.user_id) {
                        ranked.push(candidate);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "live supplementation failed, serving cached rows only");
            }
        }
        ranked.truncate(request.limit as usize);
    }

    Ok(StrategyOutcome {
        candidates: ranked,
        total_filtered,
        total_scored,
        strategy_used: "PreComputed".into(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        queue_exhausted: false,
        suggestions_remaining: 0,
    })
}
