//! Daily-pick strategy: serve the curated queue in rank order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use ember_shared::errors::AppResult;

use crate::matching::compatibility;
use crate::models::Profile;
use crate::store;
use crate::AppState;

use super::{live, CandidateRequest, RankedCandidate, StrategyOutcome};

pub async fn get_candidates(
    state: &Arc<AppState>,
    user_id: i64,
    request: &CandidateRequest,
) -> AppResult<StrategyOutcome> {
    let started = Instant::now();
    let now = Utc::now();

    let picks = store::servable_picks(&state.db, user_id, now, request.limit)?;
    if picks.is_empty() {
        tracing::debug!(user_id, "no servable daily picks, falling back to live");
        return live::get_candidates(state, user_id, request).await;
    }

    // Count the unseen backlog before serving marks anything.
    let total_unseen = store::count_unseen_picks(&state.db, user_id, now)?;

    let pick_ids: Vec<i64> = picks.iter().map(|p| p.id).collect();
    store::mark_picks_seen(&state.db, &pick_ids)?;

    let candidate_ids: Vec<i64> = picks.iter().map(|p| p.candidate_user_id).collect();
    let profiles = store::profiles_by_user_ids(&state.db, &candidate_ids)?;
    let by_id: HashMap<i64, Profile> = profiles.into_iter().map(|p| (p.user_id, p)).collect();

    let settings = state.settings();
    let half_life = settings.scoring.activity_score_half_life_days;

    let mut ranked: Vec<RankedCandidate> = Vec::with_capacity(picks.len());
    for pick in &picks {
        let Some(profile) = by_id.get(&pick.candidate_user_id) else {
            continue;
        };
        ranked.push(RankedCandidate {
            final_score: pick.score,
            compat_score: pick.score,
            activity_score: compatibility::activity_score(profile.last_active_at, now, half_life),
            desirability_score: profile.desirability_score,
            profile: profile.clone(),
        });
    }

    let served = picks.len() as i64;
    let suggestions_remaining = (total_unseen - served).max(0);
    let queue_exhausted = total_unseen <= served;
    let total_scored = ranked.len();

    Ok(StrategyOutcome {
        candidates: ranked,
        total_filtered: picks.len(),
        total_scored,
        strategy_used: "DailyPick".into(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        queue_exhausted,
        suggestions_remaining,
    })
}
