//! Live strategy: filter, score and rank on demand.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use ember_shared::errors::AppResult;

use crate::matching::compatibility;
use crate::matching::filters::FilterContext;
use crate::store;
use crate::AppState;

use super::{
    effective_min_score, trust_multiplier, CandidateRequest, RankedCandidate, StrategyOutcome,
};

const COMPAT_WEIGHT: f64 = 0.7;
const ACTIVITY_WEIGHT: f64 = 0.15;
const DESIRABILITY_WEIGHT: f64 = 0.15;

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
            tracing::debug!(user_id, "requester missing or inactive, empty live result");
            return Ok(StrategyOutcome::empty("Live", started));
        }
    };

    let swiped_ids = state.swipe.swiped_ids(user_id).await;
    let blocked_ids = state.safety.blocked_ids(user_id).await;

    let ctx = FilterContext {
        requester: requester.clone(),
        swiped_ids,
        blocked_ids,
        active_within_days: request.active_within_days.or(settings.active_within_days),
        only_verified: request.only_verified,
    };

    let filter_limit = (request.limit * 3).min(settings.max_limit * 3);
    let filtered = state.pipeline.run(&state.db, &ctx, filter_limit)?;
    let total_filtered = filtered.len();

    let min_score = effective_min_score(request, &settings);
    let half_life = settings.scoring.activity_score_half_life_days;
    let now = Utc::now();

    let mut ranked: Vec<RankedCandidate> = Vec::with_capacity(filtered.len());
    for candidate in filtered {
        let breakdown =
            match compatibility::score_with_cache(&state.db, &requester, &candidate, &settings.scoring) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        candidate_id = candidate.user_id,
                        error = %e,
                        "candidate scoring failed, skipping"
                    );
                    continue;
                }
            };
        if breakdown.overall < min_score {
            continue;
        }

        let activity = compatibility::activity_score(candidate.last_active_at, now, half_life);
        let desirability = candidate.desirability_score;
        let base = COMPAT_WEIGHT * breakdown.overall
            + ACTIVITY_WEIGHT * activity
            + DESIRABILITY_WEIGHT * desirability;

        ranked.push(RankedCandidate {
            final_score: base,
            compat_score: breakdown.overall,
            activity_score: activity,
            desirability_score: desirability,
            profile: candidate,
        });
    }
    let total_scored = ranked.len();

    // Shadow-restrict: trust arrives in one batch; a failed lookup means full
    // trust for everyone.
    let candidate_ids: Vec<i64> = ranked.iter().map(|c| c.profile.user_id).collect();
    let trust_scores = state.swipe.batch_trust_scores(&candidate_ids).await;
    for candidate in &mut ranked {
        let trust = trust_scores
            .get(&candidate.profile.user_id)
            .copied()
            .unwrap_or(100.0);
        candidate.final_score *= trust_multiplier(trust);
    }

    // Stable sort: ties keep store scan order (user id ascending).
    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(request.limit as usize);

    Ok(StrategyOutcome {
        candidates: ranked,
        total_filtered,
        total_scored,
        strategy_used: "Live".into(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        queue_exhausted: false,
        suggestions_remaining: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::test_support::profile;

    /// Scenario: perfect candidate with full trust ranks near the ceiling;
    /// the same candidate with zero trust lands at about half.
    #[test]
    fn shadow_restrict_halves_a_perfect_score() {
        let base = COMPAT_WEIGHT * 100.0 + ACTIVITY_WEIGHT * 100.0 + DESIRABILITY_WEIGHT * 100.0;

        let trusted = base * trust_multiplier(100.0);
        assert!((95.0..=100.0).contains(&trusted), "got {trusted}");

        let restricted = base * trust_multiplier(0.0);
        let ratio = restricted / trusted;
        assert!((0.45..=0.55).contains(&ratio), "got {ratio}");
    }

    #[test]
    fn ranking_is_stable_for_equal_scores() {
        let mut ranked: Vec<RankedCandidate> = [(1, 80.0), (2, 90.0), (3, 80.0)]
            .into_iter()
            .map(|(id, score)| RankedCandidate {
                profile: profile(id),
                final_score: score,
                compat_score: score,
                activity_score: 100.0,
                desirability_score: 50.0,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
        });

        let order: Vec<i64> = ranked.iter().map(|c| c.profile.user_id).collect();
        // 90 first; the two 80s keep their scan order.
        assert_eq!(order, vec![2, 1, 3]);
    }
}
