//! Desirability maintenance: Bayesian-smoothed batch recalculation from
//! periodic metrics, plus an Elo-style real-time adjustment applied as swipe
//! events arrive.

use chrono::{DateTime, Utc};

use ember_shared::errors::AppResult;

use crate::models::AlgorithmMetric;
use crate::store;
use crate::DbPool;

pub const DEFAULT_DESIRABILITY: f64 = 50.0;

/// Below this sample size the Bayesian rate is too noisy to trust.
const MIN_SWIPES: i32 = 20;
const PRIOR_PSEUDOCOUNTS: f64 = 10.0;
const PRIOR_MEAN: f64 = 0.3;
const MEAN_REVERSION_HALF_LIFE_DAYS: f64 = 30.0;
const ELO_K: f64 = 32.0;

/// Writes are skipped when the score moved less than this.
const PERSIST_EPSILON: f64 = 0.1;

/// Smoothed like-rate pulled toward the 50 mean as the metric ages.
pub fn batch_score(metric: &AlgorithmMetric, now: DateTime<Utc>) -> f64 {
    if metric.swipes_received < MIN_SWIPES {
        return DEFAULT_DESIRABILITY;
    }

    let bayesian_rate = (metric.likes_received as f64 + PRIOR_PSEUDOCOUNTS * PRIOR_MEAN)
        / (metric.swipes_received as f64 + PRIOR_PSEUDOCOUNTS);
    let base_score = bayesian_rate * 100.0;

    let elapsed_days = ((now - metric.calculated_at).num_seconds().max(0) as f64) / 86_400.0;
    let decay = 0.5_f64.powf(elapsed_days / MEAN_REVERSION_HALF_LIFE_DAYS);

    (50.0 + (base_score - 50.0) * decay).clamp(0.0, 100.0)
}

/// Elo expectation update for a single swipe. Positive for a like, negative
/// for a pass; magnitude grows when the outcome was unexpected.
pub fn calculate_elo(swiper_desirability: f64, target_desirability: f64, is_like: bool) -> f64 {
    let expected =
        1.0 / (1.0 + 10_f64.powf((swiper_desirability - target_desirability) / 400.0));
    let actual = if is_like { 1.0 } else { 0.0 };
    ELO_K * (actual - expected)
}

pub fn apply_elo(target_desirability: f64, delta: f64) -> f64 {
    (target_desirability + delta).clamp(0.0, 100.0)
}

/// Batch recalculation over one refresher cycle's users. Per-user failures
/// are logged and skipped; returns how many scores were persisted.
pub fn recalculate_for_users(pool: &DbPool, user_ids: &[i64]) -> AppResult<usize> {
    let now = Utc::now();
    let mut persisted = 0;

    for &user_id in user_ids {
        let result = recalculate_one(pool, user_id, now);
        match result {
            Ok(true) => persisted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(user_id, error = %e, "desirability recalculation failed for user");
            }
        }
    }

    Ok(persisted)
}

fn recalculate_one(pool: &DbPool, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
    let Some(profile) = store::profile_by_user_id(pool, user_id)? else {
        return Ok(false);
    };

    let score = match store::latest_metric(pool, user_id)? {
        Some(metric) => batch_score(&metric, now),
        None => DEFAULT_DESIRABILITY,
    };

    if (score - profile.desirability_score).abs() <= PERSIST_EPSILON {
        return Ok(false);
    }
    store::update_desirability(pool, user_id, score)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn metric(likes: i32, swipes: i32, age_days: i64) -> AlgorithmMetric {
        AlgorithmMetric {
            id: 1,
            user_id: 1,
            swipes_received: swipes,
            likes_received: likes,
            matches_created: 0,
            suggestions_generated: 0,
            success_rate: 0.0,
            calculated_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn below_sample_floor_score_is_default() {
        let now = Utc::now();
        assert_eq!(batch_score(&metric(19, 19, 0), now), 50.0);
        assert_eq!(batch_score(&metric(0, 5, 0), now), 50.0);
    }

    #[test]
    fn low_like_rate_lands_between_prior_and_default() {
        let now = Utc::now();
        let score = batch_score(&metric(1, 20, 0), now);
        assert!(score > 5.0 && score < 50.0, "got {score}");
    }

    #[test]
    fn perfect_like_rate_is_smoothed_below_the_maximum() {
        let now = Utc::now();
        let score = batch_score(&metric(20, 20, 0), now);
        assert!(score > 60.0 && score < 85.0, "got {score}");
    }

    #[test]
    fn stale_metrics_revert_toward_the_mean() {
        let now = Utc::now();
        let fresh = batch_score(&metric(20, 20, 0), now);
        let month_old = batch_score(&metric(20, 20, 30), now);
        let ancient = batch_score(&metric(20, 20, 300), now);

        assert!(month_old < fresh);
        assert!((month_old - (50.0 + (fresh - 50.0) * 0.5)).abs() < 0.5);
        assert!((ancient - 50.0).abs() < 1.0);
    }

    #[test]
    fn elo_like_always_raises_the_target() {
        for (a, b) in [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0), (37.5, 62.5)] {
            assert!(calculate_elo(a, b, true) > 0.0, "like must be positive for ({a}, {b})");
        }
    }

    #[test]
    fn elo_equal_peers_move_by_half_k() {
        let delta = calculate_elo(50.0, 50.0, true);
        assert!((delta - 16.0).abs() < 1e-9);

        let pass = calculate_elo(50.0, 50.0, false);
        assert!((pass + 16.0).abs() < 1e-9);
    }

    #[test]
    fn elo_application_clamps_to_bounds() {
        assert_eq!(apply_elo(99.0, 16.0), 100.0);
        assert_eq!(apply_elo(1.0, -16.0), 0.0);
    }
}
