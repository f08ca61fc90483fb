//! Weighted multi-factor compatibility scoring.
//!
//! Sub-scores all live in [0, 100] and combine with the requester's per-user
//! weights plus a fixed activity term. Results are cached in
//! `precomputed_scores` with a configurable TTL.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use ember_shared::errors::AppResult;

use crate::config::ScoringSettings;
use crate::models::{NewPrecomputedScore, Profile};
use crate::store;
use crate::DbPool;

/// Weight of the activity term in the combined score.
const ACTIVITY_WEIGHT: f64 = 0.5;

/// Neutral activity when a profile has never recorded activity.
const ACTIVITY_FALLBACK: f64 = 75.0;

const HAS_CHILDREN_PENALTY: f64 = 15.0;
const MISSING_EDUCATION_SCORE: f64 = 70.0;
const EMPTY_INTERESTS_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub overall: f64,
    pub location: f64,
    pub age: f64,
    pub interests: f64,
    pub education: f64,
    pub lifestyle: f64,
    pub activity: f64,
}

/// Haversine distance in km between two lat/lng points.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const R: f64 = 6371.0; // Earth radius in km
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    R * c
}

/// Linear falloff inside the requester's radius, zero beyond it. Without a
/// radius preference the signal is neutral.
pub fn location_score(requester: &Profile, target: &Profile) -> f64 {
    if requester.max_distance_km <= 0.0 {
        return 50.0;
    }
    let d = haversine_km(
        requester.latitude,
        requester.longitude,
        target.latitude,
        target.longitude,
    );
    if d > requester.max_distance_km {
        return 0.0;
    }
    100.0 * (1.0 - d / requester.max_distance_km)
}

/// Zero outside the requester's range, else distance from the midpoint costs
/// up to half the score.
pub fn age_score(requester: &Profile, target: &Profile) -> f64 {
    let (min, max) = (requester.min_age as f64, requester.max_age as f64);
    let age = target.age as f64;
    if age < min || age > max {
        return 0.0;
    }
    let half_range = (max - min) / 2.0;
    if half_range <= 0.0 {
        return 100.0;
    }
    let midpoint = (min + max) / 2.0;
    100.0 - ((age - midpoint).abs() / half_range) * 50.0
}

/// Case-insensitive Jaccard similarity; neutral when either side has no
/// stated interests.
pub fn interests_score(requester: &Profile, target: &Profile) -> f64 {
    let a: HashSet<String> = requester
        .interest_list()
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    let b: HashSet<String> = target
        .interest_list()
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    if a.is_empty() || b.is_empty() {
        return EMPTY_INTERESTS_SCORE;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    intersection / union * 100.0
}

fn education_rank(level: &str) -> i32 {
    match level {
        "HighSchool" => 1,
        "SomeCollege" => 2,
        "Bachelor" => 3,
        "Master" => 4,
        "PhD" => 5,
        _ => 2, // Other
    }
}

pub fn education_score(requester: &Profile, target: &Profile) -> f64 {
    match (&requester.education_level, &target.education_level) {
        (Some(a), Some(b)) => {
            let delta = (education_rank(a) - education_rank(b)).abs() as f64;
            (100.0 - 15.0 * delta).max(50.0)
        }
        _ => MISSING_EDUCATION_SCORE,
    }
}

fn habit_rank(status: &str) -> i32 {
    match status {
        "Never" => 0,
        "Sometimes" => 1,
        "Often" => 2,
        _ => 1,
    }
}

pub fn lifestyle_score(requester: &Profile, target: &Profile, cfg: &ScoringSettings) -> f64 {
    let mut score = 100.0;

    if requester.wants_children != target.wants_children {
        score -= cfg.wants_children_mismatch_penalty;
    }
    if requester.has_children != target.has_children
        && (requester.has_children || target.has_children)
    {
        score -= HAS_CHILDREN_PENALTY;
    }

    let smoking_delta =
        (habit_rank(&requester.smoking_status) - habit_rank(&target.smoking_status)).abs() as f64;
    score -= cfg.smoking_mismatch_penalty * smoking_delta / 2.0;

    let drinking_delta =
        (habit_rank(&requester.drinking_status) - habit_rank(&target.drinking_status)).abs() as f64;
    score -= cfg.drinking_mismatch_penalty * drinking_delta / 2.0;

    if let (Some(a), Some(b)) = (&requester.religion, &target.religion) {
        if a != b {
            score -= cfg.religion_mismatch_penalty;
        }
    }

    score.max(0.0)
}

/// Exponential half-life decay of the target's recency signal. A profile with
/// no recorded activity gets the neutral fallback.
pub fn activity_score(
    last_active_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> f64 {
    let Some(last_active) = last_active_at else {
        return ACTIVITY_FALLBACK;
    };
    if half_life_days <= 0.0 {
        return ACTIVITY_FALLBACK;
    }
    let elapsed_days = ((now - last_active).num_seconds().max(0) as f64) / 86_400.0;
    let score = 100.0 * (-std::f64::consts::LN_2 * elapsed_days / half_life_days).exp();
    score.clamp(0.0, 100.0)
}

/// Combine sub-scores with the requester's weights. A requester whose weights
/// sum to zero falls back to the configured defaults.
pub fn score_pair(
    requester: &Profile,
    target: &Profile,
    cfg: &ScoringSettings,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let location = location_score(requester, target);
    let age = age_score(requester, target);
    let interests = interests_score(requester, target);
    let education = education_score(requester, target);
    let lifestyle = lifestyle_score(requester, target, cfg);
    let activity = activity_score(target.last_active_at, now, cfg.activity_score_half_life_days);

    let user_sum = requester.location_weight
        + requester.age_weight
        + requester.interests_weight
        + requester.education_weight
        + requester.lifestyle_weight;

    let (w_location, w_age, w_interests, w_education, w_lifestyle) = if user_sum > 0.0 {
        (
            requester.location_weight,
            requester.age_weight,
            requester.interests_weight,
            requester.education_weight,
            requester.lifestyle_weight,
        )
    } else {
        let d = cfg.default_weights;
        (d.location, d.age, d.interests, d.education, d.lifestyle)
    };

    let weight_sum = w_location + w_age + w_interests + w_education + w_lifestyle + ACTIVITY_WEIGHT;
    let weighted = w_location * location
        + w_age * age
        + w_interests * interests
        + w_education * education
        + w_lifestyle * lifestyle
        + ACTIVITY_WEIGHT * activity;

    let overall = (weighted / weight_sum).clamp(0.0, 100.0);

    ScoreBreakdown {
        overall,
        location,
        age,
        interests,
        education,
        lifestyle,
        activity,
    }
}

/// One decimal, for presentation.
pub fn round1(score: f64) -> f64 {
    (score * 10.0).round() / 10.0
}

/// Read-through cached scoring: a fresh valid row answers immediately with
/// its stored overall score; otherwise the pair is scored and written back.
pub fn score_with_cache(
    pool: &DbPool,
    requester: &Profile,
    target: &Profile,
    cfg: &ScoringSettings,
) -> AppResult<ScoreBreakdown> {
    if let Some(row) =
        store::fresh_pair_score(pool, requester.user_id, target.user_id, cfg.score_cache_hours)?
    {
        return Ok(ScoreBreakdown {
            overall: row.overall_score,
            location: row.location_score,
            age: row.age_score,
            interests: row.interests_score,
            education: row.education_score,
            lifestyle: row.lifestyle_score,
            activity: row.activity_score,
        });
    }

    let now = Utc::now();
    let breakdown = score_pair(requester, target, cfg, now);
    store::upsert_score(
        pool,
        NewPrecomputedScore {
            user_id: requester.user_id,
            target_user_id: target.user_id,
            overall_score: breakdown.overall,
            location_score: breakdown.location,
            age_score: breakdown.age,
            interests_score: breakdown.interests,
            education_score: breakdown.education,
            lifestyle_score: breakdown.lifestyle,
            activity_score: breakdown.activity,
            calculated_at: now,
            is_valid: true,
        },
    )?;
    Ok(breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::test_support::profile;
    use chrono::Duration;

    fn cfg() -> ScoringSettings {
        ScoringSettings::default()
    }

    #[test]
    fn haversine_stockholm_short_hop() {
        let d = haversine_km(59.33, 18.07, 59.35, 18.10);
        assert!(d > 1.0 && d < 4.0, "got {d}");
        let far = haversine_km(59.33, 18.07, 55.60, 13.00);
        assert!(far > 400.0 && far < 600.0, "got {far}");
    }

    #[test]
    fn location_score_zero_beyond_radius_and_linear_inside() {
        let requester = profile(1);
        let mut near = profile(2);
        near.latitude = 59.35;
        near.longitude = 18.10;
        let mut far = profile(3);
        far.latitude = 55.60;
        far.longitude = 13.00;

        let near_score = location_score(&requester, &near);
        assert!(near_score > 90.0 && near_score <= 100.0);
        assert_eq!(location_score(&requester, &far), 0.0);
    }

    #[test]
    fn age_score_peaks_at_midpoint_and_zeroes_outside() {
        let mut requester = profile(1);
        requester.min_age = 20;
        requester.max_age = 40;

        let mut target = profile(2);
        target.age = 30; // midpoint
        assert_eq!(age_score(&requester, &target), 100.0);

        target.age = 40; // edge of range
        assert_eq!(age_score(&requester, &target), 50.0);

        target.age = 41;
        assert_eq!(age_score(&requester, &target), 0.0);
    }

    #[test]
    fn interests_jaccard_is_case_insensitive() {
        let mut a = profile(1);
        a.interests = serde_json::json!(["Hiking", "Jazz", "Cooking"]);
        let mut b = profile(2);
        b.interests = serde_json::json!(["hiking", "jazz", "running"]);

        // |A∩B| = 2, |A∪B| = 4
        assert!((interests_score(&a, &b) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_interests_are_neutral() {
        let a = profile(1);
        let mut b = profile(2);
        b.interests = serde_json::json!(["hiking"]);
        assert_eq!(interests_score(&a, &b), 50.0);
    }

    #[test]
    fn education_score_uses_ordinal_distance() {
        let mut a = profile(1);
        let mut b = profile(2);
        a.education_level = Some("Bachelor".into());
        b.education_level = Some("PhD".into());
        assert_eq!(education_score(&a, &b), 70.0); // delta 2

        b.education_level = Some("HighSchool".into());
        assert_eq!(education_score(&a, &b), 70.0);

        a.education_level = Some("PhD".into());
        assert_eq!(education_score(&a, &b), 50.0); // delta 4, floored

        a.education_level = None;
        assert_eq!(education_score(&a, &b), 70.0);
    }

    #[test]
    fn lifestyle_penalties_stack_and_floor_at_zero() {
        let mut a = profile(1);
        let mut b = profile(2);
        assert_eq!(lifestyle_score(&a, &b, &cfg()), 100.0);

        a.wants_children = true; // -30
        b.has_children = true; // -15
        a.smoking_status = "Never".into();
        b.smoking_status = "Often".into(); // -20
        a.drinking_status = "Never".into();
        b.drinking_status = "Often".into(); // -15
        a.religion = Some("A".into());
        b.religion = Some("B".into()); // -10
        assert_eq!(lifestyle_score(&a, &b, &cfg()), 10.0);

        // Piling on a custom penalty cannot go negative.
        let mut harsh = cfg();
        harsh.wants_children_mismatch_penalty = 90.0;
        assert_eq!(lifestyle_score(&a, &b, &harsh), 0.0);
    }

    #[test]
    fn religion_only_penalized_when_both_present() {
        let mut a = profile(1);
        let mut b = profile(2);
        a.religion = Some("A".into());
        b.religion = None;
        assert_eq!(lifestyle_score(&a, &b, &cfg()), 100.0);
    }

    #[test]
    fn activity_decay_half_life() {
        let now = Utc::now();
        assert!((activity_score(Some(now), now, 7.0) - 100.0).abs() < 1e-6);

        let half_life_ago = now - Duration::days(7);
        let mid = activity_score(Some(half_life_ago), now, 7.0);
        assert!((mid - 50.0).abs() < 1.0, "got {mid}");

        let month_ago = now - Duration::days(30);
        assert!(activity_score(Some(month_ago), now, 7.0) < 10.0);

        // Never active falls back to the neutral constant.
        assert_eq!(activity_score(None, now, 7.0), 75.0);
    }

    #[test]
    fn activity_never_negative_even_for_future_timestamps() {
        let now = Utc::now();
        let future = now + Duration::days(3);
        assert_eq!(activity_score(Some(future), now, 7.0), 100.0);
    }

    #[test]
    fn overall_and_sub_scores_stay_in_range() {
        let now = Utc::now();
        let mut a = profile(1);
        a.interests = serde_json::json!(["a", "b"]);
        let mut b = profile(2);
        b.interests = serde_json::json!(["c"]);
        b.age = 54;
        b.latitude = 59.70;

        let s = score_pair(&a, &b, &cfg(), now);
        for value in [s.overall, s.location, s.age, s.interests, s.education, s.lifestyle, s.activity] {
            assert!((0.0..=100.0).contains(&value), "out of range: {value}");
        }
    }

    #[test]
    fn identical_nearby_profiles_score_high() {
        let now = Utc::now();
        let mut a = profile(1);
        a.interests = serde_json::json!(["hiking", "jazz"]);
        let mut b = profile(2);
        b.interests = serde_json::json!(["hiking", "jazz"]);
        b.last_active_at = Some(now);

        let s = score_pair(&a, &b, &cfg(), now);
        assert!(s.overall > 85.0, "got {}", s.overall);
    }

    #[test]
    fn zero_weights_fall_back_to_defaults() {
        let now = Utc::now();
        let mut a = profile(1);
        a.location_weight = 0.0;
        a.age_weight = 0.0;
        a.interests_weight = 0.0;
        a.education_weight = 0.0;
        a.lifestyle_weight = 0.0;
        let b = profile(2);

        let s = score_pair(&a, &b, &cfg(), now);
        assert!(s.overall > 0.0);
    }

    #[test]
    fn presentation_rounding_is_one_decimal() {
        assert_eq!(round1(87.4567), 87.5);
        assert_eq!(round1(0.04), 0.0);
    }
}
