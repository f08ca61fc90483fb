use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{
    algorithm_metrics, daily_picks, matches, precomputed_scores, profiles, user_interactions,
};

// --- Profile ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub gender: String,
    pub age: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
    pub preferred_gender: String,
    pub min_age: i32,
    pub max_age: i32,
    pub max_distance_km: f64,
    pub looking_for: Option<String>,
    pub wants_children: bool,
    pub has_children: bool,
    pub smoking_status: String,
    pub drinking_status: String,
    pub religion: Option<String>,
    pub education_level: Option<String>,
    pub interests: serde_json::Value,
    pub location_weight: f64,
    pub age_weight: f64,
    pub interests_weight: f64,
    pub education_weight: f64,
    pub lifestyle_weight: f64,
    pub is_active: bool,
    pub is_verified: bool,
    pub desirability_score: f64,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Interests are stored as a JSON array of strings; anything else in the
    /// column degrades to an empty list.
    pub fn interest_list(&self) -> Vec<String> {
        self.interests
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// --- Match ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub compatibility_score: f64,
    pub match_source: String,
    pub is_active: bool,
    pub unmatched_at: Option<DateTime<Utc>>,
    pub unmatched_by_user_id: Option<i64>,
    pub unmatch_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = matches)]
pub struct NewMatch {
    pub user1_id: i64,
    pub user2_id: i64,
    pub compatibility_score: f64,
    pub match_source: String,
    pub is_active: bool,
}

impl NewMatch {
    /// Canonicalizes the pair so that `user1_id < user2_id` always holds.
    pub fn canonical(a: i64, b: i64, compatibility_score: f64, source: impl Into<String>) -> Self {
        let (user1_id, user2_id) = if a < b { (a, b) } else { (b, a) };
        Self {
            user1_id,
            user2_id,
            compatibility_score,
            match_source: source.into(),
            is_active: true,
        }
    }
}

// --- PrecomputedScore ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = precomputed_scores)]
pub struct PrecomputedScore {
    pub id: i64,
    pub user_id: i64,
    pub target_user_id: i64,
    pub overall_score: f64,
    pub location_score: f64,
    pub age_score: f64,
    pub interests_score: f64,
    pub education_score: f64,
    pub lifestyle_score: f64,
    pub activity_score: f64,
    pub calculated_at: DateTime<Utc>,
    pub is_valid: bool,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = precomputed_scores)]
pub struct NewPrecomputedScore {
    pub user_id: i64,
    pub target_user_id: i64,
    pub overall_score: f64,
    pub location_score: f64,
    pub age_score: f64,
    pub interests_score: f64,
    pub education_score: f64,
    pub lifestyle_score: f64,
    pub activity_score: f64,
    pub calculated_at: DateTime<Utc>,
    pub is_valid: bool,
}

// --- DailyPick ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = daily_picks)]
pub struct DailyPick {
    pub id: i64,
    pub user_id: i64,
    pub candidate_user_id: i64,
    pub score: f64,
    pub rank: i32,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub seen: bool,
    pub acted: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = daily_picks)]
pub struct NewDailyPick {
    pub user_id: i64,
    pub candidate_user_id: i64,
    pub score: f64,
    pub rank: i32,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub seen: bool,
    pub acted: bool,
}

// --- UserInteraction ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = user_interactions)]
pub struct UserInteraction {
    pub id: i64,
    pub user_id: i64,
    pub target_user_id: i64,
    pub interaction_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = user_interactions)]
pub struct NewUserInteraction {
    pub user_id: i64,
    pub target_user_id: i64,
    pub interaction_type: String,
}

// --- AlgorithmMetric ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = algorithm_metrics)]
pub struct AlgorithmMetric {
    pub id: i64,
    pub user_id: i64,
    pub swipes_received: i32,
    pub likes_received: i32,
    pub matches_created: i32,
    pub suggestions_generated: i32,
    pub success_rate: f64,
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_match_is_canonical() {
        let m = NewMatch::canonical(42, 7, 80.0, "mutual_like");
        assert_eq!((m.user1_id, m.user2_id), (7, 42));

        let m = NewMatch::canonical(7, 42, 80.0, "mutual_like");
        assert_eq!((m.user1_id, m.user2_id), (7, 42));
    }

    #[test]
    fn interest_list_tolerates_malformed_json() {
        let mut profile = crate::matching::test_support::profile(1);
        profile.interests = serde_json::json!({"not": "an array"});
        assert!(profile.interest_list().is_empty());

        profile.interests = serde_json::json!(["hiking", 3, "jazz"]);
        assert_eq!(profile.interest_list(), vec!["hiking", "jazz"]);
    }
}
