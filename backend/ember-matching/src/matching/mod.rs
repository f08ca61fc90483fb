pub mod compatibility;
pub mod desirability;
pub mod filters;
pub mod limiter;
pub mod strategies;

#[cfg(test)]
pub mod test_support {
    use chrono::Utc;

    use crate::models::Profile;

    /// Baseline active profile for unit tests; fields are overridden per case.
    pub fn profile(user_id: i64) -> Profile {
        let now = Utc::now();
        Profile {
            id: user_id,
            user_id,
            gender: "Female".into(),
            age: 30,
            latitude: 59.33,
            longitude: 18.07,
            city: Some("Stockholm".into()),
            country: Some("SE".into()),
            preferred_gender: "Everyone".into(),
            min_age: 18,
            max_age: 55,
            max_distance_km: 50.0,
            looking_for: None,
            wants_children: false,
            has_children: false,
            smoking_status: "Never".into(),
            drinking_status: "Never".into(),
            religion: None,
            education_level: None,
            interests: serde_json::json!([]),
            location_weight: 1.0,
            age_weight: 1.0,
            interests_weight: 1.0,
            education_weight: 0.5,
            lifestyle_weight: 0.5,
            is_active: true,
            is_verified: false,
            desirability_score: 50.0,
            last_active_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}
