use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `ember.{domain}.{entity}.{action}`
/// Example: `ember.matching.match.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<i64>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Matching events
    pub const MATCHING_MATCH_CREATED: &str = "ember.matching.match.created";
    pub const MATCHING_MATCH_DELETED: &str = "ember.matching.match.deleted";
    pub const MATCHING_PICKS_GENERATED: &str = "ember.matching.picks.generated";

    // Swipe events (consumed from the swipe service)
    pub const SWIPES_SWIPE_RECORDED: &str = "ember.swipes.swipe.recorded";
}

/// Common event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub match_id: i64,
        pub user1_id: i64,
        pub user2_id: i64,
        pub compatibility_score: f64,
        pub source: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchDeleted {
        pub user_id: i64,
        pub removed: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DailyPicksGenerated {
        pub users_processed: u64,
        pub picks_inserted: u64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SwipeRecorded {
        pub user_id: i64,
        pub target_user_id: i64,
        pub interaction_type: String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_carries_user() {
        let event = Event::new(
            "ember-matching",
            routing_keys::MATCHING_MATCH_CREATED,
            payloads::MatchCreated {
                match_id: 1,
                user1_id: 10,
                user2_id: 20,
                compatibility_score: 87.5,
                source: "mutual_like".into(),
            },
        )
        .with_user(10);

        assert_eq!(event.user_id, Some(10));
        assert_eq!(event.event_type, "ember.matching.match.created");
    }
}
