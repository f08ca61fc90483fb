use ember_shared::clients::rabbitmq::RabbitMQClient;
use ember_shared::types::event::{payloads, routing_keys, Event};

use crate::models::Match;

pub async fn publish_match_created(rabbitmq: &RabbitMQClient, created: &Match) {
    let event = Event::new(
        "ember-matching",
        routing_keys::MATCHING_MATCH_CREATED,
        payloads::MatchCreated {
            match_id: created.id,
            user1_id: created.user1_id,
            user2_id: created.user2_id,
            compatibility_score: created.compatibility_score,
            source: created.match_source.clone(),
        },
    )
    .with_user(created.user1_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MATCHING_MATCH_CREATED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish match.created event");
    }
}

pub async fn publish_match_deleted(rabbitmq: &RabbitMQClient, user_id: i64, removed: i64) {
    let event = Event::new(
        "ember-matching",
        routing_keys::MATCHING_MATCH_DELETED,
        payloads::MatchDeleted { user_id, removed },
    )
    .with_user(user_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MATCHING_MATCH_DELETED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish match.deleted event");
    }
}

pub async fn publish_picks_generated(
    rabbitmq: &RabbitMQClient,
    users_processed: u64,
    picks_inserted: u64,
) {
    let event = Event::new(
        "ember-matching",
        routing_keys::MATCHING_PICKS_GENERATED,
        payloads::DailyPicksGenerated {
            users_processed,
            picks_inserted,
        },
    );

    if let Err(e) = rabbitmq
        .publish(routing_keys::MATCHING_PICKS_GENERATED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish picks.generated event");
    }
}
