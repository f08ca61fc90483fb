use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;

use ember_shared::errors::AppResult;
use ember_shared::types::event::{payloads, routing_keys, Event};

use crate::matching::desirability;
use crate::models::NewUserInteraction;
use crate::store;
use crate::AppState;

/// Listen for swipe.recorded events: record the interaction, invalidate the
/// pair's cached scores, retire any served daily pick, and nudge the target's
/// desirability in real time.
pub async fn listen_swipe_recorded(state: Arc<AppState>) -> anyhow::Result<()> {
    let consumer = state
        .rabbitmq
        .subscribe("swipe-recorded", &[routing_keys::SWIPES_SWIPE_RECORDED])
        .await?;

    tracing::info!("listening for swipe.recorded events");

    let mut consumer = consumer;
    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match serde_json::from_slice::<Event<payloads::SwipeRecorded>>(&delivery.data) {
                    Ok(event) => {
                        let data = &event.data;
                        if let Err(e) = handle_swipe(&state, data) {
                            tracing::error!(
                                error = %e,
                                user_id = data.user_id,
                                target_user_id = data.target_user_id,
                                "failed to process swipe.recorded event"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to deserialize swipe.recorded event");
                    }
                }
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "consumer error");
            }
        }
    }

    Ok(())
}

fn handle_swipe(state: &Arc<AppState>, data: &payloads::SwipeRecorded) -> AppResult<()> {
    store::insert_interaction(
        &state.db,
        NewUserInteraction {
            user_id: data.user_id,
            target_user_id: data.target_user_id,
            interaction_type: data.interaction_type.clone(),
        },
    )?;

    let invalidated = store::invalidate_pair_scores(&state.db, data.user_id, data.target_user_id)?;
    if invalidated > 0 {
        tracing::debug!(
            user_id = data.user_id,
            target_user_id = data.target_user_id,
            invalidated,
            "precomputed scores invalidated after swipe"
        );
    }

    // A like/pass on a served daily pick retires it.
    store::mark_pick_acted(&state.db, data.user_id, data.target_user_id)?;

    // Real-time Elo adjustment to the swiped user's desirability.
    let swiper = store::profile_by_user_id(&state.db, data.user_id)?;
    let target = store::profile_by_user_id(&state.db, data.target_user_id)?;
    if let (Some(swiper), Some(target)) = (swiper, target) {
        let is_like = data.interaction_type.eq_ignore_ascii_case("LIKE");
        let delta = desirability::calculate_elo(
            swiper.desirability_score,
            target.desirability_score,
            is_like,
        );
        let adjusted = desirability::apply_elo(target.desirability_score, delta);
        store::update_desirability(&state.db, target.user_id, adjusted)?;
        tracing::debug!(
            target_user_id = target.user_id,
            delta,
            adjusted,
            "desirability adjusted after swipe"
        );
    }

    Ok(())
}
