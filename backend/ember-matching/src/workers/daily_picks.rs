//! Daily-pick generator.
//!
//! Wakes once per day at the configured UTC time, purges expired picks, then
//! materializes a ranked top-N for every active user with batching scaled to
//! the population. After a run it sleeps at least an hour so a restart near
//! the scheduled minute cannot generate twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use ember_shared::errors::AppResult;

use crate::config::DailyPickSettings;
use crate::events::publisher;
use crate::matching::strategies::{live, CandidateRequest};
use crate::models::NewDailyPick;
use crate::store;
use crate::AppState;

const STARTUP_DELAY: Duration = Duration::from_secs(15);
const POST_RUN_GUARD: Duration = Duration::from_secs(3600);
const DISABLED_RECHECK: Duration = Duration::from_secs(300);

const PICK_MIN_SCORE: f64 = 10.0;

pub fn spawn(state: Arc<AppState>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

async fn run(state: Arc<AppState>, shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::info!("daily-pick generator stopping gracefully");
            return;
        }
        _ = sleep(STARTUP_DELAY) => {}
    }

    loop {
        let cfg = state.settings().daily_picks;
        if !cfg.enabled {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("daily-pick generator stopping gracefully");
                    return;
                }
                _ = sleep(DISABLED_RECHECK) => {}
            }
            continue;
        }

        let now = Utc::now();
        let next_run = next_run_at(now, &cfg.generation_time_utc);
        let wait = (next_run - now).to_std().unwrap_or(Duration::ZERO);
        tracing::info!(next_run = %next_run, "daily-pick generation scheduled");

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("daily-pick generator stopping gracefully");
                return;
            }
            _ = sleep(wait) => {}
        }

        match generate(&state, &shutdown, &cfg).await {
            Ok((users_processed, picks_inserted)) => {
                ember_shared::middleware::record_daily_pick_run(users_processed, picks_inserted);
                tracing::info!(users_processed, picks_inserted, "daily picks generated");
                publisher::publish_picks_generated(&state.rabbitmq, users_processed, picks_inserted)
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "daily-pick generation failed");
            }
        }

        // Anti-double-run guard.
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("daily-pick generator stopping gracefully");
                return;
            }
            _ = sleep(POST_RUN_GUARD) => {}
        }
    }
}

/// Next occurrence of `HH:MM` UTC strictly after `now`. Malformed times fall
/// back to 03:00.
pub fn next_run_at(now: DateTime<Utc>, generation_time: &str) -> DateTime<Utc> {
    let time = NaiveTime::parse_from_str(generation_time, "%H:%M")
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(3, 0, 0).expect("static time"));
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Population-adaptive batching: (batch size, delay between batches).
pub fn batch_plan(total_users: usize) -> (usize, Duration) {
    match total_users {
        0..=999 => (total_users.max(1), Duration::ZERO),
        1_000..=9_999 => (100, Duration::from_millis(100)),
        10_000..=99_999 => (200, Duration::from_millis(500)),
        _ => (500, Duration::from_secs(1)),
    }
}

async fn generate(
    state: &Arc<AppState>,
    shutdown: &CancellationToken,
    cfg: &DailyPickSettings,
) -> AppResult<(u64, u64)> {
    let now = Utc::now();
    let purged = store::delete_expired_picks(&state.db, now)?;
    if purged > 0 {
        tracing::debug!(purged, "expired daily picks removed");
    }

    let user_ids = store::active_user_ids(&state.db)?;
    let (batch_size, delay) = batch_plan(user_ids.len());

    let mut users_processed = 0u64;
    let mut picks_inserted = 0u64;

    'outer: for batch in user_ids.chunks(batch_size) {
        for &user_id in batch {
            if shutdown.is_cancelled() {
                tracing::info!("daily-pick generation interrupted by shutdown");
                break 'outer;
            }
            match generate_for_user(state, user_id, cfg).await {
                Ok(inserted) => {
                    users_processed += 1;
                    picks_inserted += inserted;
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "pick generation failed for user, continuing");
                }
            }
        }

        if delay > Duration::ZERO {
            tokio::select! {
                _ = shutdown.cancelled() => break 'outer,
                _ = sleep(delay) => {}
            }
        }
    }

    Ok((users_processed, picks_inserted))
}

async fn generate_for_user(
    state: &Arc<AppState>,
    user_id: i64,
    cfg: &DailyPickSettings,
) -> AppResult<u64> {
    let request = CandidateRequest {
        limit: (cfg.picks_per_user * 2) as i64,
        min_score: PICK_MIN_SCORE,
        active_within_days: None,
        only_verified: false,
    };
    let outcome = live::get_candidates(state, user_id, &request).await?;

    let now = Utc::now();
    let expires_at = now + chrono::Duration::hours(cfg.expiry_hours);
    let picks: Vec<NewDailyPick> = outcome
        .candidates
        .iter()
        .take(cfg.picks_per_user)
        .enumerate()
        .map(|(index, candidate)| NewDailyPick {
            user_id,
            candidate_user_id: candidate.profile.user_id,
            score: candidate.final_score,
            rank: (index + 1) as i32,
            generated_at: now,
            expires_at,
            seen: false,
            acted: false,
        })
        .collect();

    store::insert_picks(&state.db, &picks)?;
    Ok(picks.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_is_today_before_the_hour_and_tomorrow_after() {
        let before = Utc.with_ymd_and_hms(2026, 3, 10, 1, 0, 0).unwrap();
        assert_eq!(
            next_run_at(before, "03:00"),
            Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 0).unwrap()
        );

        let after = Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 1).unwrap();
        assert_eq!(
            next_run_at(after, "03:00"),
            Utc.with_ymd_and_hms(2026, 3, 11, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn malformed_generation_time_falls_back() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 1, 0, 0).unwrap();
        assert_eq!(
            next_run_at(now, "not-a-time"),
            Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn batch_plan_scales_with_population() {
        assert_eq!(batch_plan(500), (500, Duration::ZERO));
        assert_eq!(batch_plan(999), (999, Duration::ZERO));
        assert_eq!(batch_plan(1_000), (100, Duration::from_millis(100)));
        assert_eq!(batch_plan(9_999), (100, Duration::from_millis(100)));
        assert_eq!(batch_plan(10_000), (200, Duration::from_millis(500)));
        assert_eq!(batch_plan(99_999), (200, Duration::from_millis(500)));
        assert_eq!(batch_plan(100_000), (500, Duration::from_secs(1)));
    }

    #[test]
    fn batch_plan_handles_an_empty_population() {
        let (size, delay) = batch_plan(0);
        assert_eq!(size, 1); // chunks() requires a non-zero size
        assert_eq!(delay, Duration::ZERO);
    }
}
