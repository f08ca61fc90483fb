//! Background score refresher.
//!
//! Rebuilds the precomputed score table on an interval, staleness-first:
//! users with no valid score row come before everyone else, the rest in
//! oldest-score order. A load-average guard skips cycles on busy hosts and a
//! semaphore bounds per-user scoring concurrency.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use ember_shared::errors::AppResult;

use crate::config::BackgroundScoringSettings;
use crate::matching::{compatibility, desirability};
use crate::matching::filters::FilterContext;
use crate::models::NewPrecomputedScore;
use crate::store;
use crate::AppState;

const STARTUP_DELAY: Duration = Duration::from_secs(10);

/// Hard cap on pipeline output per user, independent of configuration.
const FILTER_CAP: i64 = 150;

const COMPAT_WEIGHT: f64 = 0.7;
const ACTIVITY_WEIGHT: f64 = 0.15;
const DESIRABILITY_WEIGHT: f64 = 0.15;

#[derive(Debug, Default)]
struct CycleStats {
    users_processed: usize,
    scores_written: usize,
    skipped_for_load: bool,
}

pub fn spawn(state: Arc<AppState>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

async fn run(state: Arc<AppState>, shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::info!("score refresher stopping gracefully");
            return;
        }
        _ = sleep(STARTUP_DELAY) => {}
    }

    // Fair iteration: remembers where the previous cycle stopped.
    let mut checkpoint: Option<i64> = None;

    loop {
        let cfg = state.settings().background_scoring;
        if cfg.enabled {
            match run_cycle(&state, &shutdown, &cfg, &mut checkpoint).await {
                Ok(stats) if stats.skipped_for_load => {}
                Ok(stats) => {
                    ember_shared::middleware::record_refresh_cycle(
                        stats.users_processed as u64,
                        stats.scores_written as u64,
                    );
                    tracing::info!(
                        users_processed = stats.users_processed,
                        scores_written = stats.scores_written,
                        "score refresh cycle completed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "score refresh cycle failed");
                }
            }
        }

        let interval = Duration::from_secs(cfg.refresh_interval_minutes.max(1) * 60);
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("score refresher stopping gracefully");
                return;
            }
            _ = sleep(interval) => {}
        }
    }
}

async fn run_cycle(
    state: &Arc<AppState>,
    shutdown: &CancellationToken,
    cfg: &BackgroundScoringSettings,
    checkpoint: &mut Option<i64>,
) -> AppResult<CycleStats> {
    if let Some(load) = cpu_load_percent() {
        if load > cfg.skip_refresh_when_cpu_above {
            tracing::warn!(
                load_percent = load,
                threshold = cfg.skip_refresh_when_cpu_above,
                "cpu load too high, skipping refresh cycle"
            );
            return Ok(CycleStats {
                skipped_for_load: true,
                ..CycleStats::default()
            });
        }
    }

    let user_ids = select_users(state, cfg, *checkpoint)?;
    if user_ids.is_empty() {
        return Ok(CycleStats::default());
    }

    let semaphore = Arc::new(Semaphore::new(cfg.max_concurrent_scoring.max(1)));
    let mut join_set: JoinSet<(i64, AppResult<usize>)> = JoinSet::new();

    for &user_id in &user_ids {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            }
        };

        let state = state.clone();
        join_set.spawn(async move {
            let result = refresh_user(&state, user_id).await;
            drop(permit);
            (user_id, result)
        });
    }

    let mut stats = CycleStats::default();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, Ok(written))) => {
                stats.users_processed += 1;
                stats.scores_written += written;
            }
            Ok((user_id, Err(e))) => {
                stats.users_processed += 1;
                tracing::warn!(user_id, error = %e, "user scoring failed, cycle continues");
            }
            Err(e) => {
                tracing::warn!(error = %e, "scoring task panicked, cycle continues");
            }
        }
    }

    *checkpoint = user_ids.last().copied().or(*checkpoint);

    // Desirability recalculation over the same batch is best-effort.
    if !shutdown.is_cancelled() {
        if let Err(e) = desirability::recalculate_for_users(&state.db, &user_ids) {
            tracing::warn!(error = %e, "desirability recalculation failed, non-fatal");
        }
    }

    Ok(stats)
}

/// Staleness-first selection: never-scored users (resuming past the
/// checkpoint, wrapping around), then valid-scored users oldest first.
fn select_users(
    state: &Arc<AppState>,
    cfg: &BackgroundScoringSettings,
    checkpoint: Option<i64>,
) -> AppResult<Vec<i64>> {
    let budget = cfg.max_users_per_cycle.max(1);
    let mut selected = store::users_never_scored(
        &state.db,
        cfg.only_refresh_active_users,
        checkpoint,
        budget,
    )?;

    if (selected.len() as i64) < budget && checkpoint.is_some() {
        let wrap = store::users_never_scored(
            &state.db,
            cfg.only_refresh_active_users,
            None,
            budget - selected.len() as i64,
        )?;
        for id in wrap {
            if !selected.contains(&id) {
                selected.push(id);
            }
        }
    }

    if (selected.len() as i64) < budget {
        let stale = store::users_by_score_staleness(
            &state.db,
            cfg.only_refresh_active_users,
            budget - selected.len() as i64,
        )?;
        for id in stale {
            if !selected.contains(&id) {
                selected.push(id);
            }
        }
    }

    selected.truncate(budget as usize);
    Ok(selected)
}

async fn refresh_user(state: &Arc<AppState>, user_id: i64) -> AppResult<usize> {
    let settings = state.settings();
    let Some(requester) = store::profile_by_user_id(&state.db, user_id)? else {
        return Ok(0);
    };

    let swiped_ids = state.swipe.swiped_ids(user_id).await;
    let blocked_ids = state.safety.blocked_ids(user_id).await;
    let ctx = FilterContext {
        requester: requester.clone(),
        swiped_ids,
        blocked_ids,
        active_within_days: None,
        only_verified: false,
    };

    let cap = (settings.max_limit * 3).min(FILTER_CAP);
    let candidates = state.pipeline.run(&state.db, &ctx, cap)?;

    let half_life = settings.scoring.activity_score_half_life_days;
    let now = Utc::now();
    let mut rows: Vec<NewPrecomputedScore> = Vec::with_capacity(candidates.len());

    for candidate in &candidates {
        let breakdown = compatibility::score_pair(&requester, candidate, &settings.scoring, now);
        let activity = compatibility::activity_score(candidate.last_active_at, now, half_life);
        let overall = COMPAT_WEIGHT * breakdown.overall
            + ACTIVITY_WEIGHT * activity
            + DESIRABILITY_WEIGHT * candidate.desirability_score;

        rows.push(NewPrecomputedScore {
            user_id,
            target_user_id: candidate.user_id,
            overall_score: overall,
            location_score: breakdown.location,
            age_score: breakdown.age,
            interests_score: breakdown.interests,
            education_score: breakdown.education,
            // The compat composite lands in the lifestyle column; readers
            // retrieve it from there as the primary sub-signal.
            lifestyle_score: breakdown.overall,
            activity_score: activity,
            calculated_at: now,
            is_valid: true,
        });
    }

    store::upsert_scores_batch(&state.db, &rows)?;
    Ok(rows.len())
}

/// One-minute load average over logical cores, as a percentage. Platforms
/// without the signal return None and never skip.
fn cpu_load_percent() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
        let load1: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
        let cpus = std::thread::available_parallelism().ok()?.get() as f64;
        Some(load1 / cpus * 100.0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_weights_sum_to_one() {
        assert!((COMPAT_WEIGHT + ACTIVITY_WEIGHT + DESIRABILITY_WEIGHT - 1.0).abs() < 1e-12);
    }

    #[test]
    fn filter_cap_bounds_configured_limits() {
        // max_limit 50 gives 150, the cap; a tiny max_limit stays below it.
        assert_eq!((50_i64 * 3).min(FILTER_CAP), 150);
        assert_eq!((10_i64 * 3).min(FILTER_CAP), 30);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn load_percent_reads_the_platform_signal() {
        let load = cpu_load_percent();
        assert!(load.is_some());
        assert!(load.unwrap() >= 0.0);
    }
}
