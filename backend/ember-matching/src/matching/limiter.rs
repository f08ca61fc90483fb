//! Per-user daily suggestion budget.
//!
//! State is process-local behind a single mutex: after a restart every user
//! immediately regains a full budget. Multi-replica deployments need a shared
//! key-value backend instead, which sits outside this service.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::SuggestionLimitSettings;

#[derive(Debug, Clone, Copy)]
struct UserQuota {
    shown_today: i64,
    last_reset: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct LimiterDecision {
    pub allowed: bool,
    pub remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStatus {
    pub shown_today: i64,
    pub max: i64,
    pub remaining: i64,
    pub last_reset_date: DateTime<Utc>,
    pub next_reset_date: DateTime<Utc>,
    pub queue_exhausted: bool,
}

pub struct DailySuggestionLimiter {
    inner: Mutex<HashMap<i64, UserQuota>>,
}

impl Default for DailySuggestionLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl DailySuggestionLimiter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_and_increment(
        &self,
        user_id: i64,
        is_premium: bool,
        cfg: &SuggestionLimitSettings,
    ) -> LimiterDecision {
        self.check_and_increment_at(user_id, is_premium, cfg, Utc::now())
    }

    pub fn check_and_increment_at(
        &self,
        user_id: i64,
        is_premium: bool,
        cfg: &SuggestionLimitSettings,
        now: DateTime<Utc>,
    ) -> LimiterDecision {
        let max = max_for(is_premium, cfg);
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let quota = map.entry(user_id).or_insert(UserQuota {
            shown_today: 0,
            last_reset: now,
        });

        if now - quota.last_reset >= Duration::hours(cfg.refresh_interval_hours) {
            quota.shown_today = 0;
            quota.last_reset = now;
        }

        if quota.shown_today < max {
            quota.shown_today += 1;
            LimiterDecision {
                allowed: true,
                remaining: max - quota.shown_today,
            }
        } else {
            LimiterDecision {
                allowed: false,
                remaining: 0,
            }
        }
    }

    pub fn status(
        &self,
        user_id: i64,
        is_premium: bool,
        cfg: &SuggestionLimitSettings,
    ) -> LimiterStatus {
        self.status_at(user_id, is_premium, cfg, Utc::now())
    }

    pub fn status_at(
        &self,
        user_id: i64,
        is_premium: bool,
        cfg: &SuggestionLimitSettings,
        now: DateTime<Utc>,
    ) -> LimiterStatus {
        let max = max_for(is_premium, cfg);
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let quota = map.entry(user_id).or_insert(UserQuota {
            shown_today: 0,
            last_reset: now,
        });

        if now - quota.last_reset >= Duration::hours(cfg.refresh_interval_hours) {
            quota.shown_today = 0;
            quota.last_reset = now;
        }

        let remaining = (max - quota.shown_today).max(0);
        LimiterStatus {
            shown_today: quota.shown_today,
            max,
            remaining,
            last_reset_date: quota.last_reset,
            next_reset_date: quota.last_reset + Duration::hours(cfg.refresh_interval_hours),
            queue_exhausted: remaining == 0,
        }
    }
}

fn max_for(is_premium: bool, cfg: &SuggestionLimitSettings) -> i64 {
    if is_premium {
        cfg.premium_max_daily_suggestions
    } else {
        cfg.max_daily_suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SuggestionLimitSettings {
        SuggestionLimitSettings {
            max_daily_suggestions: 3,
            premium_max_daily_suggestions: 5,
            refresh_interval_hours: 24,
        }
    }

    #[test]
    fn budget_decrements_then_blocks() {
        let limiter = DailySuggestionLimiter::new();
        let now = Utc::now();
        let cfg = cfg();

        for expected_remaining in [2, 1, 0] {
            let d = limiter.check_and_increment_at(1, false, &cfg, now);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }

        let blocked = limiter.check_and_increment_at(1, false, &cfg, now);
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
    }

    #[test]
    fn premium_tier_gets_a_larger_budget() {
        let limiter = DailySuggestionLimiter::new();
        let now = Utc::now();
        let cfg = cfg();

        for _ in 0..5 {
            assert!(limiter.check_and_increment_at(1, true, &cfg, now).allowed);
        }
        assert!(!limiter.check_and_increment_at(1, true, &cfg, now).allowed);
    }

    #[test]
    fn budget_resets_after_the_refresh_interval() {
        let limiter = DailySuggestionLimiter::new();
        let cfg = cfg();
        let day_one = Utc::now();

        for _ in 0..3 {
            limiter.check_and_increment_at(1, false, &cfg, day_one);
        }
        assert!(!limiter.check_and_increment_at(1, false, &cfg, day_one).allowed);

        let day_two = day_one + Duration::hours(24);
        let d = limiter.check_and_increment_at(1, false, &cfg, day_two);
        assert!(d.allowed);
        assert_eq!(d.remaining, 2);
    }

    #[test]
    fn status_reports_without_consuming() {
        let limiter = DailySuggestionLimiter::new();
        let now = Utc::now();
        let cfg = cfg();

        limiter.check_and_increment_at(1, false, &cfg, now);
        let status = limiter.status_at(1, false, &cfg, now);
        assert_eq!(status.shown_today, 1);
        assert_eq!(status.max, 3);
        assert_eq!(status.remaining, 2);
        assert!(!status.queue_exhausted);
        assert_eq!(status.next_reset_date, status.last_reset_date + Duration::hours(24));

        // Status itself does not burn budget.
        let again = limiter.status_at(1, false, &cfg, now);
        assert_eq!(again.shown_today, 1);
    }

    #[test]
    fn exhausted_status_flags_the_queue() {
        let limiter = DailySuggestionLimiter::new();
        let now = Utc::now();
        let cfg = cfg();

        for _ in 0..3 {
            limiter.check_and_increment_at(1, false, &cfg, now);
        }
        let status = limiter.status_at(1, false, &cfg, now);
        assert!(status.queue_exhausted);
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn users_are_tracked_independently() {
        let limiter = DailySuggestionLimiter::new();
        let now = Utc::now();
        let cfg = cfg();

        for _ in 0..3 {
            limiter.check_and_increment_at(1, false, &cfg, now);
        }
        assert!(limiter.check_and_increment_at(2, false, &cfg, now).allowed);
    }
}
