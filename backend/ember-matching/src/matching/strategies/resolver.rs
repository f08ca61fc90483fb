//! Per-request strategy resolution.
//!
//! Precedence: request override, then configuration, then Auto on the cached
//! active-profile count. Anything unresolvable degrades to Live with a
//! warning - candidate requests never fail on resolution.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use ember_shared::errors::AppResult;

use crate::store;
use crate::{AppState, DbPool};

const ACTIVE_COUNT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Live,
    PreComputed,
    DailyPick,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Live => "Live",
            Self::PreComputed => "PreComputed",
            Self::DailyPick => "DailyPick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyChoice {
    Live,
    PreComputed,
    DailyPick,
    Auto,
}

pub fn parse(name: &str) -> Option<StrategyChoice> {
    match name.to_ascii_lowercase().as_str() {
        "live" => Some(StrategyChoice::Live),
        "precomputed" | "pre-computed" => Some(StrategyChoice::PreComputed),
        "daily" | "dailypick" | "daily-pick" => Some(StrategyChoice::DailyPick),
        "auto" => Some(StrategyChoice::Auto),
        _ => None,
    }
}

/// Override beats configuration; an unknown override is ignored silently, an
/// unknown configured strategy is a warning and Live.
pub fn resolve_choice(override_name: Option<&str>, configured: &str) -> StrategyChoice {
    if let Some(choice) = override_name.and_then(parse) {
        return choice;
    }
    match parse(configured) {
        Some(choice) => choice,
        None => {
            tracing::warn!(strategy = configured, "unknown configured strategy, using live");
            StrategyChoice::Live
        }
    }
}

/// Auto picks Live for small populations, PreComputed above the threshold.
pub fn resolve_auto(active_users: i64, live_max_users: i64) -> StrategyKind {
    if active_users > live_max_users {
        StrategyKind::PreComputed
    } else {
        StrategyKind::Live
    }
}

/// Briefly cached count of active profiles, shared across requests.
pub struct ActiveUserCache {
    inner: Mutex<Option<(Instant, i64)>>,
}

impl Default for ActiveUserCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveUserCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn get(&self, pool: &DbPool) -> AppResult<i64> {
        {
            let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if let Some((at, count)) = *guard {
                if at.elapsed() < ACTIVE_COUNT_CACHE_TTL {
                    return Ok(count);
                }
            }
        }

        let count = store::active_profile_count(pool)?;
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some((Instant::now(), count));
        Ok(count)
    }
}

pub fn resolve(state: &AppState, override_name: Option<&str>) -> StrategyKind {
    let settings = state.settings();
    match resolve_choice(override_name, &settings.strategy) {
        StrategyChoice::Live => StrategyKind::Live,
        StrategyChoice::PreComputed => StrategyKind::PreComputed,
        StrategyChoice::DailyPick => StrategyKind::DailyPick,
        StrategyChoice::Auto => match state.active_users.get(&state.db) {
            Ok(active) => resolve_auto(active, settings.auto_strategy_thresholds.live_max_users),
            Err(e) => {
                tracing::warn!(error = %e, "active-user count unavailable, using live");
                StrategyKind::Live
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_names_case_insensitively() {
        assert_eq!(parse("Live"), Some(StrategyChoice::Live));
        assert_eq!(parse("PRECOMPUTED"), Some(StrategyChoice::PreComputed));
        assert_eq!(parse("daily"), Some(StrategyChoice::DailyPick));
        assert_eq!(parse("auto"), Some(StrategyChoice::Auto));
        assert_eq!(parse("ml-magic"), None);
    }

    #[test]
    fn override_beats_configuration() {
        assert_eq!(
            resolve_choice(Some("live"), "precomputed"),
            StrategyChoice::Live
        );
    }

    #[test]
    fn unknown_override_falls_through_to_configuration() {
        assert_eq!(
            resolve_choice(Some("bogus"), "precomputed"),
            StrategyChoice::PreComputed
        );
    }

    #[test]
    fn unknown_configuration_degrades_to_live() {
        assert_eq!(resolve_choice(None, "bogus"), StrategyChoice::Live);
    }

    #[test]
    fn auto_threshold_selects_by_population() {
        assert_eq!(resolve_auto(10_000, 10_000), StrategyKind::Live);
        assert_eq!(resolve_auto(10_001, 10_000), StrategyKind::PreComputed);
        assert_eq!(resolve_auto(12, 10_000), StrategyKind::Live);
    }
}
