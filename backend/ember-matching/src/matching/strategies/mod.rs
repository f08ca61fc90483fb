//! Candidate-production strategies sharing one result contract.

pub mod daily_pick;
pub mod live;
pub mod precomputed;
pub mod resolver;

use std::time::Instant;

use crate::config::EngineSettings;
use crate::models::Profile;

#[derive(Debug, Clone)]
pub struct CandidateRequest {
    pub limit: i64,
    pub min_score: f64,
    pub active_within_days: Option<i64>,
    pub only_verified: bool,
}

#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub profile: Profile,
    pub final_score: f64,
    pub compat_score: f64,
    pub activity_score: f64,
    pub desirability_score: f64,
}

#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub candidates: Vec<RankedCandidate>,
    pub total_filtered: usize,
    pub total_scored: usize,
    pub strategy_used: String,
    pub elapsed_ms: u64,
    pub queue_exhausted: bool,
    pub suggestions_remaining: i64,
}

impl StrategyOutcome {
    /// Empty result for a missing or inactive requester: not an error, just
    /// an exhausted queue.
    pub fn empty(strategy_used: impl Into<String>, started: Instant) -> Self {
        Self {
            candidates: vec![],
            total_filtered: 0,
            total_scored: 0,
            strategy_used: strategy_used.into(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            queue_exhausted: true,
            suggestions_remaining: 0,
        }
    }
}

/// The request's minimum wins when set; otherwise the configured floor.
pub fn effective_min_score(request: &CandidateRequest, settings: &EngineSettings) -> f64 {
    if request.min_score > 0.0 {
        request.min_score
    } else {
        settings.scoring.minimum_compatibility_threshold
    }
}

/// Shadow-restrict: trust 100 keeps the score, trust 0 halves it.
pub fn trust_multiplier(trust: f64) -> f64 {
    0.5 + trust.clamp(0.0, 100.0) / 200.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_multiplier_is_monotone_with_documented_endpoints() {
        assert_eq!(trust_multiplier(0.0), 0.5);
        assert_eq!(trust_multiplier(100.0), 1.0);
        assert_eq!(trust_multiplier(50.0), 0.75);

        let mut previous = 0.0;
        for trust in (0..=100).step_by(5) {
            let m = trust_multiplier(trust as f64);
            assert!(m >= previous);
            previous = m;
        }

        // Out-of-range trust is clamped, never amplifying.
        assert_eq!(trust_multiplier(250.0), 1.0);
        assert_eq!(trust_multiplier(-10.0), 0.5);
    }

    #[test]
    fn request_min_score_overrides_configured_floor() {
        let mut settings = EngineSettings::default();
        settings.scoring.minimum_compatibility_threshold = 25.0;
        let mut request = CandidateRequest {
            limit: 20,
            min_score: 0.0,
            active_within_days: None,
            only_verified: false,
        };

        assert_eq!(effective_min_score(&request, &settings), 25.0);
        request.min_score = 40.0;
        assert_eq!(effective_min_score(&request, &settings), 40.0);
    }
}
