//! Prometheus metrics for the matching engine.
//!
//! Besides generic HTTP series, the engine records per-strategy candidate
//! serving, strategy fallbacks, refresher cycles and daily-pick runs so the
//! background pipelines are observable without log scraping.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use std::time::Instant;

/// Probe and scrape endpoints would dominate the HTTP series; skip them.
const QUIET_PATHS: [&str; 2] = ["/health", "/metrics"];

pub async fn metrics_middleware(
    matched_path: Option<MatchedPath>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    if QUIET_PATHS.contains(&path.as_str()) {
        return response;
    }

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method),
        ("path", path),
        ("status", status),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration);

    response
}

/// One served candidate request, labelled by the strategy that produced it.
pub fn record_candidate_request(strategy: &str, elapsed_secs: f64, served: usize) {
    let labels = [("strategy", strategy.to_string())];
    counter!("matching_candidate_requests_total", &labels).increment(1);
    counter!("matching_candidates_served_total", &labels).increment(served as u64);
    histogram!("matching_candidate_duration_seconds", &labels).record(elapsed_secs);
}

/// A strategy failed and the request degraded to Live.
pub fn record_strategy_fallback(requested: &str) {
    let labels = [("requested", requested.to_string())];
    counter!("matching_strategy_fallbacks_total", &labels).increment(1);
}

/// A completed background score-refresh cycle.
pub fn record_refresh_cycle(users_processed: u64, scores_written: u64) {
    counter!("matching_refresh_users_total").increment(users_processed);
    counter!("matching_refresh_scores_written_total").increment(scores_written);
}

/// A completed daily-pick generation run.
pub fn record_daily_pick_run(users_processed: u64, picks_inserted: u64) {
    counter!("matching_daily_pick_users_total").increment(users_processed);
    counter!("matching_daily_picks_inserted_total").increment(picks_inserted);
}

pub fn init_metrics() -> metrics_exporter_prometheus::PrometheusHandle {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}
