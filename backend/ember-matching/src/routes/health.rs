use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use ember_shared::types::api::{HealthCheck, HealthResponse};

use crate::AppState;

/// GET /health
///
/// The candidate path is dead without Postgres, so a failed database probe is
/// unhealthy; event fan-out is best-effort, so a disconnected broker channel
/// only degrades.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut checks = Vec::with_capacity(2);

    let database = match state.db.get() {
        Ok(mut conn) => match diesel::sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => HealthCheck::passing("database"),
            Err(e) => HealthCheck::failing("database", e.to_string()),
        },
        Err(e) => HealthCheck::failing("database", e.to_string()),
    };
    checks.push(database);

    if state.rabbitmq.channel().status().connected() {
        checks.push(HealthCheck::passing("rabbitmq"));
    } else {
        checks.push(HealthCheck::degraded("rabbitmq", "channel disconnected"));
    }

    Json(HealthResponse::from_checks(
        "ember-matching",
        env!("CARGO_PKG_VERSION"),
        checks,
    ))
}
