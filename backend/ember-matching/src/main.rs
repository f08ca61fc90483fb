use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod clients;
mod config;
mod events;
mod matching;
mod models;
mod routes;
mod schema;
mod store;
mod workers;

use clients::{SafetyServiceClient, SwipeServiceClient};
use config::{AppConfig, EngineSettings};
use ember_shared::clients::db::create_pool;
use ember_shared::clients::rabbitmq::RabbitMQClient;
use matching::filters::FilterPipeline;
use matching::limiter::DailySuggestionLimiter;
use matching::strategies::resolver::ActiveUserCache;

pub use ember_shared::clients::db::DbPool;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub settings: RwLock<EngineSettings>,
    pub rabbitmq: RabbitMQClient,
    pub swipe: SwipeServiceClient,
    pub safety: SafetyServiceClient,
    pub limiter: DailySuggestionLimiter,
    pub pipeline: FilterPipeline,
    pub active_users: ActiveUserCache,
}

impl AppState {
    /// Snapshot of the hot-reloadable engine settings.
    pub fn settings(&self) -> EngineSettings {
        self.settings
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ember_shared::middleware::init_tracing("ember-matching");

    let config = AppConfig::load()?;
    let port = config.port;
    let settings = config::load_engine_settings(&config);

    // The refresher holds one connection per concurrent scoring task on top
    // of the request-path headroom.
    let pool_size = config
        .db_pool_size
        .max(settings.background_scoring.max_concurrent_scoring as u32 + 2);
    let db = create_pool(&config.database_url, pool_size)?;

    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url, "ember-matching").await?;
    let swipe = SwipeServiceClient::new(&config.swipe_service_url);
    let safety = SafetyServiceClient::new(&config.safety_service_url);

    let state = Arc::new(AppState {
        db,
        config,
        settings: RwLock::new(settings),
        rabbitmq,
        swipe,
        safety,
        limiter: DailySuggestionLimiter::new(),
        pipeline: FilterPipeline::new(),
        active_users: ActiveUserCache::new(),
    });

    let shutdown = CancellationToken::new();
    config::spawn_settings_watcher(state.clone(), shutdown.clone());
    let refresher = workers::refresher::spawn(state.clone(), shutdown.clone());
    let generator = workers::daily_picks::spawn(state.clone(), shutdown.clone());

    // Spawn RabbitMQ subscriber for swipe.recorded events
    let sub_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_swipe_recorded(sub_state).await {
            tracing::error!(error = %e, "swipe.recorded subscriber failed");
        }
    });

    let metrics_handle = ember_shared::middleware::init_metrics();

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .route("/candidates/:user_id", get(routes::candidates::get_candidates))
        .route("/matches/:user_id/stats", get(routes::matches::get_match_stats))
        .route(
            "/suggestions/:user_id/status",
            get(routes::suggestions::get_suggestion_status),
        )
        // Internal service-to-service endpoints (API-key gated)
        .route("/internal/matches", post(routes::internal::record_mutual_match))
        .route(
            "/internal/matches/:user_id",
            delete(routes::internal::delete_user_matches),
        )
        .route("/internal/activity", post(routes::internal::update_activity))
        .route(
            "/internal/activity/batch",
            post(routes::internal::update_activity_batch),
        )
        .route("/internal/users/:user_id", delete(routes::internal::delete_user))
        .layer(axum::middleware::from_fn(
            ember_shared::middleware::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "ember-matching starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, stopping gracefully");
        })
        .await?;

    shutdown.cancel();
    let _ = refresher.await;
    let _ = generator.await;

    Ok(())
}
