//! Tracing bootstrap for ember services.
//!
//! Filter resolution order: `EMBER_LOG`, then `RUST_LOG`, then a default
//! that keeps the service itself at debug while quieting the transport
//! crates. `EMBER_ENV=production` switches to JSON lines for the log
//! pipeline; anything else gets the compact human format.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing(service_name: &str) {
    let crate_name = service_name.replace('-', "_");
    let default_directives = format!(
        "info,{crate_name}=debug,ember_shared=debug,tower_http=info,lapin=warn,hyper=warn"
    );

    let env_filter = std::env::var("EMBER_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives));

    let is_production = std::env::var("EMBER_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    if is_production {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    tracing::info!(
        service = service_name,
        production = is_production,
        "tracing initialized"
    );
}
