//! Bookstore binary entry point

use bookstore::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber from `[logging]`; `RUST_LOG` wins when set.
fn init_tracing(logging: &config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter_directive().into());

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Application entry point
///
/// # Setup
/// 1. Load `.env` and configuration from file and environment
/// 2. Initialize tracing/logging from the `[logging]` section
/// 3. Validate configuration and initialize metrics
/// 4. Initialize AppState
/// 5. Build Axum router
/// 6. Start background tasks (session sweeper)
/// 7. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let dotenv = dotenvy::dotenv();
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(error) if error.not_found() => {}
        Err(error) => tracing::warn!(%error, "Failed to read .env"),
    }

    tracing::info!("Starting Bookstore API...");

    // 3. Validate configuration and initialize metrics
    config.validate()?;
    bookstore::metrics::init_metrics();
    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        "Configuration loaded"
    );

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Build Axum router
    let app = bookstore::build_router(state.clone());

    // 6. Start background tasks
    bookstore::spawn_session_sweeper(
        state.sessions.clone(),
        std::time::Duration::from_secs(config.auth.session_sweep_interval_seconds),
    );
    tracing::info!(
        interval_seconds = config.auth.session_sweep_interval_seconds,
        "Session sweeper spawned"
    );

    // 7. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.server.base_url());

    axum::serve(listener, app).await?;

    Ok(())
}
