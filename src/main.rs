//! # AI Factory Gateway server
//!
//! Parses configuration, wires the application state and serves the router
//! until a shutdown signal arrives.

use ai_factory::{catalog::seed_catalog, create_router, AppState, Config, GracefulShutdown};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from CLI args and .env file
    let config = Config::parse_args();

    let state = AppState::from_config(config.clone())?;

    if config.seed_catalog {
        seed_catalog(state.catalog.as_ref()).await;
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("AI Factory gateway starting on http://{}", addr);
    info!("Upstream URL: {}", config.safe_upstream_url());
    info!("Embedding models: {}", config.embedding_model_ids().join(", "));

    let shutdown = GracefulShutdown::new();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().wait_for_signal())
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = shutdown.drain_deadline(Duration::from_secs(config.shutdown_timeout)) => {
            warn!("Forced shutdown after drain timeout");
        }
    }

    info!("Server stopped");
    Ok(())
}
