//! # Server Module
//!
//! Router, handlers and shared state of the HTTP gateway.

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{self, TraceLayer},
};
use tracing::Level;

/// Create router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Chat completions, buffered or streamed
        .route("/v1/chat", post(handlers::chat_completions))
        .route("/v1/chat/completions", post(handlers::chat_completions))

        // Embeddings
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/embed", post(handlers::embeddings))

        // Model catalog
        .route("/v1/models", get(handlers::list_models).post(handlers::create_model))
        .route(
            "/v1/models/{id}",
            get(handlers::get_model)
                .put(handlers::update_model)
                .delete(handlers::delete_model),
        )
        .route("/v1/models/{id}/activate", post(handlers::activate_model))
        .route("/v1/models/{id}/deactivate", post(handlers::deactivate_model))

        // Root and health
        .route("/v1/", get(handlers::root))
        .route("/v1/health", get(handlers::health_check))
        .route("/health", get(handlers::health_check))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new().level(Level::INFO)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
