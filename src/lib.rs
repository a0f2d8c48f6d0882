//! # AI Factory Gateway
//!
//! HTTP gateway for chat completions and embeddings. Chat traffic is proxied to
//! an OpenAI-compatible upstream (OpenRouter by default), buffered or streamed
//! back as server-sent events; embeddings are computed locally. A small model
//! catalog keeps track of the models on offer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_factory::{create_router, AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::for_test(); // or Config::parse_args() for CLI
//!     let state = AppState::from_config(config)?;
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`upstream`] - upstream client and line framing of streamed bodies
//! - [`streaming`] - stream translator and SSE framing
//! - [`orchestrator`] - request validation and buffered/streamed dispatch
//! - [`embedding`] - local embedding backend
//! - [`catalog`] - model catalog storage
//! - [`server`] - axum router, handlers and shared state
//! - [`config`], [`error`], [`schemas`] - configuration, error types, wire types

pub mod core;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod orchestrator;
pub mod schemas;
pub mod streaming;
pub mod upstream;

#[cfg(feature = "server")]
pub mod graceful_shutdown;

#[cfg(feature = "server")]
pub mod server;

pub use config::Config;
pub use error::{ServiceError, StreamError, UpstreamError};
pub use orchestrator::{ChatOrchestrator, ChatOutcome, ChatStream};
pub use schemas::{ChatRequest, ChatResponse, Message, Role};
pub use upstream::{ChatModel, LineStream, UpstreamClient};
pub use embedding::{EmbeddingModel, HashingEmbedder};
pub use catalog::{InMemoryModelRepository, ModelRepository};
pub use crate::core::http_client::{HttpClientBuilder, HttpClientConfig};

#[cfg(feature = "server")]
pub use server::{create_router, AppState};

#[cfg(feature = "server")]
pub use graceful_shutdown::GracefulShutdown;
