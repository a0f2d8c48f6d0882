//! # Application State
//!
//! Shared state passed to all HTTP handlers. Built once in `main` (or in a
//! test) and injected into the router; there are no global singletons.

use crate::{
    catalog::{InMemoryModelRepository, ModelRepository},
    config::Config,
    core::http_client::HttpClientError,
    embedding::{EmbeddingModel, HashingEmbedder},
    orchestrator::ChatOrchestrator,
    upstream::{ChatModel, UpstreamClient},
};
use std::sync::Arc;

/// # Application State
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: ChatOrchestrator,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub catalog: Arc<dyn ModelRepository>,
}

impl AppState {
    /// Assemble state from explicit parts.
    pub fn new(
        config: Config,
        chat_model: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingModel>,
        catalog: Arc<dyn ModelRepository>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: ChatOrchestrator::new(chat_model),
            embedder,
            catalog,
        }
    }

    /// Production wiring: upstream client, hashing embedder, in-memory catalog.
    pub fn from_config(config: Config) -> Result<Self, HttpClientError> {
        let upstream = UpstreamClient::from_config(&config)?;
        let embedder = HashingEmbedder::new(config.embedding_model_ids(), config.embedding_dimension);

        Ok(Self::new(
            config,
            Arc::new(upstream),
            Arc::new(embedder),
            Arc::new(InMemoryModelRepository::new()),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
