//! # Model Catalog
//!
//! Registry of the AI models the gateway knows about, with pagination and
//! filtering for the `/v1/models` routes.
//!
//! Storage sits behind the [`ModelRepository`] trait; the gateway ships the
//! in-memory [`InMemoryModelRepository`].

pub mod memory;
pub mod seed;

pub use memory::InMemoryModelRepository;
pub use seed::{sample_models, seed_catalog};

use crate::error::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default page size of list queries.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Kind of model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Chat,
    Completion,
    Embedding,
}

/// # Model Record
///
/// One catalog entry as stored and returned.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelRecord {
    pub id: u64,
    pub name: String,
    /// e.g. "openai", "anthropic", "cohere"
    pub provider: String,
    /// Provider-side identifier, e.g. "gpt-4"
    pub model_id: String,
    pub model_type: ModelType,
    pub description: Option<String>,
    pub max_tokens: Option<u32>,
    pub input_cost_per_token: Option<f64>,
    pub output_cost_per_token: Option<f64>,
    pub context_window: Option<u32>,
    /// Vector length, for embedding models
    pub dimension: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /v1/models`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelCreate {
    pub name: String,
    pub provider: String,
    pub model_id: String,
    pub model_type: ModelType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub input_cost_per_token: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token: Option<f64>,
    #[serde(default)]
    pub context_window: Option<u32>,
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ModelCreate {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("name", &self.name),
            ("provider", &self.provider),
            ("model_id", &self.model_id),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", field));
            }
        }
        check_cost("input_cost_per_token", self.input_cost_per_token)?;
        check_cost("output_cost_per_token", self.output_cost_per_token)?;
        check_dimension(self.dimension)
    }

    /// Build the stored record.
    pub fn into_record(self, id: u64, now: DateTime<Utc>) -> ModelRecord {
        ModelRecord {
            id,
            name: self.name,
            provider: self.provider,
            model_id: self.model_id,
            model_type: self.model_type,
            description: self.description,
            max_tokens: self.max_tokens,
            input_cost_per_token: self.input_cost_per_token,
            output_cost_per_token: self.output_cost_per_token,
            context_window: self.context_window,
            dimension: self.dimension,
            is_active: self.is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

fn check_cost(field: &str, value: Option<f64>) -> Result<(), String> {
    match value {
        Some(cost) if cost.is_nan() || cost < 0.0 => Err(format!("{} must not be negative", field)),
        _ => Ok(()),
    }
}

fn check_dimension(value: Option<u32>) -> Result<(), String> {
    if value == Some(0) {
        return Err("dimension must be at least 1".to_string());
    }
    Ok(())
}

/// Body of `PUT /v1/models/{id}`. Only the fields present are changed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModelUpdate {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model_id: Option<String>,
    pub model_type: Option<ModelType>,
    pub description: Option<String>,
    pub max_tokens: Option<u32>,
    pub input_cost_per_token: Option<f64>,
    pub output_cost_per_token: Option<f64>,
    pub context_window: Option<u32>,
    pub dimension: Option<u32>,
    pub is_active: Option<bool>,
}

impl ModelUpdate {
    pub fn activation(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("name", &self.name),
            ("provider", &self.provider),
            ("model_id", &self.model_id),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(format!("{} must not be empty", field));
            }
        }
        check_cost("input_cost_per_token", self.input_cost_per_token)?;
        check_cost("output_cost_per_token", self.output_cost_per_token)?;
        check_dimension(self.dimension)
    }

    /// Apply the present fields to `record` and bump `updated_at`.
    pub fn apply(self, record: &mut ModelRecord, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(provider) = self.provider {
            record.provider = provider;
        }
        if let Some(model_id) = self.model_id {
            record.model_id = model_id;
        }
        if let Some(model_type) = self.model_type {
            record.model_type = model_type;
        }
        if self.description.is_some() {
            record.description = self.description;
        }
        if self.max_tokens.is_some() {
            record.max_tokens = self.max_tokens;
        }
        if self.input_cost_per_token.is_some() {
            record.input_cost_per_token = self.input_cost_per_token;
        }
        if self.output_cost_per_token.is_some() {
            record.output_cost_per_token = self.output_cost_per_token;
        }
        if self.context_window.is_some() {
            record.context_window = self.context_window;
        }
        if self.dimension.is_some() {
            record.dimension = self.dimension;
        }
        if let Some(is_active) = self.is_active {
            record.is_active = is_active;
        }
        record.updated_at = now;
    }
}

/// Query string of `GET /v1/models`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    pub provider: Option<String>,
    pub model_type: Option<ModelType>,
    pub is_active: Option<bool>,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_size(),
            provider: None,
            model_type: None,
            is_active: None,
        }
    }
}

impl ListQuery {
    pub fn validate(&self) -> Result<(), String> {
        if self.page < 1 {
            return Err("page must be at least 1".to_string());
        }
        if self.size < 1 || self.size > MAX_PAGE_SIZE {
            return Err(format!("size must be between 1 and {}", MAX_PAGE_SIZE));
        }
        Ok(())
    }

    /// Number of records to skip for this page
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.size as usize
    }

    pub fn matches(&self, record: &ModelRecord) -> bool {
        // an empty provider filter means no filter
        let provider_ok = match self.provider.as_deref() {
            Some(provider) if !provider.is_empty() => record.provider == provider,
            _ => true,
        };
        provider_ok
            && self.model_type.map_or(true, |t| record.model_type == t)
            && self.is_active.map_or(true, |active| record.is_active == active)
    }
}

/// Body of `GET /v1/models`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelListResponse {
    pub items: Vec<ModelRecord>,
    pub total: usize,
    pub page: u32,
    pub size: u32,
    pub pages: usize,
}

impl ModelListResponse {
    pub fn new(items: Vec<ModelRecord>, total: usize, query: &ListQuery) -> Self {
        let size = query.size.max(1) as usize;
        let pages = if total > 0 { total.div_ceil(size) } else { 1 };
        Self {
            items,
            total,
            page: query.page,
            size: query.size,
            pages,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("AI model not found")]
    NotFound(u64),
    #[error("AI model '{model_id}' from provider '{provider}' already exists")]
    Duplicate { provider: String, model_id: String },
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            CatalogError::Duplicate { .. } => ServiceError::Conflict(err.to_string()),
        }
    }
}

/// Storage for catalog records.
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Insert a record. Fails if `(provider, model_id)` is taken.
    async fn create(&self, model: ModelCreate) -> Result<ModelRecord, CatalogError>;

    async fn get(&self, id: u64) -> Option<ModelRecord>;

    async fn find_by_model_id(&self, provider: &str, model_id: &str) -> Option<ModelRecord>;

    /// One page of matching records, in id order, and the total match count.
    async fn list(&self, query: &ListQuery) -> (Vec<ModelRecord>, usize);

    async fn update(&self, id: u64, update: ModelUpdate) -> Result<ModelRecord, CatalogError>;

    /// Remove a record for good.
    async fn delete(&self, id: u64) -> Result<(), CatalogError>;

    /// Soft delete: keep the record, mark it inactive.
    async fn deactivate(&self, id: u64) -> Result<ModelRecord, CatalogError> {
        self.update(id, ModelUpdate::activation(false)).await
    }

    async fn activate(&self, id: u64) -> Result<ModelRecord, CatalogError> {
        self.update(id, ModelUpdate::activation(true)).await
    }
}
