//! In-memory catalog storage.

use super::{CatalogError, ListQuery, ModelCreate, ModelRecord, ModelRepository, ModelUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
struct Inner {
    records: BTreeMap<u64, ModelRecord>,
    next_id: u64,
}

impl Inner {
    fn taken_by(&self, provider: &str, model_id: &str) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.provider == provider && r.model_id == model_id)
            .map(|r| r.id)
    }
}

/// Catalog kept in a `BTreeMap` behind a `tokio` read/write lock.
///
/// Ids start at 1 and are never reused, even after a hard delete.
#[derive(Debug)]
pub struct InMemoryModelRepository {
    inner: RwLock<Inner>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryModelRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn create(&self, model: ModelCreate) -> Result<ModelRecord, CatalogError> {
        let mut inner = self.inner.write().await;
        if inner.taken_by(&model.provider, &model.model_id).is_some() {
            return Err(CatalogError::Duplicate {
                provider: model.provider,
                model_id: model.model_id,
            });
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let record = model.into_record(id, Utc::now());
        inner.records.insert(id, record.clone());

        info!(id = id, provider = %record.provider, model_id = %record.model_id, "Catalog model created");
        Ok(record)
    }

    async fn get(&self, id: u64) -> Option<ModelRecord> {
        self.inner.read().await.records.get(&id).cloned()
    }

    async fn find_by_model_id(&self, provider: &str, model_id: &str) -> Option<ModelRecord> {
        let inner = self.inner.read().await;
        inner
            .taken_by(provider, model_id)
            .and_then(|id| inner.records.get(&id).cloned())
    }

    async fn list(&self, query: &ListQuery) -> (Vec<ModelRecord>, usize) {
        let inner = self.inner.read().await;
        let matching: Vec<&ModelRecord> = inner.records.values().filter(|r| query.matches(r)).collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.size as usize)
            .cloned()
            .collect();
        (items, total)
    }

    async fn update(&self, id: u64, update: ModelUpdate) -> Result<ModelRecord, CatalogError> {
        let mut inner = self.inner.write().await;
        let current = inner.records.get(&id).ok_or(CatalogError::NotFound(id))?;

        let provider = update.provider.clone().unwrap_or_else(|| current.provider.clone());
        let model_id = update.model_id.clone().unwrap_or_else(|| current.model_id.clone());
        if inner.taken_by(&provider, &model_id).is_some_and(|other| other != id) {
            return Err(CatalogError::Duplicate { provider, model_id });
        }

        let record = inner.records.get_mut(&id).ok_or(CatalogError::NotFound(id))?;
        update.apply(record, Utc::now());
        debug!(id = id, is_active = record.is_active, "Catalog model updated");
        Ok(record.clone())
    }

    async fn delete(&self, id: u64) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().await;
        inner.records.remove(&id).ok_or(CatalogError::NotFound(id))?;
        info!(id = id, "Catalog model deleted");
        Ok(())
    }
}
