//! Metadata cache
//!
//! TTL cache in front of the ATSD metadata calls that the resolver and the
//! readers repeat most: `entity-and-tags` per metric, and metric/entity
//! records used for retention bounds. Listing calls go straight to the
//! backend.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::backend::{AtsdBackend, BackendError, EntityInfo, EntityTags, MetricInfo};

struct Cached<T> {
    value: T,
    /// Unix milliseconds
    cached_at: i64,
}

type Slot<T> = Mutex<HashMap<String, Cached<T>>>;

/// Shared metadata cache, `ttl_ms == 0` disables caching
pub struct MetadataCache {
    backend: Arc<dyn AtsdBackend>,
    ttl_ms: i64,
    combos: Slot<Vec<EntityTags>>,
    metrics: Slot<MetricInfo>,
    entities: Slot<EntityInfo>,
}

impl MetadataCache {
    pub fn new(backend: Arc<dyn AtsdBackend>, ttl_ms: i64) -> Self {
        Self {
            backend,
            ttl_ms,
            combos: Mutex::new(HashMap::new()),
            metrics: Mutex::new(HashMap::new()),
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Uncached backend access
    pub fn backend(&self) -> &Arc<dyn AtsdBackend> {
        &self.backend
    }

    pub async fn entity_and_tags(&self, metric: &str) -> Result<Vec<EntityTags>, BackendError> {
        self.get_or_load(&self.combos, metric, || self.backend.entity_and_tags(metric))
            .await
    }

    pub async fn metric(&self, name: &str) -> Result<MetricInfo, BackendError> {
        self.get_or_load(&self.metrics, name, || self.backend.metric(name))
            .await
    }

    pub async fn entity(&self, name: &str) -> Result<EntityInfo, BackendError> {
        self.get_or_load(&self.entities, name, || self.backend.entity(name))
            .await
    }

    /// Drop every cached record
    pub fn invalidate(&self) {
        self.combos.lock().clear();
        self.metrics.lock().clear();
        self.entities.lock().clear();
        tracing::debug!("Metadata cache invalidated");
    }

    /// Drop the records cached for one metric
    pub fn invalidate_metric(&self, metric: &str) {
        self.combos.lock().remove(metric);
        self.metrics.lock().remove(metric);
    }

    /// Number of live entries across all slots
    pub fn len(&self) -> usize {
        self.combos.lock().len() + self.metrics.lock().len() + self.entities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<T: Clone>(&self, slot: &Slot<T>, key: &str) -> Option<T> {
        let now = Utc::now().timestamp_millis();
        let mut map = slot.lock();
        match map.get(key) {
            Some(cached) if now - cached.cached_at < self.ttl_ms => Some(cached.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    async fn get_or_load<T, F, Fut>(
        &self,
        slot: &Slot<T>,
        key: &str,
        load: F,
    ) -> Result<T, BackendError>
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        if let Some(value) = self.lookup(slot, key) {
            return Ok(value);
        }

        let value = load().await?;
        if self.ttl_ms > 0 {
            let now = Utc::now().timestamp_millis();
            let mut map = slot.lock();
            // Expired keys nobody asks for again go on the next insert
            map.retain(|_, cached| now - cached.cached_at < self.ttl_ms);
            map.insert(
                key.to_string(),
                Cached {
                    value: value.clone(),
                    cached_at: now,
                },
            );
        }
        Ok(value)
    }
}
