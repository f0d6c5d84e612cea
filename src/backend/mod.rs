//! ATSD backend
//!
//! The finder talks to ATSD through the [`AtsdBackend`] trait so the resolver
//! and the batching engine can run against the real REST client or an
//! in-memory fake.

mod client;
pub mod types;

pub use client::{AtsdClient, AtsdConfig, BackendError};
pub use types::{
    EntityInfo, EntityTags, MetricInfo, NameFilter, SeriesQuery, SeriesResponse, SeriesResult,
};

use async_trait::async_trait;

/// Operations the finder needs from the time-series store
#[async_trait]
pub trait AtsdBackend: Send + Sync {
    /// Entities whose name matches `filter`
    async fn entities(&self, filter: &NameFilter) -> Result<Vec<EntityInfo>, BackendError>;

    /// Metrics whose name matches `filter`
    async fn metrics(&self, filter: &NameFilter) -> Result<Vec<MetricInfo>, BackendError>;

    /// Metrics collected for `entity` whose name matches `filter`
    async fn entity_metrics(
        &self,
        entity: &str,
        filter: &NameFilter,
    ) -> Result<Vec<MetricInfo>, BackendError>;

    /// Every `(entity, tags)` combination reporting `metric`
    async fn entity_and_tags(&self, metric: &str) -> Result<Vec<EntityTags>, BackendError>;

    /// Metric metadata
    async fn metric(&self, name: &str) -> Result<MetricInfo, BackendError>;

    /// Entity metadata
    async fn entity(&self, name: &str) -> Result<EntityInfo, BackendError>;

    /// Run a multi-query series batch
    async fn query_series(&self, queries: &[SeriesQuery])
        -> Result<Vec<SeriesResult>, BackendError>;

    /// Check that the store is reachable
    async fn health_check(&self) -> Result<(), BackendError> {
        self.metrics(&NameFilter::All).await.map(|_| ())
    }
}
