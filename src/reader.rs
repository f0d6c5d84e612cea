//! Series reader
//!
//! Bound to one leaf of the namespace. A fetch picks the aggregation (pinned
//! by the path or chosen by the retention policy), queues the query on the
//! shared [`QueryBatcher`] and hands back a [`PendingFetch`]. Nothing goes
//! over the wire until some pending fetch is awaited.

use chrono::Utc;
use std::sync::Arc;

use crate::backend::{AtsdBackend, SeriesQuery};
use crate::batch::{FetchHandle, QueryBatcher, RequestId};
use crate::cache::MetadataCache;
use crate::error::FinderResult;
use crate::retention::RetentionPolicy;
use crate::series::{regularize, AggregationDescriptor, SeriesData, SeriesIdentity, TimeRange};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Services shared by every reader built during a resolution
#[derive(Clone)]
pub struct ReaderContext {
    pub batcher: Arc<QueryBatcher>,
    pub policy: Arc<RetentionPolicy>,
    pub metadata: Arc<MetadataCache>,
}

impl ReaderContext {
    pub fn new(backend: Arc<dyn AtsdBackend>, policy: RetentionPolicy, cache_ttl_ms: i64) -> Self {
        Self {
            batcher: QueryBatcher::new(backend.clone()),
            policy: Arc::new(policy),
            metadata: Arc::new(MetadataCache::new(backend, cache_ttl_ms)),
        }
    }
}

/// Fetches one series through the batching engine
#[derive(Clone)]
pub struct SeriesReader {
    identity: SeriesIdentity,
    /// Pinned by the path; `None` defers to the retention policy
    aggregation: Option<AggregationDescriptor>,
    /// Explicit look-back (ms) used for tier selection
    interval: Option<i64>,
    context: ReaderContext,
}

impl SeriesReader {
    pub fn new(identity: SeriesIdentity, context: ReaderContext) -> Self {
        Self {
            identity,
            aggregation: None,
            interval: None,
            context,
        }
    }

    /// Builder method: pin the aggregation
    pub fn with_aggregation(mut self, aggregation: AggregationDescriptor) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Builder method: select tiers as if the window were `interval_ms` long
    pub fn with_interval(mut self, interval_ms: i64) -> Self {
        self.interval = Some(interval_ms);
        self
    }

    pub fn identity(&self) -> &SeriesIdentity {
        &self.identity
    }

    pub fn aggregation(&self) -> Option<AggregationDescriptor> {
        self.aggregation
    }

    pub fn interval(&self) -> Option<i64> {
        self.interval
    }

    /// Aggregation that a fetch over `range` would request, `None` for raw
    pub fn effective_aggregation(&self, range: TimeRange) -> Option<AggregationDescriptor> {
        self.aggregation
            .or_else(|| {
                self.context.policy.select(
                    self.identity.metric(),
                    range.end,
                    range.start,
                    self.interval,
                )
            })
            .filter(|agg| !agg.is_detail())
    }

    /// Queue a fetch of `range`; no I/O happens until the result is awaited
    pub fn fetch(&self, range: TimeRange) -> PendingFetch {
        let aggregation = self.effective_aggregation(range);
        let window = match aggregation {
            Some(agg) if agg.whole_seconds().is_some() => align(range, agg.step_ms()),
            _ => range,
        };

        tracing::debug!(
            series = %self.identity,
            aggregation = ?aggregation.map(|a| a.to_string()),
            start = window.start,
            end = window.end,
            "Queueing series fetch"
        );

        let query = SeriesQuery::new(&self.identity, window, aggregation.as_ref());
        PendingFetch {
            handle: self.context.batcher.enqueue(query),
            window,
            step: aggregation.map(|a| a.step_ms()),
        }
    }

    /// Time range this series holds data for.
    ///
    /// Ends at the latest insert of the metric or the entity and starts
    /// retention days earlier, or at the epoch when the metric is kept
    /// forever.
    pub async fn intervals(&self) -> FinderResult<TimeRange> {
        let metric = self.context.metadata.metric(self.identity.metric()).await?;
        let entity_insert = if self.identity.has_entity_wildcard() {
            None
        } else {
            self.context
                .metadata
                .entity(self.identity.entity())
                .await?
                .last_insert_time
        };

        let end = metric
            .last_insert_time
            .into_iter()
            .chain(entity_insert)
            .max()
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        let start = match metric.retention_interval {
            Some(days) if days > 0 => end - days * DAY_MS,
            _ => 1_000,
        };

        TimeRange::new(start, end)
    }
}

/// Widen `range` to whole multiples of `step`
fn align(range: TimeRange, step: i64) -> TimeRange {
    if step <= 0 {
        return range;
    }
    TimeRange {
        start: range.start.div_euclid(step) * step,
        end: (range.end.div_euclid(step) + 1) * step,
    }
}

/// A queued fetch, resolved once by [`PendingFetch::wait`]
#[derive(Debug)]
pub struct PendingFetch {
    handle: FetchHandle,
    window: TimeRange,
    step: Option<i64>,
}

impl PendingFetch {
    pub fn request_id(&self) -> RequestId {
        self.handle.id()
    }

    /// Window actually requested from ATSD
    pub fn window(&self) -> TimeRange {
        self.window
    }

    /// Await the batch and regularize the samples
    pub async fn wait(self) -> FinderResult<SeriesData> {
        let samples = self.handle.wait().await?;
        tracing::debug!(samples = samples.len(), "Series fetched");
        Ok(regularize(&samples, self.step, self.window))
    }
}
