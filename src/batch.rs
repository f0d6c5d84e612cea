//! Query Batching & Correlation Engine
//!
//! Collects series queries issued while the host walks its targets and sends
//! them to ATSD as a single `POST series` batch.
//!
//! # Lifecycle
//!
//! ```text
//! enqueue(q1) ─┐
//! enqueue(q2) ─┼─ pending map (no I/O)
//! enqueue(q3) ─┘
//! h2.wait()   ─── flush: [q1, q2, q3] → one batch → routed by requestId
//! h1.wait()   ─── already resolved, no I/O
//! ```
//!
//! Each entry leaves the pending map exactly once, when its result is
//! claimed. Claiming an id twice is a caller bug and fails with
//! [`FinderError::HandleConsumed`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::backend::{AtsdBackend, SeriesQuery};
use crate::error::{FinderError, FinderResult};
use crate::series::Sample;

/// Process-unique correlation id, `q<n>` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

type FetchOutcome = FinderResult<Vec<Sample>>;

struct PendingEntry {
    /// Present until the entry is swept into a batch
    query: Option<SeriesQuery>,
    sender: Option<oneshot::Sender<FetchOutcome>>,
    receiver: oneshot::Receiver<FetchOutcome>,
}

/// A query swept into a batch, with the channel its result goes to
struct Dispatch {
    id: RequestId,
    query: SeriesQuery,
    sender: oneshot::Sender<FetchOutcome>,
}

/// Deferred multi-query dispatcher shared by every reader
pub struct QueryBatcher {
    backend: Arc<dyn AtsdBackend>,
    pending: Mutex<HashMap<RequestId, PendingEntry>>,
    next_id: AtomicU64,
}

impl QueryBatcher {
    /// Create a new batcher sending to `backend`
    pub fn new(backend: Arc<dyn AtsdBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Queue a query without touching the network
    pub fn enqueue(self: &Arc<Self>, query: SeriesQuery) -> FetchHandle {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = oneshot::channel();

        self.pending.lock().insert(
            id,
            PendingEntry {
                query: Some(query),
                sender: Some(sender),
                receiver,
            },
        );

        tracing::trace!(request_id = %id, "Series query queued");

        FetchHandle {
            id,
            batcher: Arc::clone(self),
            claimed: false,
        }
    }

    /// Number of entries not yet claimed
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Claim the result for `id`, flushing the queue if it was not sent yet.
    pub async fn resolve(&self, id: RequestId) -> FetchOutcome {
        let (receiver, batch) = {
            let mut pending = self.pending.lock();
            let entry = pending
                .remove(&id)
                .ok_or(FinderError::HandleConsumed(id))?;

            let mut batch = Vec::new();
            if let (Some(query), Some(sender)) = (entry.query, entry.sender) {
                batch.push(Dispatch { id, query, sender });
                batch.extend(Self::sweep(&mut pending));
            }
            (entry.receiver, batch)
        };

        if !batch.is_empty() {
            // Runs on its own task so a caller giving up does not cancel the batch
            tokio::spawn(dispatch(Arc::clone(&self.backend), batch));
        }

        receiver.await.map_err(|_| {
            FinderError::BackendTransport(format!("batch carrying {} was abandoned", id))
        })?
    }

    /// Take every queued query still waiting to be sent
    fn sweep(pending: &mut HashMap<RequestId, PendingEntry>) -> Vec<Dispatch> {
        pending
            .iter_mut()
            .filter_map(|(id, entry)| match (entry.query.take(), entry.sender.take()) {
                (Some(query), Some(sender)) => Some(Dispatch {
                    id: *id,
                    query,
                    sender,
                }),
                _ => None,
            })
            .collect()
    }

    /// Forget an entry whose handle was dropped unclaimed
    fn discard(&self, id: RequestId) {
        self.pending.lock().remove(&id);
    }
}

/// Send one batch and route each result to its waiter.
///
/// Identical queries in the batch share a single wire query.
async fn dispatch(backend: Arc<dyn AtsdBackend>, batch: Vec<Dispatch>) {
    let mut wire_ids: HashMap<SeriesQuery, String> = HashMap::new();
    let mut waiters: HashMap<String, Vec<(RequestId, oneshot::Sender<FetchOutcome>)>> =
        HashMap::new();
    let mut queries = Vec::new();

    for Dispatch { id, query, sender } in batch {
        let wire_id = match wire_ids.get(&query) {
            Some(wire_id) => wire_id.clone(),
            None => {
                let wire_id = id.to_string();
                wire_ids.insert(query.clone(), wire_id.clone());
                queries.push(query.with_request_id(wire_id.clone()));
                wire_id
            }
        };
        waiters.entry(wire_id).or_default().push((id, sender));
    }

    tracing::debug!(
        queries = queries.len(),
        waiters = waiters.values().map(Vec::len).sum::<usize>(),
        "Dispatching series batch"
    );

    match backend.query_series(&queries).await {
        Ok(results) => {
            let mut by_id: HashMap<String, Vec<Sample>> = results
                .into_iter()
                .filter_map(|r| r.request_id.map(|id| (id, r.data)))
                .collect();

            for (wire_id, senders) in waiters {
                match by_id.remove(&wire_id) {
                    Some(data) => {
                        for (_, sender) in senders {
                            let _ = sender.send(Ok(data.clone()));
                        }
                    }
                    None => {
                        tracing::warn!(request_id = %wire_id, "Batch response has no entry for query");
                        for (id, sender) in senders {
                            let _ = sender.send(Err(FinderError::MissingResponse(id)));
                        }
                    }
                }
            }
        }
        Err(e) => {
            let err = FinderError::from(e);
            tracing::warn!(error = %err, queries = queries.len(), "Series batch failed");
            for (_, sender) in waiters.into_values().flatten() {
                let _ = sender.send(Err(err.clone()));
            }
        }
    }
}

/// Claim ticket for one queued query
pub struct FetchHandle {
    id: RequestId,
    batcher: Arc<QueryBatcher>,
    claimed: bool,
}

impl FetchHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the samples of this query, flushing the queue if needed
    pub async fn wait(mut self) -> FetchOutcome {
        self.claimed = true;
        self.batcher.resolve(self.id).await
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        if !self.claimed {
            self.batcher.discard(self.id);
        }
    }
}

impl fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchHandle")
            .field("id", &self.id)
            .field("claimed", &self.claimed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::series::{SeriesIdentity, TimeRange};
    use std::collections::HashSet;

    fn query(metric: &str, start: i64) -> SeriesQuery {
        let range = TimeRange::new(start, start + 60_000).unwrap();
        SeriesQuery::new(&SeriesIdentity::new("e1", metric), range, None)
    }

    fn samples() -> Vec<Sample> {
        vec![Sample::new(1_000, 1.0), Sample::new(2_000, 2.0)]
    }

    #[tokio::test]
    async fn test_enqueue_does_no_io() {
        let backend = Arc::new(FakeBackend::new());
        let batcher = QueryBatcher::new(backend.clone());

        let _h1 = batcher.enqueue(query("m1", 0));
        let _h2 = batcher.enqueue(query("m2", 0));

        assert_eq!(backend.series_calls(), 0);
        assert_eq!(batcher.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_first_wait_flushes_everything_once() {
        let backend = Arc::new(FakeBackend::new().with_samples(samples()));
        let batcher = QueryBatcher::new(backend.clone());

        let handles: Vec<FetchHandle> = (0..5)
            .map(|i| batcher.enqueue(query(&format!("m{}", i), 0)))
            .collect();

        let mut handles = handles.into_iter();
        let first = handles.next().unwrap().wait().await.unwrap();
        assert_eq!(first, samples());
        assert_eq!(backend.series_calls(), 1);
        assert_eq!(backend.batches.lock()[0].len(), 5);

        for handle in handles {
            assert_eq!(handle.wait().await.unwrap(), samples());
        }
        assert_eq!(backend.series_calls(), 1);
        assert_eq!(batcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let backend = Arc::new(FakeBackend::new().with_samples(samples()));
        let batcher = QueryBatcher::new(backend.clone());

        let handles: Vec<FetchHandle> = (0..10)
            .map(|i| batcher.enqueue(query("m", i * 60_000)))
            .collect();
        let ids: HashSet<RequestId> = handles.iter().map(FetchHandle::id).collect();
        assert_eq!(ids.len(), 10);

        for handle in handles {
            handle.wait().await.unwrap();
        }

        let batches = backend.batches.lock();
        let wire_ids: HashSet<String> = batches[0]
            .iter()
            .filter_map(|q| q.request_id.clone())
            .collect();
        assert_eq!(wire_ids.len(), 10);
    }

    #[tokio::test]
    async fn test_second_claim_fails() {
        let backend = Arc::new(FakeBackend::new().with_samples(samples()));
        let batcher = QueryBatcher::new(backend.clone());

        let handle = batcher.enqueue(query("m1", 0));
        let id = handle.id();

        assert!(batcher.resolve(id).await.is_ok());
        assert_eq!(
            batcher.resolve(id).await,
            Err(FinderError::HandleConsumed(id))
        );
        drop(handle);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_whole_flush() {
        let backend = Arc::new(FakeBackend {
            fail_series: true,
            ..FakeBackend::new()
        });
        let batcher = QueryBatcher::new(backend.clone());

        let h1 = batcher.enqueue(query("m1", 0));
        let h2 = batcher.enqueue(query("m2", 0));

        assert!(matches!(
            h1.wait().await,
            Err(FinderError::BackendTransport(_))
        ));
        assert!(matches!(
            h2.wait().await,
            Err(FinderError::BackendTransport(_))
        ));
        assert_eq!(backend.series_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_response_is_distinct() {
        let backend = Arc::new(FakeBackend {
            drop_metric: Some("lost".to_string()),
            ..FakeBackend::new().with_samples(samples())
        });
        let batcher = QueryBatcher::new(backend.clone());

        let kept = batcher.enqueue(query("kept", 0));
        let lost = batcher.enqueue(query("lost", 0));
        let lost_id = lost.id();

        assert_eq!(
            lost.wait().await,
            Err(FinderError::MissingResponse(lost_id))
        );
        assert_eq!(kept.wait().await.unwrap(), samples());
    }

    #[tokio::test]
    async fn test_identical_queries_share_wire_query() {
        let backend = Arc::new(FakeBackend::new().with_samples(samples()));
        let batcher = QueryBatcher::new(backend.clone());

        let h1 = batcher.enqueue(query("m1", 0));
        let h2 = batcher.enqueue(query("m1", 0));

        assert_eq!(h1.wait().await.unwrap(), samples());
        assert_eq!(h2.wait().await.unwrap(), samples());
        assert_eq!(backend.batches.lock()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_queries_after_flush_go_in_next_batch() {
        let backend = Arc::new(FakeBackend::new().with_samples(samples()));
        let batcher = QueryBatcher::new(backend.clone());

        batcher.enqueue(query("m1", 0)).wait().await.unwrap();
        let late = batcher.enqueue(query("m2", 0));
        late.wait().await.unwrap();

        assert_eq!(backend.series_calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_handle_is_discarded() {
        let backend = Arc::new(FakeBackend::new().with_samples(samples()));
        let batcher = QueryBatcher::new(backend.clone());

        let dropped = batcher.enqueue(query("m1", 0));
        let kept = batcher.enqueue(query("m2", 0));
        drop(dropped);
        assert_eq!(batcher.pending_count(), 1);

        kept.wait().await.unwrap();
        assert_eq!(backend.batches.lock()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_flush() {
        let backend = Arc::new(FakeBackend::new().with_samples(samples()));
        let batcher = QueryBatcher::new(backend.clone());

        let handles: Vec<FetchHandle> = (0..8)
            .map(|i| batcher.enqueue(query(&format!("m{}", i), 0)))
            .collect();

        let results = futures_util::future::join_all(handles.into_iter().map(FetchHandle::wait)).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(backend.series_calls(), 1);
    }
}
