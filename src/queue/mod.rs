mod store;

pub use store::{HitStore, MemoryHitStore, SqliteHitStore};

use crate::error::{QueueError, Result};
use crate::transport::HttpTransport;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use url::Url;

/// One queued outbound request. The URL is fully resolved at enqueue time
/// and never recomputed; `signal_id` routes the completion back to the
/// triggering context and is never sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingHit {
    pub url: String,
    pub timeout_secs: u64,
    pub signal_id: u64,
}

impl PendingHit {
    pub fn new(url: &Url, timeout_secs: u64, signal_id: u64) -> Self {
        Self {
            url: url.to_string(),
            timeout_secs,
            signal_id,
        }
    }
}

/// Terminal outcome of one hit: delivered or dropped. Exactly one completion
/// per hit; retries produce none.
#[derive(Debug)]
pub struct HitCompletion {
    pub signal_id: u64,
    pub body: Vec<u8>,
}

/// Retry policy the worker applies to the head-of-queue hit.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub recoverable_statuses: Vec<u16>,
}

/// Durable FIFO hit queue with a single-consumer worker.
///
/// At most one network call is in flight per queue instance; `enqueue` is
/// safe from any task concurrently with worker activity. A recoverable
/// failure keeps the hit at head-of-queue (head-of-line blocking is the
/// intended trade-off for a low-volume queue) and is retried at a fixed
/// interval without bound.
pub struct HitQueue {
    store: Arc<dyn HitStore>,
    wake: Arc<Notify>,
    policy: Arc<RwLock<RetryPolicy>>,
    worker: JoinHandle<()>,
}

impl HitQueue {
    /// Spawns the worker, which immediately begins draining whatever the
    /// durable store already holds from previous runs.
    pub fn new(
        store: Arc<dyn HitStore>,
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        completions: mpsc::UnboundedSender<HitCompletion>,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let policy = Arc::new(RwLock::new(policy));
        let worker = tokio::spawn(worker_loop(
            Arc::clone(&store),
            transport,
            Arc::clone(&policy),
            completions,
            Arc::clone(&wake),
        ));
        Self {
            store,
            wake,
            policy,
            worker,
        }
    }

    /// Replaces the retry policy. Takes effect from the worker's next
    /// attempt; a sleep already in progress keeps its old duration.
    pub fn set_policy(&self, policy: RetryPolicy) {
        *self.policy.write().expect("retry policy lock poisoned") = policy;
    }

    /// Appends a hit to durable storage and wakes the worker. Never blocks;
    /// a durable-write failure surfaces to the caller and is not retried.
    pub fn enqueue(&self, hit: &PendingHit) -> Result<()> {
        let payload = serde_json::to_string(hit)
            .map_err(|e| QueueError::Enqueue(e.to_string()))?;
        self.store
            .push(&payload)
            .map_err(|e| QueueError::Enqueue(e.to_string()))?;
        self.wake.notify_one();
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.store.count().unwrap_or_else(|e| {
            tracing::warn!("hit count query failed: {e}");
            0
        })
    }

    /// Empties the backing store. Used on privacy opt-out; an in-flight
    /// request is not cancelled, but its row is already gone so its outcome
    /// removes nothing.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!("hit queue clear failed: {e}");
        }
    }
}

impl Drop for HitQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn worker_loop(
    store: Arc<dyn HitStore>,
    transport: Arc<dyn HttpTransport>,
    policy: Arc<RwLock<RetryPolicy>>,
    completions: mpsc::UnboundedSender<HitCompletion>,
    wake: Arc<Notify>,
) {
    loop {
        let policy = policy.read().expect("retry policy lock poisoned").clone();
        let head = match store.peek() {
            Ok(Some(head)) => head,
            Ok(None) => {
                wake.notified().await;
                continue;
            }
            Err(e) => {
                tracing::warn!("hit store peek failed: {e}");
                tokio::time::sleep(policy.interval).await;
                continue;
            }
        };
        let (row, payload) = head;

        // A row that cannot decode can never succeed: drop unconditionally,
        // with no completion event.
        let hit: PendingHit = match serde_json::from_str(&payload) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("malformed queued hit, dropping: {e}");
                remove_row(&store, row);
                continue;
            }
        };
        let url = match Url::parse(&hit.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("queued hit has unparsable url, dropping: {e}");
                remove_row(&store, row);
                continue;
            }
        };

        let reply = transport
            .get(&url, Duration::from_secs(hit.timeout_secs))
            .await;

        match reply.status {
            Some(200) => {
                tracing::debug!("hit delivered: {url}");
                complete(&completions, hit.signal_id, reply.body);
                remove_row(&store, row);
            }
            Some(status) if policy.recoverable_statuses.contains(&status) => {
                tracing::debug!("hit got recoverable status {status}, retrying: {url}");
                tokio::time::sleep(policy.interval).await;
            }
            None if reply.recoverable_error => {
                tracing::debug!("recoverable transport failure, retrying: {url}");
                tokio::time::sleep(policy.interval).await;
            }
            other => {
                tracing::warn!("hit dropped after terminal failure (status {other:?}): {url}");
                complete(&completions, hit.signal_id, reply.body);
                remove_row(&store, row);
            }
        }
    }
}

fn complete(completions: &mpsc::UnboundedSender<HitCompletion>, signal_id: u64, body: Vec<u8>) {
    if completions
        .send(HitCompletion { signal_id, body })
        .is_err()
    {
        tracing::debug!("completion receiver gone, discarding hit outcome");
    }
}

fn remove_row(store: &Arc<dyn HitStore>, row: i64) {
    if let Err(e) = store.remove(row) {
        tracing::warn!("hit row removal failed: {e}");
    }
}
