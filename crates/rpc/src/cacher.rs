// Path: crates/rpc/src/cacher.rs
//! The per-method TTL response cache with single-flight dispatch.
//!
//! Responses are cached by `(method, canonical-params, peer-id)`. A miss
//! installs a single-flight slot so concurrent duplicates share one
//! upstream request; a timed-out waiter abandons the slot without tearing
//! it down for its siblings. `ren_submitTx` and `ren_queryTx` are never
//! cached (they have their own flows) but still ride the bounded
//! dispatch pool, which refuses with back pressure rather than blocking.

use crate::jsonrpc::{canonical_json_bytes, methods};
use dashmap::DashMap;
use lightnode_api::darknode::{DarknodeCaller, DarknodeError};
use lightnode_types::hash::sha256;
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Notify};

/// Queue capacity of the outbound dispatch pool.
const DISPATCH_QUEUE: usize = 128;
/// Concurrent upstream calls.
const DISPATCH_WORKERS: usize = 8;

struct Job {
    method: String,
    params: Json,
    respond: oneshot::Sender<Result<Json, DarknodeError>>,
}

struct CacheEntry {
    response: Json,
    expires: Instant,
}

/// Removes the in-flight slot and wakes the waiters even when the leader
/// is cancelled mid-dispatch.
struct InflightGuard {
    map: Arc<DashMap<[u8; 32], Arc<Notify>>>,
    key: [u8; 32],
    notify: Arc<Notify>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.map.remove(&self.key);
        self.notify.notify_waiters();
    }
}

/// The response cacher and dispatch pool.
pub struct Cacher {
    queue: mpsc::Sender<Job>,
    entries: DashMap<[u8; 32], CacheEntry>,
    inflight: Arc<DashMap<[u8; 32], Arc<Notify>>>,
    ttl: Duration,
}

impl Cacher {
    /// Builds a cacher over the Darknode dispatcher, spawning the worker
    /// pool.
    pub fn new(darknode: Arc<dyn DarknodeCaller>, ttl: Duration) -> Arc<Self> {
        let (queue, rx) = mpsc::channel::<Job>(DISPATCH_QUEUE);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for _ in 0..DISPATCH_WORKERS {
            let rx = rx.clone();
            let darknode = darknode.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    let result = darknode.call(&job.method, job.params).await;
                    // The caller may have timed out and dropped the
                    // receiver; that is not our problem.
                    let _ = job.respond.send(result);
                }
            });
        }
        Arc::new(Self { queue, entries: DashMap::new(), inflight: Arc::new(DashMap::new()), ttl })
    }

    fn cache_key(method: &str, params: &Json, peer: &str) -> [u8; 32] {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(method.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&canonical_json_bytes(params));
        buf.push(0);
        buf.extend_from_slice(peer.as_bytes());
        sha256(&buf)
    }

    /// Sends one request into the bounded dispatch pool. A full queue is a
    /// back-pressure error, never a block.
    pub async fn dispatch(&self, method: &str, params: Json) -> Result<Json, DarknodeError> {
        let (respond, rx) = oneshot::channel();
        self.queue
            .try_send(Job { method: method.to_string(), params, respond })
            .map_err(|_| DarknodeError::BackPressure)?;
        rx.await
            .map_err(|_| DarknodeError::Transport("dispatch worker dropped the request".into()))?
    }

    /// Resolves a call through the cache. The peer id participates in the
    /// key so responses pinned to one Darknode are not served to another.
    pub async fn call(
        &self,
        method: &str,
        params: Json,
        peer: &str,
    ) -> Result<Json, DarknodeError> {
        if method == methods::SUBMIT_TX || method == methods::QUERY_TX {
            return self.dispatch(method, params).await;
        }
        let key = Self::cache_key(method, &params, peer);
        let guard = loop {
            if let Some(entry) = self.entries.get(&key) {
                if entry.expires > Instant::now() {
                    return Ok(entry.response.clone());
                }
                drop(entry);
                self.entries.remove(&key);
            }
            let waiter = match self.inflight.entry(key) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    let notify = Arc::new(Notify::new());
                    slot.insert(notify.clone());
                    break InflightGuard { map: self.inflight.clone(), key, notify };
                }
                dashmap::mapref::entry::Entry::Occupied(slot) => slot.get().clone(),
            };
            // The leader may finish between the slot lookup and this await
            // and its wake-up would be lost, so the wait is bounded; the
            // loop re-checks the cache either way.
            let _ = tokio::time::timeout(Duration::from_millis(100), waiter.notified()).await;
        };

        let result = self.dispatch(method, params).await;
        if let Ok(response) = &result {
            self.entries.insert(
                key,
                CacheEntry { response: response.clone(), expires: Instant::now() + self.ttl },
            );
        }
        drop(guard);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCaller {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl DarknodeCaller for CountingCaller {
        async fn call(&self, method: &str, _params: Json) -> Result<Json, DarknodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(json!({ "method": method }))
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_upstream() {
        let upstream =
            Arc::new(CountingCaller { calls: AtomicUsize::new(0), delay: Duration::ZERO });
        let cacher = Cacher::new(upstream.clone(), Duration::from_secs(60));
        let params = json!({ "blockHeight": 7 });
        cacher.call("ren_queryBlock", params.clone(), "").await.unwrap();
        cacher.call("ren_queryBlock", params.clone(), "").await.unwrap();
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        // A different peer id is a different key.
        cacher.call("ren_queryBlock", params, "peer-a").await.unwrap();
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_duplicates_share_one_flight() {
        let upstream = Arc::new(CountingCaller {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let cacher = Cacher::new(upstream.clone(), Duration::from_secs(60));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cacher = cacher.clone();
            handles.push(tokio::spawn(async move {
                cacher.call("ren_queryState", json!({}), "").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_and_query_tx_are_never_cached() {
        let upstream =
            Arc::new(CountingCaller { calls: AtomicUsize::new(0), delay: Duration::ZERO });
        let cacher = Cacher::new(upstream.clone(), Duration::from_secs(60));
        for _ in 0..3 {
            cacher.call("ren_queryTx", json!({ "txHash": "abc" }), "").await.unwrap();
        }
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn saturated_queue_reports_back_pressure() {
        // One slow upstream call per worker plus a full queue; the next
        // dispatch must refuse immediately.
        let upstream = Arc::new(CountingCaller {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(30),
        });
        let cacher = Cacher::new(upstream, Duration::from_secs(60));
        let mut held = Vec::new();
        for i in 0..(2 * (DISPATCH_QUEUE + DISPATCH_WORKERS)) {
            let cacher = cacher.clone();
            held.push(tokio::spawn(async move {
                let _ = cacher.dispatch("ren_queryBlock", json!({ "i": i })).await;
            }));
        }
        // Let the workers drain the queue heads into their slow calls.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let err = cacher.dispatch("ren_queryBlock", json!({ "i": "overflow" })).await.unwrap_err();
        assert!(err.to_string().contains("too much back pressure"));
        for handle in held {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn expired_entries_refresh() {
        let upstream =
            Arc::new(CountingCaller { calls: AtomicUsize::new(0), delay: Duration::ZERO });
        let cacher = Cacher::new(upstream.clone(), Duration::from_millis(1));
        cacher.call("ren_queryConfig", json!({}), "").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cacher.call("ren_queryConfig", json!({}), "").await.unwrap();
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    }
}
