//! Degrading cache client.
//!
//! Every operation swallows backend errors, logs them and returns the
//! "no cache" answer: `None`, `false` or an empty list. The single exception
//! is [`CacheClient::acquire_lock`], which returns `true` when the store is
//! unreachable so that protected work keeps running during a cache outage.
//! Mutual exclusion is lost for the duration of the outage; failing closed
//! would instead halt every job until the store recovers.

use crate::redis_backend::RedisBackend;
use crate::traits::{CacheBackend, CacheStats};
use futureself_core::{CacheConfig, CacheError, HealthCheck, LockToken};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

const DEFAULT_SCAN_PAGE_SIZE: usize = 100;

/// Result of a create-if-absent attempt that keeps backend failure visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller created the entry
    Created,
    /// Another caller already holds the key
    Exists,
    /// The store could not be reached
    Unavailable,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct DetachedWrites {
    pending: AtomicUsize,
    idle: Notify,
}

/// Decrements the pending count when a detached write finishes or is dropped.
struct PendingGuard(Arc<DetachedWrites>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Key-value cache client shared by the letter service and the jobs.
///
/// Cloning is cheap; clones share the backend, counters and the detached
/// write tracker.
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    counters: Arc<Counters>,
    detached: Arc<DetachedWrites>,
    scan_page_size: usize,
}

impl CacheClient {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            counters: Arc::new(Counters::default()),
            detached: Arc::new(DetachedWrites::default()),
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    /// Client over a pooled Redis connection.
    pub fn redis(config: &CacheConfig) -> Result<Self, CacheError> {
        Ok(Self::new(Arc::new(RedisBackend::connect(config)?)))
    }

    pub fn with_scan_page_size(mut self, page_size: usize) -> Self {
        self.scan_page_size = page_size.max(1);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn degraded(&self, op: &'static str, key: &str, error: &CacheError) {
        Counters::bump(&self.counters.errors);
        tracing::warn!(
            backend = self.backend.name(),
            op,
            key,
            error = %error,
            "Cache operation failed, degrading"
        );
    }

    fn encode<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<String> {
        match serde_json::to_string(value) {
            Ok(raw) => Some(raw),
            Err(e) => {
                let error = CacheError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                self.degraded("encode", key, &error);
                None
            }
        }
    }

    // ========================================================================
    // VALUES
    // ========================================================================

    /// Cached value, or `None` on miss, backend error or undecodable entry.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    Counters::bump(&self.counters.hits);
                    tracing::debug!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    let error = CacheError::Serialization {
                        key: key.to_string(),
                        reason: e.to_string(),
                    };
                    self.degraded("get", key, &error);
                    None
                }
            },
            Ok(None) => {
                Counters::bump(&self.counters.misses);
                tracing::debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                self.degraded("get", key, &e);
                None
            }
        }
    }

    /// Write a value. `None` TTL means no expiry. Returns false on failure.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let Some(raw) = self.encode(key, value) else {
            return false;
        };
        match self.backend.set(key, &raw, ttl).await {
            Ok(()) => {
                Counters::bump(&self.counters.writes);
                true
            }
            Err(e) => {
                self.degraded("set", key, &e);
                false
            }
        }
    }

    /// Atomic create-if-absent. The TTL is mandatory so markers never orphan.
    pub async fn set_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> bool {
        self.claim(key, value, ttl).await == ClaimOutcome::Created
    }

    /// Same as [`CacheClient::set_if_absent`] but distinguishes "someone
    /// else holds it" from "the store is down".
    pub async fn claim<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> ClaimOutcome {
        let Some(raw) = self.encode(key, value) else {
            return ClaimOutcome::Unavailable;
        };
        match self.backend.set_if_absent(key, &raw, ttl).await {
            Ok(true) => {
                Counters::bump(&self.counters.writes);
                ClaimOutcome::Created
            }
            Ok(false) => ClaimOutcome::Exists,
            Err(e) => {
                self.degraded("set_if_absent", key, &e);
                ClaimOutcome::Unavailable
            }
        }
    }

    /// Returns true if an entry was removed.
    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.degraded("delete", key, &e);
                false
            }
        }
    }

    // ========================================================================
    // LOCKS
    // ========================================================================

    /// Acquire a lock with a millisecond-precision TTL.
    ///
    /// Returns true when the store is unreachable.
    pub async fn acquire_lock(&self, key: &str, ttl: Duration, token: &LockToken) -> bool {
        match self.backend.set_if_absent(key, token.as_str(), ttl).await {
            Ok(acquired) => {
                tracing::debug!(key, acquired, ttl_ms = ttl.as_millis() as u64, "Lock acquire");
                acquired
            }
            Err(e) => {
                self.degraded("acquire_lock", key, &e);
                tracing::warn!(key, "Cache unavailable, proceeding without lock");
                true
            }
        }
    }

    /// Release the lock only if it is still held with `token`.
    pub async fn release_lock(&self, key: &str, token: &LockToken) -> bool {
        match self.backend.compare_and_delete(key, token.as_str()).await {
            Ok(released) => {
                if !released {
                    tracing::debug!(key, "Lock not released, held by another token or expired");
                }
                released
            }
            Err(e) => {
                self.degraded("release_lock", key, &e);
                false
            }
        }
    }

    /// Reset the lock TTL only if it is still held with `token`.
    pub async fn extend_lock(&self, key: &str, token: &LockToken, ttl: Duration) -> bool {
        match self
            .backend
            .compare_and_expire(key, token.as_str(), ttl)
            .await
        {
            Ok(extended) => extended,
            Err(e) => {
                self.degraded("extend_lock", key, &e);
                false
            }
        }
    }

    // ========================================================================
    // ENUMERATION
    // ========================================================================

    /// Keys matching a glob in one blocking call.
    ///
    /// Only for small, bounded keyspaces. Use [`CacheClient::scan`] for
    /// anything that grows with the number of subjects.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        match self.backend.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.degraded("keys", pattern, &e);
                Vec::new()
            }
        }
    }

    /// Keys matching a glob, collected with a cursor scan.
    ///
    /// A failure mid-scan returns the keys collected so far.
    pub async fn scan(&self, pattern: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            match self.backend.scan(pattern, cursor, self.scan_page_size).await {
                Ok((next, page)) => {
                    // SCAN may return a key more than once.
                    for key in page {
                        if seen.insert(key.clone()) {
                            keys.push(key);
                        }
                    }
                    if next == 0 {
                        return keys;
                    }
                    cursor = next;
                }
                Err(e) => {
                    self.degraded("scan", pattern, &e);
                    return keys;
                }
            }
        }
    }

    // ========================================================================
    // DETACHED WRITES
    // ========================================================================

    /// Write in the background and return immediately.
    ///
    /// Failures are logged and counted, never reported to the caller.
    pub fn set_detached<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let Some(raw) = self.encode(key, value) else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let owned_key = key.to_string();
        self.spawn_detached("set", key, async move {
            backend.set(&owned_key, &raw, ttl).await
        });
    }

    /// Delete in the background and return immediately.
    pub fn delete_detached(&self, key: &str) {
        let backend = Arc::clone(&self.backend);
        let owned_key = key.to_string();
        self.spawn_detached("delete", key, async move {
            backend.delete(&owned_key).await.map(|_| ())
        });
    }

    /// Delete in the background, only if the entry still holds `expected`.
    pub fn delete_if_equal_detached<T: Serialize + ?Sized>(&self, key: &str, expected: &T) {
        let Some(raw) = self.encode(key, expected) else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let owned_key = key.to_string();
        self.spawn_detached("compare_and_delete", key, async move {
            backend.compare_and_delete(&owned_key, &raw).await.map(|_| ())
        });
    }

    fn spawn_detached<F>(&self, op: &'static str, key: &str, write: F)
    where
        F: Future<Output = Result<(), CacheError>> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(op, key, "No async runtime, dropping detached cache write");
            return;
        };

        self.detached.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(Arc::clone(&self.detached));
        let counters = Arc::clone(&self.counters);
        let backend_name = self.backend.name();
        let key = key.to_string();

        runtime.spawn(async move {
            let _guard = guard;
            match write.await {
                Ok(()) => Counters::bump(&counters.writes),
                Err(e) => {
                    Counters::bump(&counters.errors);
                    tracing::warn!(
                        backend = backend_name,
                        op,
                        key = %key,
                        error = %e,
                        "Detached cache write failed"
                    );
                }
            }
        });
    }

    /// Number of detached writes still in flight.
    pub fn pending_detached(&self) -> usize {
        self.detached.pending.load(Ordering::SeqCst)
    }

    /// Wait until every detached write issued so far has finished.
    pub async fn flush_detached(&self) {
        loop {
            // Registered before the check so a concurrent finish is not missed.
            let idle = self.detached.idle.notified();
            if self.detached.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    // ========================================================================
    // OBSERVABILITY
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Probe the store with a ping.
    pub async fn health(&self) -> HealthCheck {
        let component = format!("cache:{}", self.backend.name());
        let started = Instant::now();
        match self.backend.ping().await {
            Ok(()) => HealthCheck::healthy(component)
                .with_response_time(started.elapsed().as_millis() as i64),
            Err(e) => HealthCheck::unhealthy(component, e.to_string())
                .with_response_time(started.elapsed().as_millis() as i64),
        }
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.backend.name())
            .field("stats", &self.stats())
            .field("pending_detached", &self.pending_detached())
            .finish()
    }
}
