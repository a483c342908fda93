//! Cache backend trait and usage statistics.

use async_trait::async_trait;
use futureself_core::CacheError;
use std::time::Duration;

/// Raw string store behind [`crate::CacheClient`].
///
/// Backends report every failure as a [`CacheError`]; deciding what a
/// failure means for the caller is the client's job. Values are opaque
/// strings (JSON for cached data, the raw token for locks).
///
/// # Atomicity
///
/// `set_if_absent`, `compare_and_delete` and `compare_and_expire` must each
/// be a single atomic operation on the store. A read followed by a separate
/// write would let a lock release race a new holder's acquisition.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name used in logs and health reports.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write `value`, replacing any existing entry. `None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Create the entry only if the key is absent. Returns true if created.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Returns true if an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete the entry only if its value equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError>;

    /// Reset the entry's TTL only if its value equals `expected`.
    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// All keys matching a glob pattern in one call.
    ///
    /// Blocks the store while it walks the keyspace. Only for small,
    /// bounded keyspaces; use [`CacheBackend::scan`] otherwise.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// One page of a cursor-based key scan.
    ///
    /// Start with cursor 0. Returns the next cursor and the page; a returned
    /// cursor of 0 means the scan is complete. Pages may be empty.
    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Statistics about cache client usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Number of writes (including detached ones) the backend accepted
    pub writes: u64,
    /// Number of operations that failed and were degraded
    pub errors: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
