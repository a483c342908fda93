//! Cluster-wide job lock with a keep-alive timer.

use futureself_cache::CacheClient;
use futureself_core::LockToken;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A held job lock.
///
/// Dropping the guard stops the keep-alive timer but does not release the
/// lock; call [`JobLock::release`] on every exit path.
pub(crate) struct JobLock {
    cache: CacheClient,
    key: String,
    token: LockToken,
    ttl: Duration,
    keep_alive: Option<JoinHandle<()>>,
}

impl JobLock {
    /// Try to take `key` with a fresh token. `None` means another holder
    /// owns it.
    pub(crate) async fn acquire(cache: &CacheClient, key: String, ttl: Duration) -> Option<Self> {
        let token = LockToken::generate();
        if !cache.acquire_lock(&key, ttl, &token).await {
            return None;
        }
        Some(Self {
            cache: cache.clone(),
            key,
            token,
            ttl,
            keep_alive: None,
        })
    }

    /// Extend the lock back to its full TTL every `every` until released.
    pub(crate) fn keep_alive(&mut self, every: Duration) {
        let cache = self.cache.clone();
        let key = self.key.clone();
        let token = self.token.clone();
        let ttl = self.ttl;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if cache.extend_lock(&key, &token, ttl).await {
                    tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Job lock extended");
                } else {
                    tracing::warn!(key = %key, "Job lock extension failed");
                }
            }
        });
        if let Some(previous) = self.keep_alive.replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Stop the keep-alive timer and release the lock if still ours.
    pub(crate) async fn release(mut self) -> bool {
        self.stop_keep_alive();
        let released = self.cache.release_lock(&self.key, &self.token).await;
        tracing::debug!(key = %self.key, released, "Job lock released");
        released
    }

    fn stop_keep_alive(&mut self) {
        if let Some(handle) = self.keep_alive.take() {
            handle.abort();
        }
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        self.stop_keep_alive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futureself_cache::{CacheBackend, InMemoryBackend};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_outlives_ttl() {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = CacheClient::new(backend.clone());
        let ttl = Duration::from_secs(60);

        let mut lock = JobLock::acquire(&cache, "futureself:cron:test".to_string(), ttl)
            .await
            .unwrap();
        lock.keep_alive(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert!(backend.get("futureself:cron:test").await.unwrap().is_some());
        assert!(
            JobLock::acquire(&cache, "futureself:cron:test".to_string(), ttl)
                .await
                .is_none()
        );

        assert!(lock.release().await);
        assert!(backend.get("futureself:cron:test").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_guard_lets_lock_expire() {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = CacheClient::new(backend.clone());
        let ttl = Duration::from_secs(60);

        {
            let mut lock = JobLock::acquire(&cache, "futureself:cron:drop".to_string(), ttl)
                .await
                .unwrap();
            lock.keep_alive(Duration::from_secs(10));
        }

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(backend.get("futureself:cron:drop").await.unwrap().is_none());
    }
}
