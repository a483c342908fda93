//! In-process cache backend.
//!
//! Entries expire on the tokio clock, so paused-time tests can advance past
//! TTLs deterministically. An outage switch makes every call fail with
//! [`CacheError::Unavailable`].

use crate::traits::CacheBackend;
use async_trait::async_trait;
use futureself_core::CacheError;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Translate a Redis-style glob (`*`, `?`) into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| CacheError::Backend {
        reason: format!("invalid key pattern {pattern}: {e}"),
    })
}

/// HashMap-style backend for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: Mutex<BTreeMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining TTL of a live entry, `None` if absent or without expiry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                reason: "in-memory backend switched off".to_string(),
            });
        }
        Ok(())
    }

    fn deadline(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }

    /// Drop expired entries; called on every write so unread keys do not pile up.
    fn prune(entries: &mut BTreeMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| entry.is_live(now));
    }

    fn matching_keys(
        entries: &BTreeMap<String, Entry>,
        pattern: &Regex,
        now: Instant,
    ) -> Vec<String> {
        entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && pattern.is_match(key))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.check_available()?;
        let entry = Entry {
            value: value.to_string(),
            expires_at: Self::deadline(ttl),
        };
        let mut entries = self.entries.lock().await;
        Self::prune(&mut entries, Instant::now());
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Self::prune(&mut entries, now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        let removed = self.entries.lock().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let owned = entries
            .get(key)
            .is_some_and(|e| e.is_live(now) && e.value == expected);
        if owned {
            entries.remove(key);
        }
        Ok(owned)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.value == expected => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.check_available()?;
        let regex = glob_to_regex(pattern)?;
        let entries = self.entries.lock().await;
        Ok(Self::matching_keys(&entries, &regex, Instant::now()))
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        self.check_available()?;
        let regex = glob_to_regex(pattern)?;
        let entries = self.entries.lock().await;
        let matching = Self::matching_keys(&entries, &regex, Instant::now());

        // Cursor is an offset into the sorted match list.
        let start = (cursor as usize).min(matching.len());
        let end = start.saturating_add(count.max(1)).min(matching.len());
        let next = if end >= matching.len() { 0 } else { end as u64 };
        Ok((next, matching[start..end].to_vec()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_on_tokio_clock() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_succeeds_after_expiry() {
        let backend = InMemoryBackend::new();
        let ttl = Duration::from_secs(5);
        assert!(backend.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!backend.set_if_absent("lock", "b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(backend.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(backend.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_prune_unread_expired_entries() {
        let backend = InMemoryBackend::new();
        for i in 0..5 {
            backend
                .set_if_absent(&format!("idem:{i}"), "m", Duration::from_secs(30))
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        backend.set("sim:1", "{}", None).await.unwrap();
        assert_eq!(backend.entries.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_delete_requires_matching_value() {
        let backend = InMemoryBackend::new();
        backend
            .set_if_absent("lock", "owner", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!backend.compare_and_delete("lock", "other").await.unwrap());
        assert!(backend.compare_and_delete("lock", "owner").await.unwrap());
        assert_eq!(backend.get("lock").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_expire_resets_ttl() {
        let backend = InMemoryBackend::new();
        backend
            .set_if_absent("lock", "owner", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(backend
            .compare_and_expire("lock", "owner", Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(backend.ttl("lock").await, Some(Duration::from_secs(10)));
        assert!(!backend
            .compare_and_expire("lock", "intruder", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_scan_pages_through_matches() {
        let backend = InMemoryBackend::new();
        for i in 0..7 {
            backend.set(&format!("retry:{i}"), "{}", None).await.unwrap();
        }
        backend.set("other:1", "{}", None).await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, page) = backend.scan("retry:*", cursor, 3).await.unwrap();
            assert!(page.len() <= 3);
            seen.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 7);
        assert!(seen.iter().all(|k| k.starts_with("retry:")));
    }

    #[tokio::test]
    async fn test_outage_switch_fails_every_call() {
        let backend = InMemoryBackend::new();
        backend.set_available(false);
        assert!(matches!(
            backend.get("k").await,
            Err(CacheError::Unavailable { .. })
        ));
        assert!(backend.ping().await.is_err());
        backend.set_available(true);
        assert!(backend.ping().await.is_ok());
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let regex = glob_to_regex("ns.a:*").unwrap();
        assert!(regex.is_match("ns.a:123"));
        assert!(!regex.is_match("nsXa:123"));
    }

    proptest! {
        #[test]
        fn prop_star_glob_matches_any_suffix(prefix in "[a-z:]{1,12}", suffix in "[a-z0-9-]{0,24}") {
            let regex = glob_to_regex(&format!("{prefix}*")).unwrap();
            let key = format!("{}{}", prefix, suffix);
            prop_assert!(regex.is_match(&key));
        }
    }
}
