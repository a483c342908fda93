//! Retry queue of subjects whose batch generation failed.
//!
//! One entry per subject under `{retry_ns}:{subject}`. Each failure bumps the
//! attempt count and pushes the next retry out along the backoff ladder; the
//! attempt that reaches the cap deletes the entry instead. Entries also carry
//! an absolute lifetime measured from the first failure.

use chrono::Duration as ChronoDuration;
use futureself_cache::{CacheClient, CacheKeys};
use futureself_core::{LetterError, RetryPolicy, SubjectId, Timestamp};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure history of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryEntry {
    pub subject_id: SubjectId,
    /// Failed attempts so far, including the original batch attempt
    pub attempt_count: u32,
    pub first_failed_at: Timestamp,
    pub last_attempt_at: Timestamp,
    pub next_retry_at: Timestamp,
    pub last_error: String,
}

impl RetryEntry {
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next_retry_at <= now
    }
}

/// Result of recording a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The entry was written and will be retried at `next_retry_at`.
    Scheduled(RetryEntry),
    /// The attempt cap was reached; the entry was deleted.
    Exhausted { attempts: u32 },
    /// The entry outlived its absolute lifetime; the entry was deleted.
    Expired { attempts: u32 },
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::days(365))
}

/// Cache-backed retry queue.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    cache: CacheClient,
    keys: CacheKeys,
    policy: RetryPolicy,
}

impl RetryQueue {
    pub fn new(cache: CacheClient, keys: CacheKeys, policy: RetryPolicy) -> Self {
        Self {
            cache,
            keys,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get(&self, subject_id: SubjectId) -> Option<RetryEntry> {
        self.cache.get(&self.keys.retry(subject_id)).await
    }

    /// Record a failed attempt for `subject_id` at `now`.
    pub async fn record_failure(
        &self,
        subject_id: SubjectId,
        error: &LetterError,
        now: Timestamp,
    ) -> RetryOutcome {
        let key = self.keys.retry(subject_id);
        let previous: Option<RetryEntry> = self.cache.get(&key).await;
        let attempt_count = previous
            .as_ref()
            .map_or(1, |entry| entry.attempt_count.saturating_add(1));
        let first_failed_at = previous.map_or(now, |entry| entry.first_failed_at);

        if attempt_count >= self.policy.max_attempts {
            self.cache.delete(&key).await;
            tracing::error!(
                subject_id = %subject_id,
                attempts = attempt_count,
                error = %error,
                "Max retries exhausted, dropping subject from retry queue"
            );
            return RetryOutcome::Exhausted {
                attempts: attempt_count,
            };
        }

        let age = (now - first_failed_at).to_std().unwrap_or(Duration::ZERO);
        let Some(remaining) = self.policy.entry_ttl.checked_sub(age).filter(|d| !d.is_zero())
        else {
            self.cache.delete(&key).await;
            tracing::warn!(
                subject_id = %subject_id,
                attempts = attempt_count,
                "Retry entry outlived its lifetime, dropping"
            );
            return RetryOutcome::Expired {
                attempts: attempt_count,
            };
        };

        let entry = RetryEntry {
            subject_id,
            attempt_count,
            first_failed_at,
            last_attempt_at: now,
            next_retry_at: now + to_chrono(self.policy.backoff_for(attempt_count)),
            last_error: error.to_string(),
        };
        if !self.cache.set(&key, &entry, Some(remaining)).await {
            tracing::warn!(subject_id = %subject_id, "Retry entry not persisted");
        }
        tracing::info!(
            subject_id = %subject_id,
            attempts = attempt_count,
            next_retry_at = %entry.next_retry_at,
            "Subject queued for retry"
        );
        RetryOutcome::Scheduled(entry)
    }

    /// Remove a subject's failure history. True when an entry existed.
    pub async fn clear(&self, subject_id: SubjectId) -> bool {
        self.cache.delete(&self.keys.retry(subject_id)).await
    }

    /// Every entry currently in the queue.
    pub async fn entries(&self) -> Vec<RetryEntry> {
        let keys = self.cache.scan(&self.keys.retry_pattern()).await;
        join_all(keys.iter().map(|key| self.cache.get::<RetryEntry>(key)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Entries due at `now` that still have attempts left, oldest due first.
    pub async fn due(&self, now: Timestamp) -> Vec<RetryEntry> {
        let mut due: Vec<RetryEntry> = self
            .entries()
            .await
            .into_iter()
            .filter(|entry| entry.is_due(now) && entry.attempt_count < self.policy.max_attempts)
            .collect();
        due.sort_by_key(|entry| entry.next_retry_at);
        due
    }
}
