//! Idempotency marker and the bounded wait for another caller's result.

use futureself_cache::CacheClient;
use futureself_core::{
    IdempotencyConfig, LetterTrigger, LockToken, SubjectId, Timestamp, Variant,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Value stored under the idempotency key while a letter is generated.
///
/// The token makes each claim distinct, so a holder that outlives the
/// marker TTL cannot remove a later caller's marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyMarker {
    pub token: LockToken,
    pub subject_id: SubjectId,
    pub variant: Variant,
    pub trigger: LetterTrigger,
    pub started_at: Timestamp,
}

/// Poll `key` until a value appears or `config.max_wait` elapses.
///
/// Delays start at `poll_initial`, grow by `poll_multiplier` and are capped
/// at `poll_max`. The last sleep is shortened so the total never exceeds
/// `max_wait`. Only the calling task is suspended.
pub async fn wait_for_result<T: DeserializeOwned>(
    cache: &CacheClient,
    key: &str,
    config: &IdempotencyConfig,
) -> Option<T> {
    let deadline = Instant::now() + config.max_wait;
    let mut delay = config.poll_initial;
    let mut polls = 0u32;

    loop {
        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(key, polls, "Idempotency wait timed out");
            return None;
        }
        tokio::time::sleep(delay.min(deadline - now)).await;
        polls += 1;

        if let Some(value) = cache.get(key).await {
            tracing::debug!(key, polls, "Result appeared while waiting");
            return Some(value);
        }
        delay = config.next_poll_delay(delay);
    }
}
