//! Durable letter storage seam.

use async_trait::async_trait;
use futureself_core::{LetterId, LetterResult, NewLetter};

/// Durable storage for generated letters.
///
/// The service calls `persist` once per generation. Under the idempotency
/// wait timeout two callers may both generate, so implementations must
/// accept more than one letter for the same subject, variant and window.
#[async_trait]
pub trait LetterRepository: Send + Sync {
    /// Store the letter and return its permanent ID.
    async fn persist(&self, letter: &NewLetter) -> LetterResult<LetterId>;
}
