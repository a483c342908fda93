//! Future Self LLM - Generation Collaborators
//!
//! Interfaces for the slow, costly collaborators the letter service drives:
//! the simulation engine, the letter generator, content moderation and
//! experiment variant assignment. Implementations never retry internally;
//! retrying is the job scheduler's responsibility.

use async_trait::async_trait;
use futureself_core::{
    GeneratedLetter, LetterRequest, LetterResult, ModerationVerdict, Simulation, SubjectId,
    Variant,
};

pub mod experiment;
pub mod moderation;
pub mod providers;

pub use experiment::HashSplitSelector;
pub use moderation::KeywordModeration;
pub use providers::anthropic::{AnthropicClient, AnthropicConfig, AnthropicLetterGenerator};

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Produces the dual-path projection for a subject.
///
/// May fail with `SubjectNotFound` or `InsufficientData`.
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    async fn simulate(&self, subject_id: SubjectId) -> LetterResult<Simulation>;
}

/// Writes the letter text for a subject and variant.
#[async_trait]
pub trait LetterGenerator: Send + Sync {
    /// Provider name used in generation-failure reports.
    fn provider_name(&self) -> &str;

    async fn generate(&self, request: &LetterRequest) -> LetterResult<GeneratedLetter>;
}

/// Synchronous content safety check.
pub trait ModerationFilter: Send + Sync {
    fn moderate(&self, content: &str) -> ModerationVerdict;
}

/// Best-effort experiment arm assignment.
///
/// `Ok(None)` and `Err(_)` both make the caller fall back to its default.
#[async_trait]
pub trait VariantSelector: Send + Sync {
    async fn select_variant(
        &self,
        experiment: &str,
        subject_id: SubjectId,
    ) -> LetterResult<Option<Variant>>;
}
