//! Error types for Future Self operations

use crate::SubjectId;
use thiserror::Error;

/// Reasons a letter generation attempt failed.
///
/// These are transient or content-level failures. They are retried only by
/// the batch and retry-queue jobs, never by a synchronous request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("Provider {provider} failed: {message}")]
    Backend { provider: String, message: String },

    #[error("Moderation rejected content: {flags:?}")]
    ModerationRejected { flags: Vec<String> },

    #[error("Safety check rejected content: {reason}")]
    SafetyRejected { reason: String },

    #[error("Provider returned empty content")]
    EmptyContent,
}

/// Infrastructure errors raised by cache backends.
///
/// `CacheClient` logs and swallows these; they never reach service callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for letter and simulation operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LetterError {
    #[error("Subject not found: {subject_id}")]
    SubjectNotFound { subject_id: SubjectId },

    #[error("Insufficient data for subject {subject_id}: {reason}")]
    InsufficientData { subject_id: SubjectId, reason: String },

    #[error("Letter generation failed: {0}")]
    Generation(#[from] GenerationFailure),

    #[error("Persistence failed: {reason}")]
    Persistence { reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl LetterError {
    /// Whether the end user can fix this (missing profile, not enough data).
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            LetterError::SubjectNotFound { .. } | LetterError::InsufficientData { .. }
        )
    }

    /// Fold any failure into the generation-failure kind.
    ///
    /// User-correctable errors and already-wrapped generation failures pass
    /// through unchanged.
    pub fn into_generation_failure(self, provider: &str) -> LetterError {
        match self {
            e @ (LetterError::SubjectNotFound { .. }
            | LetterError::InsufficientData { .. }
            | LetterError::Generation(_)) => e,
            other => LetterError::Generation(GenerationFailure::Backend {
                provider: provider.to_string(),
                message: other.to_string(),
            }),
        }
    }
}

/// Result type alias for letter operations.
pub type LetterResult<T> = Result<T, LetterError>;
