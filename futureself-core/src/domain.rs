//! Simulation and letter data types

use crate::{LetterId, SubjectId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SIMULATION (derived data)
// ============================================================================

/// Percentile summary of one projected net-worth path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPath {
    pub p10: f64,
    pub median: f64,
    pub p90: f64,
}

/// Dual-path Monte Carlo projection for a subject.
///
/// Produced by an external simulation engine; this crate treats the numbers
/// as opaque and only caches and forwards them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub subject_id: SubjectId,
    pub horizon_years: u32,
    /// Projection if current habits continue
    pub current_path: ProjectionPath,
    /// Projection if the subject follows their goals
    pub improved_path: ProjectionPath,
    pub computed_at: Timestamp,
}

impl Simulation {
    /// Median gap between the improved and current paths.
    pub fn median_gap(&self) -> f64 {
        self.improved_path.median - self.current_path.median
    }
}

// ============================================================================
// VARIANT
// ============================================================================

/// Experiment arm selecting the letter mode.
///
/// Variants partition both the letter cache and idempotency namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variant(String);

impl Variant {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// LETTER (expensive artifact)
// ============================================================================

/// What caused a letter to be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterTrigger {
    /// Weekly batch run
    Scheduled,
    /// Retry queue reprocessing
    Retry,
    /// User opened the letter view
    OnDemand,
    /// Operator-triggered run
    Manual,
}

impl LetterTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            LetterTrigger::Scheduled => "scheduled",
            LetterTrigger::Retry => "retry",
            LetterTrigger::OnDemand => "on_demand",
            LetterTrigger::Manual => "manual",
        }
    }
}

/// Token accounting reported by the generation backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Everything a letter generator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterRequest {
    pub subject_id: SubjectId,
    pub variant: Variant,
    pub simulation: Simulation,
}

/// Raw output of the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedLetter {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Letter ready to be written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLetter {
    pub subject_id: SubjectId,
    pub variant: Variant,
    pub trigger: LetterTrigger,
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub simulation: Simulation,
    pub created_at: Timestamp,
}

/// Persisted letter as returned to callers and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    pub id: LetterId,
    pub subject_id: SubjectId,
    pub variant: Variant,
    pub trigger: LetterTrigger,
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub simulation: Simulation,
    pub created_at: Timestamp,
}

impl Letter {
    /// Attach the permanent ID assigned by storage.
    pub fn from_persisted(id: LetterId, letter: NewLetter) -> Self {
        Self {
            id,
            subject_id: letter.subject_id,
            variant: letter.variant,
            trigger: letter.trigger,
            content: letter.content,
            usage: letter.usage,
            model: letter.model,
            simulation: letter.simulation,
            created_at: letter.created_at,
        }
    }
}

/// Outcome of a content safety check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub passed: bool,
    pub flags: Vec<String>,
}

impl ModerationVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            flags: Vec::new(),
        }
    }

    pub fn flagged(flags: Vec<String>) -> Self {
        Self {
            passed: false,
            flags,
        }
    }
}
