//! Job model: run state machine, run reports and the job traits.

use async_trait::async_trait;
use futureself_core::{LetterResult, LetterTrigger, SubjectId, Timestamp};
use serde::Serialize;
use std::time::Duration;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    /// Trigger recorded on letters produced by a batch run.
    pub fn letter_trigger(self) -> LetterTrigger {
        match self {
            RunTrigger::Scheduled => LetterTrigger::Scheduled,
            RunTrigger::Manual => LetterTrigger::Manual,
        }
    }
}

/// Phase of a single run.
///
/// `Idle → LockAcquire → (Skipped | Running) → (Completed | Failed) → Idle`.
/// A run whose subject query fails goes from `LockAcquire` straight to
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    LockAcquire,
    Skipped,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, LockAcquire)
                | (LockAcquire, Skipped)
                | (LockAcquire, Running)
                | (LockAcquire, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Skipped, Idle)
                | (Completed, Idle)
                | (Failed, Idle)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::LockAcquire => "lock_acquire",
            JobState::Skipped => "skipped",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Tracks the state of one run and logs transitions.
#[derive(Debug)]
pub(crate) struct RunTracker {
    job: String,
    state: JobState,
}

impl RunTracker {
    pub(crate) fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            state: JobState::Idle,
        }
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: JobState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                job = %self.job,
                from = self.state.as_str(),
                to = next.as_str(),
                "Unexpected job state transition"
            );
        }
        tracing::debug!(
            job = %self.job,
            from = self.state.as_str(),
            to = next.as_str(),
            "Job state"
        );
        self.state = next;
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Another instance held the lock
    Skipped,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Skipped => "skipped",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub(crate) fn from_state(state: JobState) -> Self {
        match state {
            JobState::Skipped => RunStatus::Skipped,
            JobState::Completed => RunStatus::Completed,
            _ => RunStatus::Failed,
        }
    }
}

/// Summary of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRunReport {
    pub job: String,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    /// Zero when the run never reached lock acquisition
    pub lock_ttl: Duration,
    pub subjects_total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub error: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl JobRunReport {
    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }
}

/// Per-subject counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunTally {
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
}

impl RunTally {
    pub(crate) fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// A job the [`Scheduler`](crate::Scheduler) can run.
///
/// `run` never fails: every outcome, including a skipped run, is described
/// by the returned report.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, trigger: RunTrigger) -> JobRunReport;
}

/// Source of the subjects a weekly run should write to.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// Subjects due a letter, in processing order.
    async fn eligible_subjects(&self) -> LetterResult<Vec<SubjectId>>;
}
