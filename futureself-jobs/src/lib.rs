//! Future Self Jobs - Scheduled Letter Batches
//!
//! Two recurring jobs share one scheduler:
//!
//! - [`WeeklyLetterJob`] writes a letter for every eligible subject. Its lock
//!   TTL is sized from the subject count ([`compute_lock_ttl`]) and extended
//!   while the batch runs.
//! - [`RetryJob`] works through the [`RetryQueue`] with a fixed lock TTL,
//!   following the backoff ladder until an entry succeeds or runs out of
//!   attempts.
//!
//! Each run walks `Idle → LockAcquire → (Skipped | Running) → (Completed |
//! Failed)` and returns a [`JobRunReport`]. A run that finds the lock held
//! is skipped, not deferred.

mod job;
mod job_lock;
mod lock_ttl;
mod metrics;
mod retry_job;
mod retry_queue;
mod schedule;
mod scheduler;
pub mod telemetry;
mod weekly;

pub use job::{JobRunReport, JobState, RunStatus, RunTrigger, ScheduledJob, SubjectDirectory};
pub use lock_ttl::{compute_lock_ttl, extension_interval};
pub use metrics::JobMetrics;
pub use retry_job::RetryJob;
pub use retry_queue::{RetryEntry, RetryOutcome, RetryQueue};
pub use schedule::Schedule;
pub use scheduler::{ManualTriggerSummary, Scheduler};
pub use telemetry::{
    init_tracing, LogFormat, TelemetryConfig, TelemetryError, TelemetryEvent, TelemetrySink,
    TracingTelemetry,
};
pub use weekly::WeeklyLetterJob;
