//! Retry queue processor.

use crate::job::{JobRunReport, JobState, RunStatus, RunTally, RunTracker, RunTrigger, ScheduledJob};
use crate::job_lock::JobLock;
use crate::metrics::JobMetrics;
use crate::retry_queue::{RetryEntry, RetryOutcome, RetryQueue};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use async_trait::async_trait;
use futureself_core::constants::RETRY_QUEUE_JOB;
use futureself_core::{Clock, GenerationFailure, LetterError, LetterTrigger, SystemClock};
use futureself_letters::LetterService;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Regenerates letters for due retry entries, one subject at a time.
///
/// Runs under its own lock with the policy's fixed TTL. Generation goes
/// through [`LetterService::regenerate_letter`], skipping the idempotency
/// marker; the lock already serializes retries.
pub struct RetryJob {
    service: LetterService,
    retry_queue: RetryQueue,
    telemetry: Arc<dyn TelemetrySink>,
    metrics: JobMetrics,
    clock: Arc<dyn Clock>,
}

impl RetryJob {
    pub fn new(
        service: LetterService,
        retry_queue: RetryQueue,
        telemetry: Arc<dyn TelemetrySink>,
        metrics: JobMetrics,
    ) -> Self {
        Self {
            service,
            retry_queue,
            telemetry,
            metrics,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn process_entries(&self, entries: &[RetryEntry]) -> RunTally {
        let mut tally = RunTally::default();
        for entry in entries {
            tally.record(self.retry(entry).await);
        }
        tally
    }

    async fn retry(&self, entry: &RetryEntry) -> bool {
        let subject_id = entry.subject_id;
        let attempt = AssertUnwindSafe(self.service.regenerate_letter(
            subject_id,
            LetterTrigger::Retry,
            None,
        ))
        .catch_unwind()
        .await;

        let e = match attempt {
            Ok(Ok(_)) => {
                self.retry_queue.clear(subject_id).await;
                self.metrics.record_subject(RETRY_QUEUE_JOB, true);
                self.telemetry.record(
                    TelemetryEvent::new("letter_generated", RETRY_QUEUE_JOB).subject(subject_id),
                );
                tracing::info!(
                    subject_id = %subject_id,
                    attempts = entry.attempt_count,
                    "Retry succeeded"
                );
                return true;
            }
            Ok(Err(e)) => e,
            Err(_) => LetterError::Generation(GenerationFailure::Backend {
                provider: RETRY_QUEUE_JOB.to_string(),
                message: "letter generation panicked".to_string(),
            }),
        };

        self.metrics.record_subject(RETRY_QUEUE_JOB, false);
        self.telemetry.record(
            TelemetryEvent::new("letter_failed", RETRY_QUEUE_JOB)
                .subject(subject_id)
                .detail(e.to_string()),
        );
        if e.is_user_correctable() {
            tracing::warn!(
                subject_id = %subject_id,
                error = %e,
                "Retry abandoned, data needs user action"
            );
            self.retry_queue.clear(subject_id).await;
            return false;
        }

        tracing::warn!(subject_id = %subject_id, error = %e, "Retry attempt failed");
        let outcome = self
            .retry_queue
            .record_failure(subject_id, &e, self.clock.now())
            .await;
        if let RetryOutcome::Exhausted { .. } = outcome {
            self.metrics.record_retry_exhausted();
            self.telemetry.record(
                TelemetryEvent::new("retry_exhausted", RETRY_QUEUE_JOB).subject(subject_id),
            );
        }
        false
    }
}

#[async_trait]
impl ScheduledJob for RetryJob {
    fn name(&self) -> &str {
        RETRY_QUEUE_JOB
    }

    async fn run(&self, trigger: RunTrigger) -> JobRunReport {
        let started_at = self.clock.now();
        let lock_ttl = self.retry_queue.policy().lock_ttl;
        let mut tracker = RunTracker::new(RETRY_QUEUE_JOB);
        tracker.advance(JobState::LockAcquire);

        let lock_key = self.service.keys().job_lock(RETRY_QUEUE_JOB);
        let lock = JobLock::acquire(self.service.cache(), lock_key, lock_ttl).await;

        let (subjects_total, tally, error) = match lock {
            None => {
                tracing::info!(job = RETRY_QUEUE_JOB, "Lock held by another instance, skipping run");
                tracker.advance(JobState::Skipped);
                (0, RunTally::default(), None)
            }
            Some(lock) => {
                tracker.advance(JobState::Running);
                self.metrics.set_lock_ttl(RETRY_QUEUE_JOB, lock_ttl);

                let outcome = AssertUnwindSafe(async {
                    let due = self.retry_queue.due(self.clock.now()).await;
                    tracing::info!(job = RETRY_QUEUE_JOB, due = due.len(), "Processing retry queue");
                    (due.len(), self.process_entries(&due).await)
                })
                .catch_unwind()
                .await;

                lock.release().await;
                self.telemetry.flush().await;

                match outcome {
                    Ok((total, tally)) => {
                        tracker.advance(JobState::Completed);
                        (total, tally, None)
                    }
                    Err(_) => {
                        tracing::error!(job = RETRY_QUEUE_JOB, "Retry run panicked");
                        tracker.advance(JobState::Failed);
                        (0, RunTally::default(), Some("retry run panicked".to_string()))
                    }
                }
            }
        };

        let status = RunStatus::from_state(tracker.state());
        tracker.advance(JobState::Idle);
        self.metrics.record_run(RETRY_QUEUE_JOB, status);
        JobRunReport {
            job: RETRY_QUEUE_JOB.to_string(),
            trigger,
            status,
            lock_ttl,
            subjects_total,
            succeeded: tally.succeeded,
            failed: tally.failed,
            error,
            started_at,
            finished_at: self.clock.now(),
        }
    }
}

impl std::fmt::Debug for RetryJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryJob")
            .field("policy", self.retry_queue.policy())
            .finish_non_exhaustive()
    }
}
