//! Weekly letter batch.

use crate::job::{
    JobRunReport, JobState, RunStatus, RunTally, RunTracker, RunTrigger, ScheduledJob,
    SubjectDirectory,
};
use crate::job_lock::JobLock;
use crate::lock_ttl::{compute_lock_ttl, extension_interval};
use crate::metrics::JobMetrics;
use crate::retry_queue::{RetryOutcome, RetryQueue};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use async_trait::async_trait;
use futureself_core::constants::WEEKLY_LETTER_JOB;
use futureself_core::{
    BatchConfig, Clock, GenerationFailure, LetterError, SubjectId, SystemClock,
};
use futureself_letters::LetterService;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Writes a letter for every eligible subject under a cluster-wide lock.
///
/// Subjects are processed in windows of `concurrency`. A failing subject is
/// queued for retry and never stops the batch; a succeeding one has its
/// retry history cleared. The lock is released and telemetry flushed on
/// every exit path, including a panic inside the batch.
pub struct WeeklyLetterJob {
    service: LetterService,
    directory: Arc<dyn SubjectDirectory>,
    retry_queue: RetryQueue,
    config: BatchConfig,
    telemetry: Arc<dyn TelemetrySink>,
    metrics: JobMetrics,
    clock: Arc<dyn Clock>,
}

impl WeeklyLetterJob {
    pub fn new(
        service: LetterService,
        directory: Arc<dyn SubjectDirectory>,
        retry_queue: RetryQueue,
        config: BatchConfig,
        telemetry: Arc<dyn TelemetrySink>,
        metrics: JobMetrics,
    ) -> Self {
        Self {
            service,
            directory,
            retry_queue,
            config,
            telemetry,
            metrics,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn process_batch(&self, subjects: &[SubjectId], trigger: RunTrigger) -> RunTally {
        let mut tally = RunTally::default();
        let concurrency = self.config.concurrency.max(1);
        for (window, chunk) in subjects.chunks(concurrency).enumerate() {
            let results = join_all(
                chunk
                    .iter()
                    .map(|subject_id| self.process_subject(*subject_id, trigger)),
            )
            .await;
            for succeeded in results {
                tally.record(succeeded);
            }
            tracing::debug!(
                job = WEEKLY_LETTER_JOB,
                window,
                succeeded = tally.succeeded,
                failed = tally.failed,
                "Batch window finished"
            );
        }
        tally
    }

    async fn process_subject(&self, subject_id: SubjectId, trigger: RunTrigger) -> bool {
        let attempt = AssertUnwindSafe(self.service.get_letter(
            subject_id,
            trigger.letter_trigger(),
            None,
        ))
        .catch_unwind()
        .await;

        let error = match attempt {
            Ok(Ok(letter)) => {
                self.retry_queue.clear(subject_id).await;
                self.metrics.record_subject(WEEKLY_LETTER_JOB, true);
                self.telemetry.record(
                    TelemetryEvent::new("letter_generated", WEEKLY_LETTER_JOB)
                        .subject(subject_id)
                        .detail(letter.variant.as_str()),
                );
                return true;
            }
            Ok(Err(e)) => e,
            Err(_) => LetterError::Generation(GenerationFailure::Backend {
                provider: WEEKLY_LETTER_JOB.to_string(),
                message: "letter generation panicked".to_string(),
            }),
        };

        self.metrics.record_subject(WEEKLY_LETTER_JOB, false);
        self.telemetry.record(
            TelemetryEvent::new("letter_failed", WEEKLY_LETTER_JOB)
                .subject(subject_id)
                .detail(error.to_string()),
        );

        if error.is_user_correctable() {
            tracing::warn!(
                subject_id = %subject_id,
                error = %error,
                "Subject skipped, data needs user action"
            );
            self.retry_queue.clear(subject_id).await;
            return false;
        }

        tracing::warn!(subject_id = %subject_id, error = %error, "Letter generation failed");
        let outcome = self
            .retry_queue
            .record_failure(subject_id, &error, self.clock.now())
            .await;
        if let RetryOutcome::Exhausted { .. } = outcome {
            self.metrics.record_retry_exhausted();
        }
        false
    }
}

#[async_trait]
impl ScheduledJob for WeeklyLetterJob {
    fn name(&self) -> &str {
        WEEKLY_LETTER_JOB
    }

    async fn run(&self, trigger: RunTrigger) -> JobRunReport {
        let started_at = self.clock.now();
        let mut tracker = RunTracker::new(WEEKLY_LETTER_JOB);
        tracker.advance(JobState::LockAcquire);

        let finish = |tracker: &mut RunTracker,
                      lock_ttl: Duration,
                      subjects_total: usize,
                      tally: RunTally,
                      error: Option<String>| {
            let status = RunStatus::from_state(tracker.state());
            tracker.advance(JobState::Idle);
            self.metrics.record_run(WEEKLY_LETTER_JOB, status);
            JobRunReport {
                job: WEEKLY_LETTER_JOB.to_string(),
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
        };

        // The subject count sizes the lock, so it is read first.
        let subjects = match self.directory.eligible_subjects().await {
            Ok(subjects) => subjects,
            Err(e) => {
                tracing::error!(
                    job = WEEKLY_LETTER_JOB,
                    error = %e,
                    "Failed to load eligible subjects"
                );
                tracker.advance(JobState::Failed);
                let error = Some(e.to_string());
                return finish(&mut tracker, Duration::ZERO, 0, RunTally::default(), error);
            }
        };

        let lock_ttl = compute_lock_ttl(subjects.len(), &self.config);
        let lock_key = self.service.keys().job_lock(WEEKLY_LETTER_JOB);
        let Some(mut lock) = JobLock::acquire(self.service.cache(), lock_key, lock_ttl).await
        else {
            tracing::info!(job = WEEKLY_LETTER_JOB, "Lock held by another instance, skipping run");
            tracker.advance(JobState::Skipped);
            let total = subjects.len();
            return finish(&mut tracker, lock_ttl, total, RunTally::default(), None);
        };

        tracker.advance(JobState::Running);
        self.metrics.set_lock_ttl(WEEKLY_LETTER_JOB, lock_ttl);
        lock.keep_alive(extension_interval(lock_ttl, self.config.extension_divisor));
        tracing::info!(
            job = WEEKLY_LETTER_JOB,
            lock_key = lock.key(),
            subjects = subjects.len(),
            lock_ttl_secs = lock_ttl.as_secs(),
            trigger = ?trigger,
            "Weekly letter run started"
        );

        let outcome = AssertUnwindSafe(self.process_batch(&subjects, trigger))
            .catch_unwind()
            .await;

        lock.release().await;
        self.telemetry.flush().await;

        let (tally, error) = match outcome {
            Ok(tally) => {
                tracker.advance(JobState::Completed);
                (tally, None)
            }
            Err(_) => {
                tracing::error!(job = WEEKLY_LETTER_JOB, "Weekly letter run panicked");
                tracker.advance(JobState::Failed);
                (RunTally::default(), Some("batch panicked".to_string()))
            }
        };

        tracing::info!(
            job = WEEKLY_LETTER_JOB,
            succeeded = tally.succeeded,
            failed = tally.failed,
            "Weekly letter run finished"
        );
        finish(&mut tracker, lock_ttl, subjects.len(), tally, error)
    }
}

impl std::fmt::Debug for WeeklyLetterJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeeklyLetterJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
