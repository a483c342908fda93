//! Weekly letter batch runs end to end over in-memory collaborators.

use futureself_cache::CacheBackend;
use futureself_core::constants::WEEKLY_LETTER_JOB;
use futureself_core::{BatchConfig, EntityIdType, LetterError, LetterTrigger, LockToken, SubjectId};
use futureself_jobs::{compute_lock_ttl, RunStatus, RunTrigger, ScheduledJob};
use futureself_test_utils::fixtures::{self, TestHarness};
use futureself_test_utils::{MockLetterGenerator, StaticSubjectDirectory};
use std::sync::Arc;
use std::time::Duration;

fn batch(concurrency: usize) -> BatchConfig {
    BatchConfig {
        concurrency,
        ..BatchConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_isolated_and_queued() {
    let harness = TestHarness::with_generator(
        MockLetterGenerator::new().with_delay(Duration::from_millis(100)),
    );
    let subjects = fixtures::subjects(7);
    harness.generator.fail_for(subjects[2]);
    harness.generator.panic_for(subjects[4]);

    let job = harness.weekly_job(subjects.clone(), batch(3));
    let report = job.run(RunTrigger::Scheduled).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.subjects_total, 7);
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 2);
    assert!(harness.generator.max_in_flight() <= 3);

    let queue = harness.retry_queue();
    for (i, subject_id) in subjects.iter().enumerate() {
        let entry = queue.get(*subject_id).await;
        if i == 2 || i == 4 {
            assert_eq!(entry.map(|e| e.attempt_count), Some(1));
        } else {
            assert!(entry.is_none());
        }
    }
    assert_eq!(harness.repository.count(), 5);
    assert!(harness
        .repository
        .letters()
        .iter()
        .all(|letter| letter.trigger == LetterTrigger::Scheduled));
}

#[tokio::test]
async fn test_cleanup_releases_lock_and_flushes() {
    let harness = TestHarness::new();
    let job = harness.weekly_job(fixtures::subjects(2), batch(5));
    job.run(RunTrigger::Scheduled).await;

    let lock_key = harness.keys.job_lock(WEEKLY_LETTER_JOB);
    assert_eq!(harness.backend.get(&lock_key).await.unwrap(), None);
    assert_eq!(harness.telemetry.flush_count(), 1);
    assert_eq!(
        harness.telemetry.names(),
        vec!["letter_generated", "letter_generated"]
    );
}

#[tokio::test]
async fn test_report_carries_sized_lock_ttl() {
    let harness = TestHarness::new();
    let config = batch(5);
    let job = harness.weekly_job(fixtures::subjects(12), config.clone());
    let report = job.run(RunTrigger::Manual).await;

    assert_eq!(report.lock_ttl, compute_lock_ttl(12, &config));
    assert_eq!(report.trigger, RunTrigger::Manual);
    assert_eq!(report.started_at, fixtures::start_time());
    assert_eq!(
        harness.metrics.runs(WEEKLY_LETTER_JOB, RunStatus::Completed),
        1
    );
    assert_eq!(harness.metrics.subjects(WEEKLY_LETTER_JOB, true), 12);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "completed");
}

#[tokio::test]
async fn test_held_lock_skips_run() {
    let harness = TestHarness::new();
    let lock_key = harness.keys.job_lock(WEEKLY_LETTER_JOB);
    let other = LockToken::generate();
    assert!(
        harness
            .cache
            .acquire_lock(&lock_key, Duration::from_secs(600), &other)
            .await
    );

    let job = harness.weekly_job(fixtures::subjects(3), batch(5));
    let report = job.run(RunTrigger::Scheduled).await;

    assert_eq!(report.status, RunStatus::Skipped);
    assert!(report.is_success());
    assert_eq!(harness.generator.calls(), 0);
    assert_eq!(
        harness.backend.get(&lock_key).await.unwrap().as_deref(),
        Some(other.as_str())
    );
    assert_eq!(harness.metrics.runs(WEEKLY_LETTER_JOB, RunStatus::Skipped), 1);
}

#[tokio::test]
async fn test_directory_failure_fails_run_without_lock() {
    let harness = TestHarness::new();
    let job = harness.weekly_job_with(Arc::new(StaticSubjectDirectory::failing()), batch(5));
    let report = job.run(RunTrigger::Scheduled).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.is_some());
    assert_eq!(report.lock_ttl, Duration::ZERO);
    let lock_key = harness.keys.job_lock(WEEKLY_LETTER_JOB);
    assert_eq!(harness.backend.get(&lock_key).await.unwrap(), None);
}

#[tokio::test]
async fn test_success_clears_previous_failure() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    let queue = harness.retry_queue();
    queue
        .record_failure(
            subject_id,
            &LetterError::Persistence {
                reason: "db down".to_string(),
            },
            fixtures::start_time(),
        )
        .await;
    assert!(queue.get(subject_id).await.is_some());

    let job = harness.weekly_job(vec![subject_id], batch(5));
    let report = job.run(RunTrigger::Scheduled).await;

    assert_eq!(report.succeeded, 1);
    assert!(queue.get(subject_id).await.is_none());
}

#[tokio::test]
async fn test_user_data_errors_not_queued() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    harness
        .engine
        .fail_with(subject_id, LetterError::SubjectNotFound { subject_id });

    let job = harness.weekly_job(vec![subject_id], batch(5));
    let report = job.run(RunTrigger::Scheduled).await;

    assert_eq!(report.failed, 1);
    assert!(harness.retry_queue().get(subject_id).await.is_none());
}

#[tokio::test]
async fn test_user_data_error_drops_previous_retry_entry() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    let queue = harness.retry_queue();
    queue
        .record_failure(
            subject_id,
            &LetterError::Persistence {
                reason: "db down".to_string(),
            },
            fixtures::start_time(),
        )
        .await;
    harness
        .engine
        .fail_with(subject_id, LetterError::SubjectNotFound { subject_id });

    let report = harness
        .weekly_job(vec![subject_id], batch(5))
        .run(RunTrigger::Scheduled)
        .await;

    assert_eq!(report.failed, 1);
    assert!(queue.get(subject_id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_lock_extended_through_long_run() {
    let harness = TestHarness::with_generator(
        MockLetterGenerator::new().with_delay(Duration::from_secs(100)),
    );
    let config = BatchConfig {
        concurrency: 1,
        min_lock_ttl: Duration::from_secs(60),
        max_lock_ttl: Duration::from_secs(60),
        ..BatchConfig::default()
    };
    let job = Arc::new(harness.weekly_job(fixtures::subjects(1), config));

    let running = {
        let job = job.clone();
        tokio::spawn(async move { job.run(RunTrigger::Scheduled).await })
    };

    // Past the original TTL the lock is still held.
    tokio::time::sleep(Duration::from_secs(75)).await;
    let lock_key = harness.keys.job_lock(WEEKLY_LETTER_JOB);
    let intruder = LockToken::generate();
    assert!(
        !harness
            .cache
            .acquire_lock(&lock_key, Duration::from_secs(60), &intruder)
            .await
    );

    let report = running.await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(harness.backend.get(&lock_key).await.unwrap(), None);
}
