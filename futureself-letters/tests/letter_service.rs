//! Letter service behaviour: caching, idempotent generation, invalidation.

use futureself_cache::CacheClient;
use futureself_core::{
    EntityIdType, Letter, LetterError, LetterTrigger, LockToken, Simulation, SubjectId, Variant,
};
use futureself_events::{DomainEvent, EventDispatcher};
use futureself_letters::{CacheInvalidationSink, IdempotencyMarker, LetterService};
use futureself_test_utils::fixtures::{self, TestHarness};
use futureself_test_utils::{
    assertions, FailingBackend, FailingVariantSelector, InMemoryLetterRepository,
    MockLetterGenerator, MockSimulationEngine,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn direct() -> Option<Variant> {
    Some(Variant::new("direct"))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_generate_once() {
    let harness =
        TestHarness::with_generator(MockLetterGenerator::new().with_delay(Duration::from_secs(2)));
    let subject_id = SubjectId::now_v7();

    let letters = join_all((0..8).map(|_| {
        harness
            .service
            .get_letter(subject_id, LetterTrigger::OnDemand, direct())
    }))
    .await;

    let ids: Vec<_> = letters
        .into_iter()
        .map(|letter| letter.unwrap().id)
        .collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(harness.repository.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_marker_removed_after_generation() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, direct())
        .await
        .unwrap();
    harness.cache.flush_detached().await;

    let marker_key = harness.keys.idempotency(subject_id, &Variant::new("direct"));
    assert!(harness.cache.get::<IdempotencyMarker>(&marker_key).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_waiter_generates_after_wait_window() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    let variant = Variant::new("direct");

    // A holder that claimed the marker and then died.
    let marker = IdempotencyMarker {
        token: LockToken::generate(),
        subject_id,
        variant: variant.clone(),
        trigger: LetterTrigger::Scheduled,
        started_at: fixtures::start_time(),
    };
    assert!(
        harness
            .cache
            .set_if_absent(
                &harness.keys.idempotency(subject_id, &variant),
                &marker,
                Duration::from_secs(30),
            )
            .await
    );

    let started = Instant::now();
    let letter = harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, Some(variant))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(16));
    assert_eq!(letter.subject_id, subject_id);
    assert_eq!(harness.generator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_generation_tolerates_duplicate_letters() {
    let harness =
        TestHarness::with_generator(MockLetterGenerator::new().with_delay(Duration::from_secs(20)));
    let subject_id = SubjectId::now_v7();

    let (first, second) = tokio::join!(
        harness
            .service
            .get_letter(subject_id, LetterTrigger::OnDemand, direct()),
        harness
            .service
            .get_letter(subject_id, LetterTrigger::OnDemand, direct()),
    );

    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.id, second.id);
    assert_eq!(harness.generator.calls(), 2);
    assert_eq!(harness.repository.count_for(subject_id), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_holder_leaves_newer_marker_in_place() {
    let harness =
        TestHarness::with_generator(MockLetterGenerator::new().with_delay(Duration::from_secs(40)));
    let subject_id = SubjectId::now_v7();
    let marker_key = harness.keys.idempotency(subject_id, &Variant::new("direct"));

    // The first holder outlives its 30s marker; a second caller claims anew.
    let first = harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, direct());
    let second = async {
        tokio::time::sleep(Duration::from_secs(35)).await;
        harness
            .service
            .get_letter(subject_id, LetterTrigger::OnDemand, direct())
            .await
    };
    let marker_after_first = async {
        tokio::time::sleep(Duration::from_secs(41)).await;
        harness.cache.flush_detached().await;
        harness.cache.get::<IdempotencyMarker>(&marker_key).await
    };

    let (first, second, marker) = tokio::join!(first, second, marker_after_first);
    first.unwrap();
    second.unwrap();
    assert!(marker.is_some());
    assert_eq!(harness.generator.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_generates_without_waiting() {
    let generator = Arc::new(MockLetterGenerator::new());
    let service = LetterService::builder(
        CacheClient::new(Arc::new(FailingBackend)),
        Arc::new(MockSimulationEngine::new()),
        generator.clone(),
        Arc::new(InMemoryLetterRepository::new()),
    )
    .build();

    let started = Instant::now();
    let subject_id = SubjectId::now_v7();
    service
        .get_letter(subject_id, LetterTrigger::OnDemand, None)
        .await
        .unwrap();
    service
        .get_letter(subject_id, LetterTrigger::OnDemand, None)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(generator.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_simulation_cached_until_ttl() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();

    harness.service.get_simulation(subject_id).await.unwrap();
    harness.cache.flush_detached().await;
    harness.service.get_simulation(subject_id).await.unwrap();
    assert_eq!(harness.engine.calls(), 1);

    tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
    harness.service.get_simulation(subject_id).await.unwrap();
    assert_eq!(harness.engine.calls(), 2);
}

#[tokio::test]
async fn test_user_data_errors_pass_through() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    harness.engine.fail_with(
        subject_id,
        LetterError::InsufficientData {
            subject_id,
            reason: "no snapshots".to_string(),
        },
    );

    let result = harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, None)
        .await;
    assertions::assert_user_correctable(&result);
    assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn test_generator_failure_surfaces_once() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    harness.generator.fail_for(subject_id);

    let result = harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, None)
        .await;
    assertions::assert_generation_failure(&result);
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(harness.repository.count(), 0);
}

#[tokio::test]
async fn test_persistence_failure_propagates() {
    let harness = TestHarness::new();
    harness.repository.set_failing(true);

    let result = harness
        .service
        .get_letter(SubjectId::now_v7(), LetterTrigger::OnDemand, None)
        .await;
    assert!(matches!(result, Err(LetterError::Persistence { .. })));
}

#[tokio::test]
async fn test_selector_failure_uses_default_variant() {
    let harness = TestHarness::with_selector(Arc::new(FailingVariantSelector));
    let letter = harness
        .service
        .get_letter(SubjectId::now_v7(), LetterTrigger::OnDemand, None)
        .await
        .unwrap();
    assert_eq!(letter.variant, Variant::new("encouraging"));
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_survives_failed_delete() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, direct())
        .await
        .unwrap();
    harness.cache.flush_detached().await;

    harness.backend.fail_deletes_containing(":sim:");
    harness.service.invalidate(subject_id).await;

    let letter_key = harness.keys.letter(subject_id, &Variant::new("direct"));
    assert!(harness.cache.get::<Letter>(&letter_key).await.is_none());

    // The undeleted simulation ages out on its TTL.
    let sim_key = harness.keys.simulation(subject_id);
    assert!(harness.cache.get::<Simulation>(&sim_key).await.is_some());
    tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
    assert!(harness.cache.get::<Simulation>(&sim_key).await.is_none());
}

#[tokio::test]
async fn test_invalidate_covers_variants_outside_experiment() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    let seasonal = Variant::new("holiday_special");
    harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, Some(seasonal.clone()))
        .await
        .unwrap();
    harness.cache.flush_detached().await;
    let letter_key = harness.keys.letter(subject_id, &seasonal);
    assert!(harness.cache.get::<Letter>(&letter_key).await.is_some());

    harness.service.invalidate(subject_id).await;
    assert!(harness.cache.get::<Letter>(&letter_key).await.is_none());
}

#[tokio::test]
async fn test_domain_events_invalidate_caches() {
    let harness = TestHarness::new();
    let subject_id = SubjectId::now_v7();
    harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, direct())
        .await
        .unwrap();
    harness.cache.flush_detached().await;

    let mut dispatcher = EventDispatcher::new();
    CacheInvalidationSink::attach(harness.service.clone(), &mut dispatcher);
    let handled = dispatcher
        .dispatch(&DomainEvent::GoalChanged {
            subject_id,
            goal_name: Some("house deposit".to_string()),
            occurred_at: fixtures::start_time(),
        })
        .await;
    assert_eq!(handled, 1);

    let letter_key = harness.keys.letter(subject_id, &Variant::new("direct"));
    assert!(harness.cache.get::<Letter>(&letter_key).await.is_none());
    assert!(harness
        .cache
        .get::<Simulation>(&harness.keys.simulation(subject_id))
        .await
        .is_none());

    // Next request regenerates.
    harness
        .service
        .get_letter(subject_id, LetterTrigger::OnDemand, direct())
        .await
        .unwrap();
    assert_eq!(harness.generator.calls(), 2);
}
