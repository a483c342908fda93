//! Future Self Test Utilities
//!
//! Centralized test infrastructure for the Future Self workspace:
//! - Mock collaborators (simulation engine, letter generator, repository,
//!   moderation, variant selectors, subject directory, telemetry)
//! - Fault-injecting cache backends
//! - A manually driven clock
//! - Proptest generators
//! - Fixtures and a wired-up service harness
//! - Custom assertions

use async_trait::async_trait;
use chrono::TimeZone;
use futureself_cache::{CacheBackend, CacheClient, CacheKeys, InMemoryBackend};
use futureself_jobs::{
    JobMetrics, RetryJob, RetryQueue, SubjectDirectory, TelemetryEvent, TelemetrySink,
    WeeklyLetterJob,
};
use futureself_letters::{LetterRepository, LetterService, LetterServiceConfig};
use futureself_llm::{LetterGenerator, ModerationFilter, SimulationEngine, VariantSelector};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// Re-export core types for convenience
pub use futureself_core::{
    BatchConfig, CacheError, Clock, EntityIdType, GeneratedLetter, GenerationFailure, Letter,
    LetterError, LetterId, LetterRequest, LetterResult, LetterTrigger, ModerationVerdict,
    NewLetter, ProjectionPath, RetryPolicy, Simulation, SubjectId, Timestamp, TokenUsage,
    Variant,
};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// Simulation engine returning a fixed projection, with per-subject errors.
#[derive(Debug, Default)]
pub struct MockSimulationEngine {
    calls: AtomicUsize,
    errors: Mutex<HashMap<SubjectId, LetterError>>,
}

impl MockSimulationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every simulation of `subject_id` fail with `error`.
    pub fn fail_with(&self, subject_id: SubjectId, error: LetterError) {
        locked(&self.errors).insert(subject_id, error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimulationEngine for MockSimulationEngine {
    async fn simulate(&self, subject_id: SubjectId) -> LetterResult<Simulation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = locked(&self.errors).get(&subject_id).cloned() {
            return Err(error);
        }
        Ok(fixtures::simulation(subject_id))
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    Times(u32),
}

/// Letter generator with a configurable delay and scripted failures.
///
/// Tracks how many generations ran at once so tests can check batch
/// concurrency bounds.
#[derive(Debug)]
pub struct MockLetterGenerator {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    content: String,
    failures: Mutex<HashMap<SubjectId, Failure>>,
    panics: Mutex<HashSet<SubjectId>>,
    per_subject: Mutex<HashMap<SubjectId, usize>>,
}

impl Default for MockLetterGenerator {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            content: fixtures::LETTER_CONTENT.to_string(),
            failures: Mutex::new(HashMap::new()),
            panics: Mutex::new(HashSet::new()),
            per_subject: Mutex::new(HashMap::new()),
        }
    }
}

impl MockLetterGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Fail every generation for `subject_id`.
    pub fn fail_for(&self, subject_id: SubjectId) {
        locked(&self.failures).insert(subject_id, Failure::Always);
    }

    /// Fail the next `times` generations for `subject_id`.
    pub fn fail_times(&self, subject_id: SubjectId, times: u32) {
        locked(&self.failures).insert(subject_id, Failure::Times(times));
    }

    pub fn recover(&self, subject_id: SubjectId) {
        locked(&self.failures).remove(&subject_id);
    }

    /// Panic inside `generate` for `subject_id`.
    pub fn panic_for(&self, subject_id: SubjectId) {
        locked(&self.panics).insert(subject_id);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, subject_id: SubjectId) -> usize {
        locked(&self.per_subject)
            .get(&subject_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(&self, subject_id: SubjectId) -> bool {
        let mut failures = locked(&self.failures);
        match failures.get(&subject_id).copied() {
            Some(Failure::Always) => true,
            Some(Failure::Times(n)) if n > 1 => {
                failures.insert(subject_id, Failure::Times(n - 1));
                true
            }
            Some(Failure::Times(n)) => {
                failures.remove(&subject_id);
                n == 1
            }
            None => false,
        }
    }
}

#[async_trait]
impl LetterGenerator for MockLetterGenerator {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &LetterRequest) -> LetterResult<GeneratedLetter> {
        let subject_id = request.subject_id;
        self.calls.fetch_add(1, Ordering::SeqCst);
        *locked(&self.per_subject).entry(subject_id).or_insert(0) += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if locked(&self.panics).contains(&subject_id) {
            panic!("mock generator panicked for {subject_id}");
        }
        if self.take_failure(subject_id) {
            return Err(LetterError::Generation(GenerationFailure::Backend {
                provider: "mock".to_string(),
                message: "scripted failure".to_string(),
            }));
        }
        Ok(GeneratedLetter {
            content: self.content.clone(),
            usage: TokenUsage {
                input_tokens: 120,
                output_tokens: 340,
            },
            model: "mock-writer-1".to_string(),
        })
    }
}

/// Repository keeping letters in memory. Accepts duplicates.
#[derive(Debug, Default)]
pub struct InMemoryLetterRepository {
    letters: Mutex<Vec<Letter>>,
    failing: AtomicBool,
}

impl InMemoryLetterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn letters(&self) -> Vec<Letter> {
        locked(&self.letters).clone()
    }

    pub fn count(&self) -> usize {
        locked(&self.letters).len()
    }

    pub fn count_for(&self, subject_id: SubjectId) -> usize {
        locked(&self.letters)
            .iter()
            .filter(|letter| letter.subject_id == subject_id)
            .count()
    }
}

#[async_trait]
impl LetterRepository for InMemoryLetterRepository {
    async fn persist(&self, letter: &NewLetter) -> LetterResult<LetterId> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LetterError::Persistence {
                reason: "repository offline".to_string(),
            });
        }
        let id = LetterId::now_v7();
        locked(&self.letters).push(Letter::from_persisted(id, letter.clone()));
        Ok(id)
    }
}

/// Moderation that passes everything or flags one phrase.
#[derive(Debug, Clone, Default)]
pub struct MockModeration {
    flag_phrase: Option<String>,
}

impl MockModeration {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn flagging(phrase: impl Into<String>) -> Self {
        Self {
            flag_phrase: Some(phrase.into()),
        }
    }
}

impl ModerationFilter for MockModeration {
    fn moderate(&self, content: &str) -> ModerationVerdict {
        match &self.flag_phrase {
            Some(phrase) if content.contains(phrase.as_str()) => {
                ModerationVerdict::flagged(vec![phrase.clone()])
            }
            _ => ModerationVerdict::pass(),
        }
    }
}

/// Selector that always answers with the same variant (or none).
#[derive(Debug, Clone)]
pub struct FixedVariantSelector(pub Option<Variant>);

#[async_trait]
impl VariantSelector for FixedVariantSelector {
    async fn select_variant(
        &self,
        _experiment: &str,
        _subject_id: SubjectId,
    ) -> LetterResult<Option<Variant>> {
        Ok(self.0.clone())
    }
}

/// Selector whose backend is always down.
#[derive(Debug, Clone, Default)]
pub struct FailingVariantSelector;

#[async_trait]
impl VariantSelector for FailingVariantSelector {
    async fn select_variant(
        &self,
        _experiment: &str,
        _subject_id: SubjectId,
    ) -> LetterResult<Option<Variant>> {
        Err(LetterError::Generation(GenerationFailure::Backend {
            provider: "experiments".to_string(),
            message: "assignment service unavailable".to_string(),
        }))
    }
}

/// Subject directory over a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticSubjectDirectory {
    subjects: Vec<SubjectId>,
    failing: bool,
}

impl StaticSubjectDirectory {
    pub fn new(subjects: Vec<SubjectId>) -> Self {
        Self {
            subjects,
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            subjects: Vec::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl SubjectDirectory for StaticSubjectDirectory {
    async fn eligible_subjects(&self) -> LetterResult<Vec<SubjectId>> {
        if self.failing {
            return Err(LetterError::Persistence {
                reason: "subject query failed".to_string(),
            });
        }
        Ok(self.subjects.clone())
    }
}

/// Telemetry sink that keeps every event and counts flushes.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
    flushes: AtomicUsize,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        locked(&self.events).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        locked(&self.events).iter().map(|e| e.name).collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        locked(&self.events).push(event);
    }

    async fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Wall clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *locked(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = locked(&self.now);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(fixtures::start_time())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *locked(&self.now)
    }
}

// ============================================================================
// FAULT-INJECTING BACKENDS
// ============================================================================

fn unavailable() -> CacheError {
    CacheError::Unavailable {
        reason: "injected outage".to_string(),
    }
}

/// Backend where every call fails as if the store were unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingBackend;

#[async_trait]
impl CacheBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), CacheError> {
        Err(unavailable())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(unavailable())
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &str) -> Result<bool, CacheError> {
        Err(unavailable())
    }

    async fn compare_and_expire(
        &self,
        _key: &str,
        _expected: &str,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Err(unavailable())
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Err(unavailable())
    }

    async fn scan(
        &self,
        _pattern: &str,
        _cursor: u64,
        _count: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(unavailable())
    }
}

/// In-memory backend whose deletes fail for selected keys.
#[derive(Debug, Default)]
pub struct FaultyBackend {
    inner: InMemoryBackend,
    failing_deletes: Mutex<Vec<String>>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail deletes of any key containing `fragment`.
    pub fn fail_deletes_containing(&self, fragment: impl Into<String>) {
        locked(&self.failing_deletes).push(fragment.into());
    }

    pub fn heal(&self) {
        locked(&self.failing_deletes).clear();
    }

    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    fn delete_fails(&self, key: &str) -> bool {
        locked(&self.failing_deletes)
            .iter()
            .any(|fragment| key.contains(fragment.as_str()))
    }
}

#[async_trait]
impl CacheBackend for FaultyBackend {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        if self.delete_fails(key) {
            return Err(unavailable());
        }
        self.inner.delete(key).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.inner.compare_and_expire(key, expected, ttl).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.inner.keys(pattern).await
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        self.inner.scan(pattern, cursor, count).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.inner.ping().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Future Self types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_subject_id() -> impl Strategy<Value = SubjectId> {
        any::<u128>().prop_map(|n| SubjectId::new(Uuid::from_u128(n)))
    }

    /// One of the default experiment's variants.
    pub fn arb_variant() -> impl Strategy<Value = Variant> {
        prop_oneof![
            Just(Variant::new("encouraging")),
            Just(Variant::new("direct")),
        ]
    }

    /// Timestamps between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_batch_config() -> impl Strategy<Value = BatchConfig> {
        (1usize..20, 1u64..120, 1.0f64..3.0, 60u64..600, 1u64..24).prop_map(
            |(concurrency, per_subject, buffer, min_secs, max_hours)| BatchConfig {
                concurrency,
                estimated_per_subject: Duration::from_secs(per_subject),
                buffer_multiplier: buffer,
                min_lock_ttl: Duration::from_secs(min_secs),
                max_lock_ttl: Duration::from_secs(max_hours * 3600).max(Duration::from_secs(min_secs)),
                extension_divisor: 6,
            },
        )
    }

    /// Non-decreasing ladders of one to five rungs.
    pub fn arb_retry_policy() -> impl Strategy<Value = RetryPolicy> {
        (prop::collection::vec(1u64..3600, 1..5), 2u32..8).prop_map(|(mut rungs, max_attempts)| {
            rungs.sort_unstable();
            RetryPolicy {
                backoff: rungs.into_iter().map(Duration::from_secs).collect(),
                max_attempts,
                ..RetryPolicy::default()
            }
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures and a fully wired service harness.

    use super::*;

    pub const LETTER_CONTENT: &str =
        "Dear me, ten years from now the small transfers you started this week add up.";

    /// A Monday, 09:00 UTC.
    pub fn start_time() -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now)
    }

    pub fn simulation(subject_id: SubjectId) -> Simulation {
        Simulation {
            subject_id,
            horizon_years: 10,
            current_path: ProjectionPath {
                p10: 12_000.0,
                median: 18_500.0,
                p90: 26_000.0,
            },
            improved_path: ProjectionPath {
                p10: 21_000.0,
                median: 34_000.0,
                p90: 52_000.0,
            },
            computed_at: start_time(),
        }
    }

    pub fn subjects(count: usize) -> Vec<SubjectId> {
        (0..count).map(|_| SubjectId::now_v7()).collect()
    }

    /// Letter service wired to mocks over a [`FaultyBackend`].
    pub struct TestHarness {
        pub backend: Arc<FaultyBackend>,
        pub cache: CacheClient,
        pub keys: CacheKeys,
        pub engine: Arc<MockSimulationEngine>,
        pub generator: Arc<MockLetterGenerator>,
        pub repository: Arc<InMemoryLetterRepository>,
        pub clock: Arc<ManualClock>,
        pub telemetry: Arc<RecordingTelemetry>,
        pub metrics: JobMetrics,
        pub service: LetterService,
    }

    impl TestHarness {
        pub fn new() -> Self {
            Self::with_generator(MockLetterGenerator::new())
        }

        pub fn with_generator(generator: MockLetterGenerator) -> Self {
            Self::build(generator, LetterServiceConfig::default(), None)
        }

        pub fn with_selector(selector: Arc<dyn VariantSelector>) -> Self {
            Self::build(MockLetterGenerator::new(), LetterServiceConfig::default(), Some(selector))
        }

        fn build(
            generator: MockLetterGenerator,
            config: LetterServiceConfig,
            selector: Option<Arc<dyn VariantSelector>>,
        ) -> Self {
            let backend = Arc::new(FaultyBackend::new());
            let cache = CacheClient::new(backend.clone());
            let keys = CacheKeys::default();
            let engine = Arc::new(MockSimulationEngine::new());
            let generator = Arc::new(generator);
            let repository = Arc::new(InMemoryLetterRepository::new());
            let clock = Arc::new(ManualClock::default());

            let mut builder = LetterService::builder(
                cache.clone(),
                engine.clone(),
                generator.clone(),
                repository.clone(),
            )
            .keys(keys.clone())
            .config(config)
            .moderation(Arc::new(MockModeration::passing()))
            .clock(clock.clone());
            if let Some(selector) = selector {
                builder = builder.selector(selector);
            }

            Self {
                backend,
                cache,
                keys,
                engine,
                generator,
                repository,
                clock,
                telemetry: Arc::new(RecordingTelemetry::new()),
                metrics: JobMetrics::new().expect("fresh registry accepts job metrics"),
                service: builder.build(),
            }
        }

        pub fn retry_queue(&self) -> RetryQueue {
            RetryQueue::new(self.cache.clone(), self.keys.clone(), RetryPolicy::default())
        }

        pub fn weekly_job(&self, subjects: Vec<SubjectId>, config: BatchConfig) -> WeeklyLetterJob {
            self.weekly_job_with(Arc::new(StaticSubjectDirectory::new(subjects)), config)
        }

        pub fn weekly_job_with(
            &self,
            directory: Arc<dyn SubjectDirectory>,
            config: BatchConfig,
        ) -> WeeklyLetterJob {
            WeeklyLetterJob::new(
                self.service.clone(),
                directory,
                self.retry_queue(),
                config,
                self.telemetry.clone(),
                self.metrics.clone(),
            )
            .with_clock(self.clock.clone())
        }

        pub fn retry_job(&self) -> RetryJob {
            RetryJob::new(
                self.service.clone(),
                self.retry_queue(),
                self.telemetry.clone(),
                self.metrics.clone(),
            )
            .with_clock(self.clock.clone())
        }
    }

    impl Default for TestHarness {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over letter results.

    use super::*;

    #[track_caller]
    pub fn assert_generation_failure<T: std::fmt::Debug>(result: &LetterResult<T>) {
        match result {
            Err(LetterError::Generation(_)) => {}
            other => panic!("Expected generation failure, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_user_correctable<T: std::fmt::Debug>(result: &LetterResult<T>) {
        match result {
            Err(e) if e.is_user_correctable() => {}
            other => panic!("Expected user-correctable error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_generator_fail_times_recovers() {
        let generator = MockLetterGenerator::new();
        let subject_id = SubjectId::now_v7();
        generator.fail_times(subject_id, 2);
        let request = LetterRequest {
            subject_id,
            variant: Variant::new("direct"),
            simulation: fixtures::simulation(subject_id),
        };

        assert!(generator.generate(&request).await.is_err());
        assert!(generator.generate(&request).await.is_err());
        assert!(generator.generate(&request).await.is_ok());
        assert_eq!(generator.calls_for(subject_id), 3);
    }

    #[tokio::test]
    async fn test_faulty_backend_fails_selected_deletes() {
        let backend = FaultyBackend::new();
        backend.set("a:sim:1", "x", None).await.unwrap();
        backend.set("a:letter:1", "y", None).await.unwrap();
        backend.fail_deletes_containing(":sim:");

        assert!(backend.delete("a:sim:1").await.is_err());
        assert!(backend.delete("a:letter:1").await.unwrap());
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), fixtures::start_time() + chrono::Duration::minutes(5));
    }

    proptest! {
        #[test]
        fn prop_generated_policies_are_valid(policy in generators::arb_retry_policy()) {
            prop_assert!(policy.validate().is_ok());
        }

        #[test]
        fn prop_generated_batch_configs_are_valid(config in generators::arb_batch_config()) {
            prop_assert!(config.validate().is_ok());
        }
    }
}
