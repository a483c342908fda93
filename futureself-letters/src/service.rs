//! Letter service: cached simulations, idempotent letter generation and
//! cache invalidation.

use crate::idempotency::{wait_for_result, IdempotencyMarker};
use crate::repository::LetterRepository;
use futureself_cache::{CacheClient, CacheKeys, ClaimOutcome};
use futureself_core::{
    CacheTtls, Clock, ExperimentConfig, FutureSelfConfig, GenerationFailure, IdempotencyConfig,
    Letter, LetterError, LetterRequest, LetterResult, LetterTrigger, LockToken, NewLetter,
    Simulation, SubjectId, SystemClock, Variant,
};
use futureself_llm::{
    HashSplitSelector, KeywordModeration, LetterGenerator, ModerationFilter, SimulationEngine,
    VariantSelector,
};
use futures_util::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;

const SIMULATION_PROVIDER: &str = "simulation";

/// Service-level settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LetterServiceConfig {
    pub ttls: CacheTtls,
    pub idempotency: IdempotencyConfig,
    pub experiment: ExperimentConfig,
}

impl From<&FutureSelfConfig> for LetterServiceConfig {
    fn from(config: &FutureSelfConfig) -> Self {
        Self {
            ttls: config.ttls.clone(),
            idempotency: config.idempotency.clone(),
            experiment: config.experiment.clone(),
        }
    }
}

/// Builder for [`LetterService`].
///
/// Moderation defaults to [`KeywordModeration`] and variant assignment to a
/// [`HashSplitSelector`] over the configured experiment.
pub struct LetterServiceBuilder {
    cache: CacheClient,
    keys: CacheKeys,
    config: LetterServiceConfig,
    simulations: Arc<dyn SimulationEngine>,
    generator: Arc<dyn LetterGenerator>,
    repository: Arc<dyn LetterRepository>,
    moderation: Option<Arc<dyn ModerationFilter>>,
    selector: Option<Arc<dyn VariantSelector>>,
    clock: Arc<dyn Clock>,
}

impl LetterServiceBuilder {
    pub fn keys(mut self, keys: CacheKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn config(mut self, config: LetterServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn moderation(mut self, moderation: Arc<dyn ModerationFilter>) -> Self {
        self.moderation = Some(moderation);
        self
    }

    pub fn selector(mut self, selector: Arc<dyn VariantSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> LetterService {
        let selector = self.selector.unwrap_or_else(|| {
            Arc::new(HashSplitSelector::from_config(&self.config.experiment))
        });
        LetterService {
            inner: Arc::new(Inner {
                cache: self.cache,
                keys: self.keys,
                config: self.config,
                simulations: self.simulations,
                generator: self.generator,
                repository: self.repository,
                moderation: self
                    .moderation
                    .unwrap_or_else(|| Arc::new(KeywordModeration::default())),
                selector,
                clock: self.clock,
            }),
        }
    }
}

struct Inner {
    cache: CacheClient,
    keys: CacheKeys,
    config: LetterServiceConfig,
    simulations: Arc<dyn SimulationEngine>,
    generator: Arc<dyn LetterGenerator>,
    repository: Arc<dyn LetterRepository>,
    moderation: Arc<dyn ModerationFilter>,
    selector: Arc<dyn VariantSelector>,
    clock: Arc<dyn Clock>,
}

/// Orchestrates simulation and letter production for subjects.
///
/// Cheap to clone; clones share every collaborator.
#[derive(Clone)]
pub struct LetterService {
    inner: Arc<Inner>,
}

impl LetterService {
    pub fn builder(
        cache: CacheClient,
        simulations: Arc<dyn SimulationEngine>,
        generator: Arc<dyn LetterGenerator>,
        repository: Arc<dyn LetterRepository>,
    ) -> LetterServiceBuilder {
        LetterServiceBuilder {
            cache,
            keys: CacheKeys::default(),
            config: LetterServiceConfig::default(),
            simulations,
            generator,
            repository,
            moderation: None,
            selector: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn cache(&self) -> &CacheClient {
        &self.inner.cache
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.inner.keys
    }

    pub fn config(&self) -> &LetterServiceConfig {
        &self.inner.config
    }

    // ========================================================================
    // DERIVED DATA
    // ========================================================================

    /// Simulation for a subject, served from cache when possible.
    ///
    /// A cache hit returns before the engine is touched. Misses run the
    /// engine and write the result back in the background.
    pub async fn get_simulation(&self, subject_id: SubjectId) -> LetterResult<Simulation> {
        let inner = &self.inner;
        let key = inner.keys.simulation(subject_id);

        if let Some(simulation) = inner.cache.get::<Simulation>(&key).await {
            return Ok(simulation);
        }

        let simulation = inner
            .simulations
            .simulate(subject_id)
            .await
            .map_err(|e| e.into_generation_failure(SIMULATION_PROVIDER))?;
        inner
            .cache
            .set_detached(&key, &simulation, Some(inner.config.ttls.simulation));
        Ok(simulation)
    }

    // ========================================================================
    // LETTERS
    // ========================================================================

    /// Variant to use for a subject.
    ///
    /// An explicit variant wins. Otherwise the selector decides; selector
    /// errors, empty answers and variants outside the experiment all fall
    /// back to the configured default.
    pub async fn resolve_variant(
        &self,
        subject_id: SubjectId,
        explicit: Option<Variant>,
    ) -> Variant {
        if let Some(variant) = explicit {
            return variant;
        }
        let experiment = &self.inner.config.experiment;
        match self
            .inner
            .selector
            .select_variant(&experiment.name, subject_id)
            .await
        {
            Ok(Some(variant)) if experiment.contains(&variant) => variant,
            Ok(Some(variant)) => {
                tracing::warn!(
                    subject_id = %subject_id,
                    variant = %variant,
                    experiment = %experiment.name,
                    "Selector returned unknown variant, using default"
                );
                experiment.default_variant.clone()
            }
            Ok(None) => experiment.default_variant.clone(),
            Err(e) => {
                tracing::warn!(
                    subject_id = %subject_id,
                    experiment = %experiment.name,
                    error = %e,
                    "Variant assignment failed, using default"
                );
                experiment.default_variant.clone()
            }
        }
    }

    /// Letter for a subject, generated at most once across concurrent callers.
    ///
    /// The first caller claims the idempotency marker and generates. Others
    /// poll the letter cache with backoff; if nothing appears within the
    /// maximum wait they generate themselves. That fallback can persist a
    /// second letter for the same request when the first generator crashed.
    /// With the cache store down the marker cannot be claimed and every
    /// caller generates.
    pub async fn get_letter(
        &self,
        subject_id: SubjectId,
        trigger: LetterTrigger,
        variant: Option<Variant>,
    ) -> LetterResult<Letter> {
        let inner = &self.inner;
        let variant = self.resolve_variant(subject_id, variant).await;
        let letter_key = inner.keys.letter(subject_id, &variant);

        if let Some(letter) = inner.cache.get::<Letter>(&letter_key).await {
            return Ok(letter);
        }

        let marker_key = inner.keys.idempotency(subject_id, &variant);
        let marker = IdempotencyMarker {
            token: LockToken::generate(),
            subject_id,
            variant: variant.clone(),
            trigger,
            started_at: inner.clock.now(),
        };

        let claim = inner
            .cache
            .claim(&marker_key, &marker, inner.config.idempotency.marker_ttl)
            .await;
        match claim {
            ClaimOutcome::Created => {}
            ClaimOutcome::Unavailable => {
                tracing::debug!(subject_id = %subject_id, "Idempotency store unavailable, generating");
            }
            ClaimOutcome::Exists => {
                if let Some(letter) =
                    wait_for_result::<Letter>(&inner.cache, &letter_key, &inner.config.idempotency)
                        .await
                {
                    return Ok(letter);
                }
                tracing::warn!(
                    subject_id = %subject_id,
                    variant = %variant,
                    "Letter did not appear within wait window, generating anyway"
                );
            }
        }

        let outcome = self.produce_letter(subject_id, &variant, trigger).await;
        if claim == ClaimOutcome::Created {
            // The marker TTL covers a failed delete.
            inner.cache.delete_if_equal_detached(&marker_key, &marker);
        }
        outcome
    }

    /// Generate a fresh letter without consulting the cache or the marker.
    ///
    /// Used by the retry job, whose own lock already serializes attempts.
    pub async fn regenerate_letter(
        &self,
        subject_id: SubjectId,
        trigger: LetterTrigger,
        variant: Option<Variant>,
    ) -> LetterResult<Letter> {
        let variant = self.resolve_variant(subject_id, variant).await;
        self.produce_letter(subject_id, &variant, trigger).await
    }

    async fn produce_letter(
        &self,
        subject_id: SubjectId,
        variant: &Variant,
        trigger: LetterTrigger,
    ) -> LetterResult<Letter> {
        let inner = &self.inner;
        let simulation = self.get_simulation(subject_id).await?;
        let request = LetterRequest {
            subject_id,
            variant: variant.clone(),
            simulation,
        };

        let provider = inner.generator.provider_name().to_string();
        let generated = inner
            .generator
            .generate(&request)
            .await
            .map_err(|e| e.into_generation_failure(&provider))?;

        if generated.content.trim().is_empty() {
            return Err(LetterError::Generation(GenerationFailure::EmptyContent));
        }
        let verdict = inner.moderation.moderate(&generated.content);
        if !verdict.passed {
            tracing::warn!(
                subject_id = %subject_id,
                flags = ?verdict.flags,
                "Letter rejected by moderation"
            );
            return Err(LetterError::Generation(
                GenerationFailure::ModerationRejected {
                    flags: verdict.flags,
                },
            ));
        }

        let new_letter = NewLetter {
            subject_id,
            variant: variant.clone(),
            trigger,
            content: generated.content,
            usage: generated.usage,
            model: generated.model,
            simulation: request.simulation,
            created_at: inner.clock.now(),
        };
        let id = inner.repository.persist(&new_letter).await?;
        let letter = Letter::from_persisted(id, new_letter);

        tracing::info!(
            subject_id = %subject_id,
            letter_id = %id,
            variant = %variant,
            trigger = trigger.as_str(),
            "Letter produced"
        );
        inner.cache.set_detached(
            &inner.keys.letter(subject_id, variant),
            &letter,
            Some(inner.config.ttls.letter),
        );
        Ok(letter)
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Drop the cached simulation and the subject's cached letters.
    ///
    /// Letters are found by pattern so variants outside the experiment are
    /// covered; configured variants are always included in case the scan
    /// comes back short. Deletes run concurrently and independently; one
    /// failing leaves only that entry to expire by TTL. Never fails.
    pub async fn invalidate(&self, subject_id: SubjectId) {
        let inner = &self.inner;
        let mut letter_keys: BTreeSet<String> = inner
            .config
            .experiment
            .variants
            .iter()
            .map(|variant| inner.keys.letter(subject_id, variant))
            .collect();
        letter_keys.extend(
            inner
                .cache
                .scan(&inner.keys.letter_pattern(subject_id))
                .await,
        );
        let mut keys = vec![inner.keys.simulation(subject_id)];
        keys.extend(letter_keys);

        let removed = join_all(keys.iter().map(|key| inner.cache.delete(key)))
            .await
            .into_iter()
            .filter(|removed| *removed)
            .count();
        tracing::debug!(
            subject_id = %subject_id,
            keys = keys.len(),
            removed,
            "Subject caches invalidated"
        );
    }
}

impl std::fmt::Debug for LetterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LetterService")
            .field("cache", &self.inner.cache)
            .field("generator", &self.inner.generator.provider_name())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use futureself_cache::InMemoryBackend;
    use futureself_core::{
        EntityIdType, GeneratedLetter, LetterId, ModerationVerdict, ProjectionPath, TokenUsage,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Engine {
        calls: AtomicUsize,
        missing: bool,
    }

    #[async_trait]
    impl SimulationEngine for Engine {
        async fn simulate(&self, subject_id: SubjectId) -> LetterResult<Simulation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.missing {
                return Err(LetterError::SubjectNotFound { subject_id });
            }
            let path = ProjectionPath {
                p10: 1.0,
                median: 2.0,
                p90: 3.0,
            };
            Ok(Simulation {
                subject_id,
                horizon_years: 10,
                current_path: path.clone(),
                improved_path: path,
                computed_at: Utc::now(),
            })
        }
    }

    struct Writer {
        calls: AtomicUsize,
        content: &'static str,
    }

    #[async_trait]
    impl LetterGenerator for Writer {
        fn provider_name(&self) -> &str {
            "writer"
        }

        async fn generate(&self, _request: &LetterRequest) -> LetterResult<GeneratedLetter> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(GeneratedLetter {
                content: self.content.to_string(),
                usage: TokenUsage::default(),
                model: "writer-1".to_string(),
            })
        }
    }

    struct Store;

    #[async_trait]
    impl LetterRepository for Store {
        async fn persist(&self, _letter: &NewLetter) -> LetterResult<LetterId> {
            Ok(LetterId::now_v7())
        }
    }

    struct Strict;

    impl ModerationFilter for Strict {
        fn moderate(&self, content: &str) -> ModerationVerdict {
            if content.contains("lottery") {
                ModerationVerdict::flagged(vec!["lottery".to_string()])
            } else {
                ModerationVerdict::pass()
            }
        }
    }

    fn service(missing: bool, content: &'static str) -> (LetterService, Arc<Engine>, Arc<Writer>) {
        let engine = Arc::new(Engine {
            calls: AtomicUsize::new(0),
            missing,
        });
        let writer = Arc::new(Writer {
            calls: AtomicUsize::new(0),
            content,
        });
        let service = LetterService::builder(
            CacheClient::new(Arc::new(InMemoryBackend::new())),
            engine.clone(),
            writer.clone(),
            Arc::new(Store),
        )
        .moderation(Arc::new(Strict))
        .build();
        (service, engine, writer)
    }

    #[tokio::test]
    async fn test_simulation_cached_after_first_call() {
        let (service, engine, _) = service(false, "Dear me");
        let subject_id = SubjectId::now_v7();
        service.get_simulation(subject_id).await.unwrap();
        service.cache().flush_detached().await;
        service.get_simulation(subject_id).await.unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subject_not_found_propagates_unwrapped() {
        let (service, _, writer) = service(true, "Dear me");
        let subject_id = SubjectId::now_v7();
        let err = service
            .get_letter(subject_id, LetterTrigger::OnDemand, None)
            .await
            .unwrap_err();
        assert_eq!(err, LetterError::SubjectNotFound { subject_id });
        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_moderation_rejection_is_generation_failure() {
        let (service, _, _) = service(false, "Win the lottery!");
        let err = service
            .get_letter(SubjectId::now_v7(), LetterTrigger::OnDemand, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LetterError::Generation(GenerationFailure::ModerationRejected {
                flags: vec!["lottery".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_blank_letter_rejected() {
        let (service, _, _) = service(false, "   ");
        let err = service
            .get_letter(SubjectId::now_v7(), LetterTrigger::OnDemand, None)
            .await
            .unwrap_err();
        assert_eq!(err, LetterError::Generation(GenerationFailure::EmptyContent));
    }

    #[tokio::test]
    async fn test_cached_letter_short_circuits_generation() {
        let (service, _, writer) = service(false, "Dear me");
        let subject_id = SubjectId::now_v7();
        let variant = Some(Variant::new("direct"));
        let first = service
            .get_letter(subject_id, LetterTrigger::OnDemand, variant.clone())
            .await
            .unwrap();
        service.cache().flush_detached().await;
        let second = service
            .get_letter(subject_id, LetterTrigger::OnDemand, variant)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_regenerate_bypasses_cache() {
        let (service, _, writer) = service(false, "Dear me");
        let subject_id = SubjectId::now_v7();
        let first = service
            .get_letter(subject_id, LetterTrigger::OnDemand, None)
            .await
            .unwrap();
        service.cache().flush_detached().await;
        let second = service
            .regenerate_letter(subject_id, LetterTrigger::Retry, None)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.trigger, LetterTrigger::Retry);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_clears_every_variant() {
        let (service, _, _) = service(false, "Dear me");
        let subject_id = SubjectId::now_v7();
        for variant in ["encouraging", "direct"] {
            service
                .get_letter(subject_id, LetterTrigger::OnDemand, Some(Variant::new(variant)))
                .await
                .unwrap();
        }
        service.cache().flush_detached().await;

        service.invalidate(subject_id).await;
        let keys = service.keys();
        assert!(service
            .cache()
            .get::<Simulation>(&keys.simulation(subject_id))
            .await
            .is_none());
        for variant in ["encouraging", "direct"] {
            assert!(service
                .cache()
                .get::<Letter>(&keys.letter(subject_id, &Variant::new(variant)))
                .await
                .is_none());
        }
    }
}
