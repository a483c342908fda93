//! Configuration for the letter pipeline
//!
//! Every struct has a `Default` built from [`crate::constants`], a
//! `from_env()` constructor reading `FUTURESELF_*` variables and a
//! `development()` preset with short timings for local runs.

use crate::constants::*;
use crate::{ConfigError, Variant};
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Connection and key-namespace settings for the cache store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub redis_url: String,
    /// Prefix for simulation, letter and job lock keys
    pub namespace: String,
    pub idempotency_namespace: String,
    pub retry_namespace: String,
    pub pool_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            idempotency_namespace: DEFAULT_IDEMPOTENCY_NAMESPACE.to_string(),
            retry_namespace: DEFAULT_RETRY_NAMESPACE.to_string(),
            pool_size: 16,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_string("FUTURESELF_REDIS_URL", &defaults.redis_url),
            namespace: env_string("FUTURESELF_CACHE_NAMESPACE", &defaults.namespace),
            idempotency_namespace: env_string(
                "FUTURESELF_IDEMPOTENCY_NAMESPACE",
                &defaults.idempotency_namespace,
            ),
            retry_namespace: env_string("FUTURESELF_RETRY_NAMESPACE", &defaults.retry_namespace),
            pool_size: env_or("FUTURESELF_REDIS_POOL_SIZE", defaults.pool_size),
        }
    }

    pub fn development() -> Self {
        Self {
            namespace: "futureself-dev".to_string(),
            idempotency_namespace: "futureself-dev:idem".to_string(),
            retry_namespace: "futureself-dev:retry".to_string(),
            pool_size: 4,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cache.redis_url".to_string(),
            });
        }
        // Namespaces must differ or retry entries would match letter scans.
        if self.namespace == self.retry_namespace || self.namespace == self.idempotency_namespace {
            return Err(invalid(
                "cache.namespace",
                &self.namespace,
                "must differ from idempotency and retry namespaces",
            ));
        }
        if self.pool_size == 0 {
            return Err(invalid("cache.pool_size", self.pool_size, "must be positive"));
        }
        Ok(())
    }
}

/// TTLs of the two cached projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    /// Derived data, cheap to recompute
    pub simulation: Duration,
    /// Expensive artifact
    pub letter: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            simulation: Duration::from_secs(DEFAULT_SIMULATION_TTL_SECS),
            letter: Duration::from_secs(DEFAULT_LETTER_TTL_SECS),
        }
    }
}

impl CacheTtls {
    pub fn from_env() -> Self {
        Self {
            simulation: Duration::from_secs(env_or(
                "FUTURESELF_SIMULATION_TTL_SECS",
                DEFAULT_SIMULATION_TTL_SECS,
            )),
            letter: Duration::from_secs(env_or(
                "FUTURESELF_LETTER_TTL_SECS",
                DEFAULT_LETTER_TTL_SECS,
            )),
        }
    }

    pub fn development() -> Self {
        Self {
            simulation: Duration::from_secs(30),
            letter: Duration::from_secs(120),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.is_zero() {
            return Err(invalid("ttls.simulation", "0", "must be positive"));
        }
        if self.letter.is_zero() {
            return Err(invalid("ttls.letter", "0", "must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// IDEMPOTENCY
// ============================================================================

/// Marker TTL and polling backoff for concurrent letter requests.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyConfig {
    pub marker_ttl: Duration,
    pub poll_initial: Duration,
    pub poll_multiplier: f64,
    pub poll_max: Duration,
    /// Waiters give up and generate on their own after this long
    pub max_wait: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            marker_ttl: Duration::from_secs(DEFAULT_IDEMPOTENCY_TTL_SECS),
            poll_initial: Duration::from_millis(DEFAULT_POLL_INITIAL_MS),
            poll_multiplier: DEFAULT_POLL_MULTIPLIER,
            poll_max: Duration::from_millis(DEFAULT_POLL_MAX_MS),
            max_wait: Duration::from_millis(DEFAULT_POLL_MAX_WAIT_MS),
        }
    }
}

impl IdempotencyConfig {
    pub fn from_env() -> Self {
        Self {
            marker_ttl: Duration::from_secs(env_or(
                "FUTURESELF_IDEMPOTENCY_TTL_SECS",
                DEFAULT_IDEMPOTENCY_TTL_SECS,
            )),
            poll_initial: Duration::from_millis(env_or(
                "FUTURESELF_POLL_INITIAL_MS",
                DEFAULT_POLL_INITIAL_MS,
            )),
            poll_multiplier: env_or("FUTURESELF_POLL_MULTIPLIER", DEFAULT_POLL_MULTIPLIER),
            poll_max: Duration::from_millis(env_or("FUTURESELF_POLL_MAX_MS", DEFAULT_POLL_MAX_MS)),
            max_wait: Duration::from_millis(env_or(
                "FUTURESELF_POLL_MAX_WAIT_MS",
                DEFAULT_POLL_MAX_WAIT_MS,
            )),
        }
    }

    pub fn development() -> Self {
        Self {
            marker_ttl: Duration::from_secs(10),
            poll_initial: Duration::from_millis(100),
            poll_multiplier: DEFAULT_POLL_MULTIPLIER,
            poll_max: Duration::from_millis(500),
            max_wait: Duration::from_secs(3),
        }
    }

    /// Delay following `current` in the polling ladder.
    pub fn next_poll_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.poll_multiplier).min(self.poll_max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.marker_ttl.is_zero() {
            return Err(invalid("idempotency.marker_ttl", "0", "must be positive"));
        }
        if self.poll_initial.is_zero() {
            return Err(invalid("idempotency.poll_initial", "0", "must be positive"));
        }
        if self.poll_multiplier.is_nan() || self.poll_multiplier < 1.0 {
            return Err(invalid(
                "idempotency.poll_multiplier",
                self.poll_multiplier,
                "must be at least 1.0",
            ));
        }
        if self.poll_max < self.poll_initial {
            return Err(invalid(
                "idempotency.poll_max",
                format!("{:?}", self.poll_max),
                "must not be shorter than poll_initial",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// EXPERIMENT
// ============================================================================

/// A/B experiment partitioning letters by variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub name: String,
    /// Every variant the letter cache may hold entries for
    pub variants: Vec<Variant>,
    /// Used when assignment fails or returns nothing
    pub default_variant: Variant,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_EXPERIMENT_NAME.to_string(),
            variants: vec![Variant::new(DEFAULT_VARIANT), Variant::new(CHALLENGER_VARIANT)],
            default_variant: Variant::new(DEFAULT_VARIANT),
        }
    }
}

impl ExperimentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let variants = std::env::var("FUTURESELF_EXPERIMENT_VARIANTS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Variant::new)
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.variants);
        Self {
            name: env_string("FUTURESELF_EXPERIMENT_NAME", &defaults.name),
            variants,
            default_variant: Variant::new(env_string(
                "FUTURESELF_DEFAULT_VARIANT",
                defaults.default_variant.as_str(),
            )),
        }
    }

    pub fn development() -> Self {
        Self::default()
    }

    pub fn contains(&self, variant: &Variant) -> bool {
        self.variants.contains(variant)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variants.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "experiment.variants".to_string(),
            });
        }
        if !self.contains(&self.default_variant) {
            return Err(invalid(
                "experiment.default_variant",
                &self.default_variant,
                "must be one of the configured variants",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// BATCH JOB
// ============================================================================

/// Sizing of the weekly batch run and its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub estimated_per_subject: Duration,
    pub buffer_multiplier: f64,
    pub min_lock_ttl: Duration,
    pub max_lock_ttl: Duration,
    /// Lock is extended every `ttl / extension_divisor`
    pub extension_divisor: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            estimated_per_subject: Duration::from_secs(DEFAULT_ESTIMATED_SECS_PER_SUBJECT),
            buffer_multiplier: DEFAULT_LOCK_BUFFER_MULTIPLIER,
            min_lock_ttl: Duration::from_secs(DEFAULT_MIN_LOCK_TTL_SECS),
            max_lock_ttl: Duration::from_secs(DEFAULT_MAX_LOCK_TTL_SECS),
            extension_divisor: DEFAULT_LOCK_EXTENSION_DIVISOR,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        Self {
            concurrency: env_or("FUTURESELF_BATCH_CONCURRENCY", DEFAULT_BATCH_CONCURRENCY),
            estimated_per_subject: Duration::from_secs(env_or(
                "FUTURESELF_ESTIMATED_SECS_PER_SUBJECT",
                DEFAULT_ESTIMATED_SECS_PER_SUBJECT,
            )),
            buffer_multiplier: env_or(
                "FUTURESELF_LOCK_BUFFER_MULTIPLIER",
                DEFAULT_LOCK_BUFFER_MULTIPLIER,
            ),
            min_lock_ttl: Duration::from_secs(env_or(
                "FUTURESELF_MIN_LOCK_TTL_SECS",
                DEFAULT_MIN_LOCK_TTL_SECS,
            )),
            max_lock_ttl: Duration::from_secs(env_or(
                "FUTURESELF_MAX_LOCK_TTL_SECS",
                DEFAULT_MAX_LOCK_TTL_SECS,
            )),
            extension_divisor: env_or(
                "FUTURESELF_LOCK_EXTENSION_DIVISOR",
                DEFAULT_LOCK_EXTENSION_DIVISOR,
            ),
        }
    }

    pub fn development() -> Self {
        Self {
            concurrency: 2,
            estimated_per_subject: Duration::from_secs(5),
            min_lock_ttl: Duration::from_secs(30),
            max_lock_ttl: Duration::from_secs(10 * 60),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(invalid("batch.concurrency", self.concurrency, "must be positive"));
        }
        if self.buffer_multiplier.is_nan() || self.buffer_multiplier < 1.0 {
            return Err(invalid(
                "batch.buffer_multiplier",
                self.buffer_multiplier,
                "must be at least 1.0",
            ));
        }
        if self.min_lock_ttl.is_zero() || self.min_lock_ttl > self.max_lock_ttl {
            return Err(invalid(
                "batch.min_lock_ttl",
                format!("{:?}", self.min_lock_ttl),
                "must be positive and not exceed max_lock_ttl",
            ));
        }
        if self.extension_divisor < 2 {
            return Err(invalid(
                "batch.extension_divisor",
                self.extension_divisor,
                "must be at least 2",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// RETRY QUEUE
// ============================================================================

/// Backoff ladder and bounds of the retry queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Vec<Duration>,
    /// Entries reaching this attempt count are dropped
    pub max_attempts: u32,
    pub entry_ttl: Duration,
    pub lock_ttl: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_RETRY_BACKOFF_SECS
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            entry_ttl: Duration::from_secs(DEFAULT_RETRY_ENTRY_TTL_SECS),
            lock_ttl: Duration::from_secs(DEFAULT_RETRY_LOCK_TTL_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backoff = std::env::var("FUTURESELF_RETRY_BACKOFF_SECS")
            .ok()
            .and_then(|raw| {
                raw.split(',')
                    .map(|s| s.trim().parse::<u64>().map(Duration::from_secs))
                    .collect::<Result<Vec<_>, _>>()
                    .ok()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.backoff);
        Self {
            backoff,
            max_attempts: env_or("FUTURESELF_RETRY_MAX_ATTEMPTS", defaults.max_attempts),
            entry_ttl: Duration::from_secs(env_or(
                "FUTURESELF_RETRY_ENTRY_TTL_SECS",
                DEFAULT_RETRY_ENTRY_TTL_SECS,
            )),
            lock_ttl: Duration::from_secs(env_or(
                "FUTURESELF_RETRY_LOCK_TTL_SECS",
                DEFAULT_RETRY_LOCK_TTL_SECS,
            )),
        }
    }

    pub fn development() -> Self {
        Self {
            backoff: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            entry_ttl: Duration::from_secs(60 * 60),
            lock_ttl: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Delay before the next retry of an entry that has failed
    /// `attempt_count` times. The last rung repeats.
    pub fn backoff_for(&self, attempt_count: u32) -> Duration {
        let last = self.backoff.len().saturating_sub(1);
        let idx = (attempt_count.saturating_sub(1) as usize).min(last);
        self.backoff.get(idx).copied().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "retry.backoff".to_string(),
            });
        }
        if self.backoff.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid(
                "retry.backoff",
                format!("{:?}", self.backoff),
                "must be non-decreasing",
            ));
        }
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", self.max_attempts, "must be positive"));
        }
        if self.lock_ttl.is_zero() || self.entry_ttl.is_zero() {
            return Err(invalid("retry.lock_ttl", "0", "TTLs must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// SCHEDULES
// ============================================================================

/// Calendar settings for the two recurring jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// 0 = Monday
    pub weekly_weekday: u32,
    pub weekly_hour: u32,
    pub weekly_minute: u32,
    pub retry_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekly_weekday: DEFAULT_WEEKLY_WEEKDAY,
            weekly_hour: DEFAULT_WEEKLY_HOUR,
            weekly_minute: DEFAULT_WEEKLY_MINUTE,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
        }
    }
}

impl ScheduleConfig {
    pub fn from_env() -> Self {
        Self {
            weekly_weekday: env_or("FUTURESELF_WEEKLY_WEEKDAY", DEFAULT_WEEKLY_WEEKDAY),
            weekly_hour: env_or("FUTURESELF_WEEKLY_HOUR", DEFAULT_WEEKLY_HOUR),
            weekly_minute: env_or("FUTURESELF_WEEKLY_MINUTE", DEFAULT_WEEKLY_MINUTE),
            retry_interval: Duration::from_secs(env_or(
                "FUTURESELF_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
        }
    }

    pub fn development() -> Self {
        Self {
            retry_interval: Duration::from_secs(30),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weekly_weekday > 6 {
            return Err(invalid("schedule.weekly_weekday", self.weekly_weekday, "must be 0-6"));
        }
        if self.weekly_hour > 23 {
            return Err(invalid("schedule.weekly_hour", self.weekly_hour, "must be 0-23"));
        }
        if self.weekly_minute > 59 {
            return Err(invalid("schedule.weekly_minute", self.weekly_minute, "must be 0-59"));
        }
        if self.retry_interval.is_zero() {
            return Err(invalid("schedule.retry_interval", "0", "must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// All pipeline settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FutureSelfConfig {
    pub cache: CacheConfig,
    pub ttls: CacheTtls,
    pub idempotency: IdempotencyConfig,
    pub experiment: ExperimentConfig,
    pub batch: BatchConfig,
    pub retry: RetryPolicy,
    pub schedule: ScheduleConfig,
}

impl FutureSelfConfig {
    pub fn from_env() -> Self {
        Self {
            cache: CacheConfig::from_env(),
            ttls: CacheTtls::from_env(),
            idempotency: IdempotencyConfig::from_env(),
            experiment: ExperimentConfig::from_env(),
            batch: BatchConfig::from_env(),
            retry: RetryPolicy::from_env(),
            schedule: ScheduleConfig::from_env(),
        }
    }

    pub fn development() -> Self {
        Self {
            cache: CacheConfig::development(),
            ttls: CacheTtls::development(),
            idempotency: IdempotencyConfig::development(),
            experiment: ExperimentConfig::development(),
            batch: BatchConfig::development(),
            retry: RetryPolicy::development(),
            schedule: ScheduleConfig::development(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.ttls.validate()?;
        self.idempotency.validate()?;
        self.experiment.validate()?;
        self.batch.validate()?;
        self.retry.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}
