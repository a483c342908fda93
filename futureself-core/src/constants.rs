//! Constants for the Future Self letter pipeline
//!
//! Centralized defaults for TTLs, backoff, lock sizing and schedules.

// ============================================================================
// CACHE NAMESPACES
// ============================================================================

/// Default namespace for simulation, letter and lock keys
pub const DEFAULT_CACHE_NAMESPACE: &str = "futureself";

/// Default namespace for idempotency markers
pub const DEFAULT_IDEMPOTENCY_NAMESPACE: &str = "futureself:idem";

/// Default namespace for retry queue entries
pub const DEFAULT_RETRY_NAMESPACE: &str = "futureself:retry";

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

// ============================================================================
// CACHE TTLS
// ============================================================================

/// Simulation (derived data) cache TTL (5 minutes)
pub const DEFAULT_SIMULATION_TTL_SECS: u64 = 5 * 60;

/// Letter (expensive artifact) cache TTL (30 minutes)
pub const DEFAULT_LETTER_TTL_SECS: u64 = 30 * 60;

// ============================================================================
// IDEMPOTENCY
// ============================================================================

/// Idempotency marker TTL (30 seconds)
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 30;

/// First poll delay while another caller generates
pub const DEFAULT_POLL_INITIAL_MS: u64 = 500;

/// Poll delay multiplier
pub const DEFAULT_POLL_MULTIPLIER: f64 = 1.5;

/// Upper bound for a single poll delay
pub const DEFAULT_POLL_MAX_MS: u64 = 2_000;

/// Total time a waiter polls before generating on its own
pub const DEFAULT_POLL_MAX_WAIT_MS: u64 = 15_000;

// ============================================================================
// EXPERIMENT
// ============================================================================

/// Experiment that partitions letters by tone
pub const DEFAULT_EXPERIMENT_NAME: &str = "letter_tone";

/// Variant used when assignment fails
pub const DEFAULT_VARIANT: &str = "encouraging";

/// Challenger variant of the default experiment
pub const CHALLENGER_VARIANT: &str = "direct";

// ============================================================================
// BATCH JOB
// ============================================================================

/// Subjects processed concurrently per batch window
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Estimated generation time per subject (seconds)
pub const DEFAULT_ESTIMATED_SECS_PER_SUBJECT: u64 = 30;

/// Safety multiplier applied to the estimated run time
pub const DEFAULT_LOCK_BUFFER_MULTIPLIER: f64 = 1.5;

/// Shortest batch lock TTL (5 minutes)
pub const DEFAULT_MIN_LOCK_TTL_SECS: u64 = 5 * 60;

/// Longest batch lock TTL (6 hours)
pub const DEFAULT_MAX_LOCK_TTL_SECS: u64 = 6 * 60 * 60;

/// Lock is extended every `ttl / divisor`
pub const DEFAULT_LOCK_EXTENSION_DIVISOR: u32 = 6;

/// Job name of the weekly letter batch
pub const WEEKLY_LETTER_JOB: &str = "weekly-letters";

/// Job name of the retry queue processor
pub const RETRY_QUEUE_JOB: &str = "letter-retries";

// ============================================================================
// RETRY QUEUE
// ============================================================================

/// Backoff ladder between retries (5 min, 15 min, 60 min)
pub const DEFAULT_RETRY_BACKOFF_SECS: [u64; 3] = [5 * 60, 15 * 60, 60 * 60];

/// Attempt count at which a subject is dropped from the queue
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;

/// Absolute lifetime of a retry entry (24 hours)
pub const DEFAULT_RETRY_ENTRY_TTL_SECS: u64 = 24 * 60 * 60;

/// Fixed lock TTL of the retry job (10 minutes)
pub const DEFAULT_RETRY_LOCK_TTL_SECS: u64 = 10 * 60;

// ============================================================================
// SCHEDULES
// ============================================================================

/// Weekly run weekday, 0 = Monday
pub const DEFAULT_WEEKLY_WEEKDAY: u32 = 0;

/// Weekly run hour (UTC)
pub const DEFAULT_WEEKLY_HOUR: u32 = 9;

/// Weekly run minute
pub const DEFAULT_WEEKLY_MINUTE: u32 = 0;

/// Retry job interval (5 minutes)
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5 * 60;
