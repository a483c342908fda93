//! Future Self Cache - Key-Value Cache Client
//!
//! A thin, degrading client around a remote key-value store. Reads, writes
//! and deletes never fail from the caller's point of view; the store being
//! down simply looks like an empty cache. Locks are token-owned and released
//! or extended through atomic compare operations.
//!
//! # Backends
//!
//! - [`RedisBackend`]: deadpool-redis pool, Lua scripts for lock ownership
//! - [`InMemoryBackend`]: single process, tokio-clock TTLs, outage switch

mod client;
mod keys;
mod memory;
mod redis_backend;
mod traits;

pub use client::{CacheClient, ClaimOutcome};
pub use keys::CacheKeys;
pub use memory::InMemoryBackend;
pub use redis_backend::RedisBackend;
pub use traits::{CacheBackend, CacheStats};
