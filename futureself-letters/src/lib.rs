//! Future Self Letters - Orchestration Service
//!
//! Resolves a subject's simulation and letter from cache or generates them,
//! guarding the expensive letter generation with an idempotency marker so
//! concurrent callers share one result. Two cached projections are kept:
//!
//! | Projection | Key | TTL |
//! |------------|-----|-----|
//! | Simulation | `{ns}:sim:{subject}` | short (5 min) |
//! | Letter | `{ns}:letter:{subject}:{variant}` | long (30 min) |
//!
//! Both are dropped by [`LetterService::invalidate`], which
//! [`CacheInvalidationSink`] calls for every upstream data change.

mod idempotency;
mod invalidation;
mod repository;
mod service;

pub use idempotency::{wait_for_result, IdempotencyMarker};
pub use invalidation::CacheInvalidationSink;
pub use repository::LetterRepository;
pub use service::{LetterService, LetterServiceBuilder, LetterServiceConfig};
