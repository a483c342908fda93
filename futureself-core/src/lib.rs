//! Future Self Core - Domain Types
//!
//! Identifiers, simulation and letter types, the error taxonomy and
//! configuration shared by every crate of the letter pipeline. No I/O.

pub mod clock;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod health;
pub mod identity;
pub mod lock;

pub use clock::{Clock, SystemClock};
pub use config::{
    BatchConfig, CacheConfig, CacheTtls, ExperimentConfig, FutureSelfConfig, IdempotencyConfig,
    RetryPolicy, ScheduleConfig,
};
pub use domain::{
    GeneratedLetter, Letter, LetterRequest, LetterTrigger, ModerationVerdict, NewLetter,
    ProjectionPath, Simulation, TokenUsage, Variant,
};
pub use error::{CacheError, ConfigError, GenerationFailure, LetterError, LetterResult};
pub use health::{HealthCheck, HealthStatus};
pub use identity::{EntityIdType, LetterId, SubjectId, Timestamp};
pub use lock::LockToken;
