//! Wall-clock source for schedules and retry timestamps

use crate::Timestamp;
use chrono::Utc;

/// Source of the current wall-clock time.
///
/// Retry backoff and schedules read time through this so tests can drive it.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
