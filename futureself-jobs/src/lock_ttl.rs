//! Batch lock sizing.

use futureself_core::BatchConfig;
use std::time::Duration;

/// Lock TTL for a batch over `subject_count` subjects.
///
/// `clamp(ceil(n / concurrency) * estimate * buffer, min, max)`. Too short
/// and the lock expires mid-run, letting a second instance start; too long
/// and a crashed run blocks the next window.
pub fn compute_lock_ttl(subject_count: usize, config: &BatchConfig) -> Duration {
    let concurrency = config.concurrency.max(1);
    let windows = subject_count.div_ceil(concurrency) as f64;
    let estimate_secs =
        windows * config.estimated_per_subject.as_secs_f64() * config.buffer_multiplier;

    let min = config.min_lock_ttl;
    let max = config.max_lock_ttl.max(min);
    if !estimate_secs.is_finite() || estimate_secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(estimate_secs.max(0.0)).clamp(min, max)
}

/// How often the lock holder extends a lock of `ttl`.
pub fn extension_interval(ttl: Duration, divisor: u32) -> Duration {
    (ttl / divisor.max(2)).max(Duration::from_millis(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_small_batches_get_minimum() {
        let config = BatchConfig::default();
        assert_eq!(compute_lock_ttl(0, &config), Duration::from_secs(300));
        // 50 subjects: 10 windows * 30s * 1.5 = 450s
        assert_eq!(compute_lock_ttl(50, &config), Duration::from_secs(450));
    }

    #[test]
    fn test_large_batches_capped() {
        let config = BatchConfig::default();
        // 10_000 subjects: 2_000 windows * 45s = 25h, capped at 6h
        assert_eq!(compute_lock_ttl(10_000, &config), Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_partial_window_rounds_up() {
        let config = BatchConfig::default();
        // 51 subjects need 11 windows: 11 * 45 = 495s
        assert_eq!(compute_lock_ttl(51, &config), Duration::from_secs(495));
    }

    #[test]
    fn test_extension_interval_is_sixth_of_ttl() {
        assert_eq!(
            extension_interval(Duration::from_secs(600), 6),
            Duration::from_secs(100)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_lock_ttl_bounded_and_monotonic(a in 0usize..100_000, b in 0usize..100_000) {
            let config = BatchConfig::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let ttl_lo = compute_lock_ttl(lo, &config);
            let ttl_hi = compute_lock_ttl(hi, &config);
            prop_assert!(ttl_lo <= ttl_hi);
            prop_assert!(ttl_lo >= config.min_lock_ttl && ttl_hi <= config.max_lock_ttl);
        }
    }
}
