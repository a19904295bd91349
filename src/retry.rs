//! Exponential backoff with full jitter.
//!
//! [`RetryPolicy::delay`] is stateless: the attempt counter lives with the
//! client, which also enforces [`RetryPolicy::max_attempts`]. The randomness
//! source is injected so tests can pin the jitter.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Smallest accepted base delay.
pub const MIN_BASE_DELAY: Duration = Duration::from_millis(10);

/// Source of uniformly distributed values in `[0, 1]`.
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;
}

/// Entropy-seeded generator used outside tests.
pub struct SystemRandom {
    rng: Mutex<StdRng>,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn next_f64(&self) -> f64 {
        self.rng.lock().r#gen::<f64>()
    }
}

/// Always yields the same value. `FixedRandom(1.0)` makes every delay equal to
/// its cap and `FixedRandom(0.0)` makes every delay zero.
#[derive(Clone, Copy, Debug)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0
    }
}

/// Backoff parameters plus the jitter source.
#[derive(Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    random: Arc<dyn RandomSource>,
}

impl RetryPolicy {
    /// Build a policy. The base delay is raised to [`MIN_BASE_DELAY`] and the
    /// maximum delay to at least the base delay.
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let base_delay = base_delay.max(MIN_BASE_DELAY);
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            max_attempts,
            random,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound of the delay for `attempt`: `min(base * 2^(attempt-1), max)`.
    pub fn cap(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let shift = (attempt - 1).min(31);
        self.base_delay
            .saturating_mul(1_u32 << shift)
            .min(self.max_delay)
    }

    /// Delay before retrying after failed `attempt`, drawn uniformly from
    /// `[0, cap(attempt)]`. Attempt 0 never waits.
    pub fn delay(&self, attempt: u32) -> Duration {
        let cap = self.cap(attempt);
        if cap.is_zero() {
            return cap;
        }
        let jitter = self.random.next_f64();
        let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        cap.mul_f64(jitter)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy(base_ms: u64, max_ms: u64, jitter: f64) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            5,
            Arc::new(FixedRandom(jitter)),
        )
    }

    #[test]
    fn attempt_zero_never_waits() {
        assert_eq!(policy(1_000, 30_000, 1.0).delay(0), Duration::ZERO);
    }

    #[rstest]
    #[case(1, 1_000)]
    #[case(2, 2_000)]
    #[case(3, 4_000)]
    #[case(5, 16_000)]
    #[case(6, 30_000)]
    #[case(40, 30_000)]
    fn cap_doubles_until_the_maximum(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = policy(1_000, 30_000, 1.0);
        assert_eq!(policy.cap(attempt), Duration::from_millis(expected_ms));
        assert_eq!(policy.delay(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn full_jitter_scales_the_cap() {
        assert_eq!(policy(1_000, 30_000, 0.5).delay(3), Duration::from_millis(2_000));
        assert_eq!(policy(1_000, 30_000, 0.0).delay(3), Duration::ZERO);
    }

    #[test]
    fn out_of_range_jitter_is_clamped() {
        assert_eq!(policy(1_000, 30_000, 7.0).delay(1), Duration::from_secs(1));
        assert_eq!(policy(1_000, 30_000, f64::NAN).delay(1), Duration::ZERO);
    }

    #[test]
    fn inputs_are_normalised() {
        let policy = policy(0, 0, 1.0);
        assert_eq!(policy.base_delay(), MIN_BASE_DELAY);
        assert_eq!(policy.max_delay(), MIN_BASE_DELAY);
    }

    #[test]
    fn system_random_stays_in_unit_interval() {
        let random = SystemRandom::new();
        for _ in 0..1_000 {
            let v = random.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
