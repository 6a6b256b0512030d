//! Retry strategy and exponential backoff curve

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_JITTER_FACTOR: f64 = 0.3;

/// Retry policy for lock acquisition
///
/// Attempt `n` (0-based) waits `min(max_delay, base_delay * backoff_factor^n)`
/// before the next attempt, optionally perturbed by up to
/// `±jitter_factor * delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Random variation, 0.0 to 1.0
    pub jitter_factor: f64,
    /// Exponential growth factor, at least 1.0
    pub backoff_factor: f64,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryStrategy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(LockError::InvalidRetryStrategy(
                "base delay must be > 0".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(LockError::InvalidRetryStrategy(
                "max delay must be ≥ base delay".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(LockError::InvalidRetryStrategy(
                "jitter factor must be [0.0, 1.0]".to_string(),
            ));
        }
        // NaN fails this comparison as well
        if !(self.backoff_factor >= 1.0 && self.backoff_factor.is_finite()) {
            return Err(LockError::InvalidRetryStrategy(
                "backoff factor must be ≥ 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Deterministic delay after the given 0-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }

    /// Delay after the given attempt, perturbed within `±jitter_factor * delay`
    pub fn jittered_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = rng.random_range(-self.jitter_factor..=self.jitter_factor);
        let jittered = delay.as_secs_f64() * (1.0 + spread);
        Duration::from_secs_f64(jittered.max(0.0)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn strategy() -> RetryStrategy {
        RetryStrategy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_delay_curve_without_jitter() {
        let s = strategy();
        let delays: Vec<u128> = (0..8).map(|i| s.delay_for(i).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 3200, 6400, 10000]);
    }

    #[test]
    fn test_delay_is_capped_for_huge_attempts() {
        let s = strategy();
        assert_eq!(s.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_constant_backoff() {
        let s = strategy().with_backoff_factor(1.0);
        assert_eq!(s.delay_for(0), Duration::from_millis(100));
        assert_eq!(s.delay_for(7), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_jitter_matches_curve() {
        let s = strategy();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..6 {
            assert_eq!(s.jittered_delay(attempt, &mut rng), s.delay_for(attempt));
        }
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let s = strategy().with_jitter_factor(0.5);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let d = s.jittered_delay(2, &mut rng).as_secs_f64();
            assert!((0.2 - 1e-9..=0.6 + 1e-9).contains(&d), "delay {d}");
        }
    }

    #[test]
    fn test_validate() {
        assert!(RetryStrategy::default().validate().is_ok());
        assert!(RetryStrategy::none().validate().is_ok());

        let err = strategy()
            .with_delays(Duration::ZERO, Duration::from_secs(1))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("base delay"));

        let err = strategy()
            .with_delays(Duration::from_secs(2), Duration::from_secs(1))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max delay"));

        assert!(strategy().with_jitter_factor(1.5).validate().is_err());
        assert!(strategy().with_jitter_factor(-0.1).validate().is_err());
        assert!(strategy().with_backoff_factor(0.5).validate().is_err());
        assert!(strategy().with_backoff_factor(f64::NAN).validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_unjittered_curve_matches_formula(
            base_ms in 1u64..1_000,
            factor in 1.0f64..4.0,
            attempt in 0u32..20,
        ) {
            let s = RetryStrategy {
                max_retries: 20,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_secs(30),
                jitter_factor: 0.0,
                backoff_factor: factor,
            };
            let expected = (base_ms as f64 / 1000.0 * factor.powi(attempt as i32)).min(30.0);
            let actual = s.delay_for(attempt).as_secs_f64();
            prop_assert!((actual - expected).abs() < 1e-6);
        }

        #[test]
        fn prop_curve_is_monotonic_and_capped(factor in 1.0f64..8.0, attempt in 0u32..64) {
            let s = strategy().with_backoff_factor(factor);
            prop_assert!(s.delay_for(attempt) <= s.delay_for(attempt + 1));
            prop_assert!(s.delay_for(attempt) <= s.max_delay);
        }
    }
}
