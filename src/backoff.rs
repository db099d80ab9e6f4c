use std::time::Duration;

use rand::Rng;

/// Maps a retry attempt number (1-based) to the delay waited before that
/// attempt is sent.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: usize) -> Duration;
}

/// No delay between attempts. The default for [`RetryInterceptor`].
///
/// [`RetryInterceptor`]: crate::RetryInterceptor
#[derive(Debug, Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn delay(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }
}

/// Capped exponential backoff with optional jitter.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
            jitter_ratio: 0.0,
        }
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let max_ms = self.max.as_millis().min(u64::MAX as u128) as u64;

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let mut rng = rand::rng();
        let sampled_ms = rng.random_range(low..=high).min(max_ms.max(1));
        Duration::from_millis(sampled_ms)
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: usize) -> Duration {
        let capped_exponent = attempt.saturating_sub(1).min(31) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.base.as_millis().max(1);
        let max_ms = self.max.as_millis().max(base_ms);
        let delay_ms = base_ms
            .saturating_mul(multiplier)
            .min(max_ms)
            .min(u64::MAX as u128) as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }
}
