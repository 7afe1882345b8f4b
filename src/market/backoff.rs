use std::time::Duration;

/// Exponential reconnect delay: `base * multiplier^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base_ms: u64,
    multiplier: f64,
    max_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        Self {
            base_ms,
            multiplier: if multiplier.is_finite() {
                multiplier.max(1.0)
            } else {
                1.0
            },
            max_ms: max_ms.max(base_ms),
        }
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let scaled = (self.base_ms as f64) * self.multiplier.powi(exponent);
        let bounded = scaled.min(self.max_ms as f64).max(self.base_ms as f64);
        Duration::from_millis(bounded as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_waits_base_delay() {
        let policy = BackoffPolicy::new(1_000, 1.8, 30_000);
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_800));
        assert_eq!(policy.delay_for(3), Duration::from_millis(3_240));
    }

    #[test]
    fn delays_are_non_decreasing_and_capped() {
        let policy = BackoffPolicy::new(1_000, 1.8, 30_000);
        let mut previous = Duration::ZERO;
        for attempt in 1..200 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "attempt {attempt} shrank the delay");
            assert!(delay <= policy.max());
            previous = delay;
        }
        assert_eq!(policy.delay_for(u32::MAX), policy.max());
    }

    #[test]
    fn degenerate_inputs_are_clamped() {
        let policy = BackoffPolicy::new(500, f64::NAN, 100);
        assert_eq!(policy.max(), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(500));

        let shrinking = BackoffPolicy::new(500, 0.5, 5_000);
        assert_eq!(shrinking.delay_for(5), Duration::from_millis(500));
    }
}
