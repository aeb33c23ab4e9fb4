use std::time::Duration;

/// Retry schedule for the realtime socket.
///
/// No jitter: the scheduled delays are part of the observable contract of
/// the connection manager, not a tuning knob.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay scheduled before retry number `attempt` (zero-based):
    /// `min(base * multiplier^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Attempt cursor over a [`ReconnectPolicy`].
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Whether the retry budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }

    /// Delay for the upcoming retry; advances the cursor.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempt);
        self.attempt += 1;
        delay
    }

    /// A successful open ends the failure streak.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;
    use std::time::Duration;

    use crate::backoff::{Backoff, ReconnectPolicy};

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            multiplier: 1.5,
            max_attempts: 5,
        }
    }

    #[test]
    fn test_documented_schedule() {
        let mut backoff = Backoff::new(policy());

        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2250));
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn test_reset_restarts_the_schedule() {
        let mut backoff = Backoff::new(policy());
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let mut backoff = Backoff::new(policy());

        for _ in 0..5 {
            assert!(!backoff.is_exhausted());
            backoff.next_delay();
        }
        assert!(backoff.is_exhausted());
    }

    #[quickcheck]
    fn prop_delay_is_capped(attempt: u8) -> bool {
        policy().delay(attempt as u32) <= policy().max_delay
    }

    #[quickcheck]
    fn prop_delay_never_undershoots_base(attempt: u8) -> bool {
        policy().delay(attempt as u32) >= policy().base_delay
    }

    #[quickcheck]
    fn prop_delay_is_monotonic(attempt: u8) -> bool {
        let policy = policy();
        policy.delay(attempt as u32) <= policy.delay(attempt as u32 + 1)
    }

    #[quickcheck]
    fn prop_delay_matches_formula(attempt: u8) -> bool {
        let policy = policy();
        let expected = (1000f64 * 1.5f64.powi(attempt as i32)).min(10000f64) as u64;
        policy.delay(attempt as u32) == Duration::from_millis(expected)
    }
}
