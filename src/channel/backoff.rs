use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Exponential reconnect schedule with a fixed ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Fraction of each delay applied as random ± jitter (0.0 disables it).
    pub jitter: f64,
}

impl BackoffPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_delay_ms.max(1)),
            max: Duration::from_secs(config.max_delay_secs.max(1)),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Stateful delay generator: doubles after every failure, resets on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.initial.min(policy.max),
            attempt: 0,
        }
    }

    /// Failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next attempt. Never exceeds the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.attempt += 1;
        self.current = base.saturating_mul(2).min(self.policy.max);

        if self.policy.jitter <= 0.0 {
            return base;
        }
        let spread = base.as_secs_f64() * self.policy.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        let jittered = Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0));
        jittered.min(self.policy.max)
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial.min(self.policy.max);
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, max_ms: u64, jitter: f64) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            jitter,
        }
    }

    #[test]
    fn doubles_until_ceiling() {
        let mut backoff = Backoff::new(policy(100, 1000, 0.0));
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(backoff.attempt(), 6);
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut backoff = Backoff::new(policy(50, 400, 0.0));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut backoff = Backoff::new(policy(1000, 4000, 0.5));
        for _ in 0..50 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_millis(4000));
        }
        let mut fresh = Backoff::new(policy(1000, 4000, 0.5));
        let first = fresh.next_delay();
        assert!(first >= Duration::from_millis(500));
        assert!(first <= Duration::from_millis(1500));
    }

    #[test]
    fn initial_above_ceiling_is_clamped() {
        let mut backoff = Backoff::new(policy(5000, 1000, 0.0));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn from_config_clamps_jitter() {
        let config = ReconnectConfig {
            initial_delay_ms: 0,
            max_delay_secs: 0,
            jitter: 3.0,
        };
        let policy = BackoffPolicy::from_config(&config);
        assert_eq!(policy.initial, Duration::from_millis(1));
        assert_eq!(policy.max, Duration::from_secs(1));
        assert!((policy.jitter - 1.0).abs() < f64::EPSILON);
    }
}
