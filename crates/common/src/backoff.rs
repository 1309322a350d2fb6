use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Reconnect pacing as it appears in configuration.
///
/// Durations are expressed in milliseconds so the policy can be written
/// directly in TOML or overridden through environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// First retry delay.
    pub base_ms: u64,
    /// Upper bound for any single delay (before jitter).
    pub max_ms: u64,
    /// Jitter as a fraction of the delay, applied symmetrically.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 60_000,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Build a fresh backoff state machine from this policy.
    pub fn build(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.max_ms.max(self.base_ms)),
            self.jitter,
        )
    }
}

/// Exponential backoff with jitter for reconnection attempts.
///
/// Formula: min(max_delay, base * 2^attempt) +/- jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        BackoffPolicy::default().build()
    }
}

impl ExponentialBackoff {
    /// Create a new backoff.
    ///
    /// `jitter_factor` is clamped into `[0.0, 1.0]`.
    pub fn new(base: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt. Advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp_delay = self.base.saturating_mul(2u32.saturating_pow(self.attempt));
        let capped = exp_delay.min(self.max_delay);

        let spread = capped.as_secs_f64() * self.jitter_factor;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs_f64((capped.as_secs_f64() + jitter).max(0.0))
    }

    /// Feed back how long the last connection stayed up.
    ///
    /// A connection that survived `stable_after` clears the escalation so a
    /// single drop after hours of streaming retries quickly. Returns `true`
    /// when the counter was reset.
    pub fn record_uptime(&mut self, uptime: Duration, stable_after: Duration) -> bool {
        if uptime >= stable_after {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Reset the attempt counter.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base_secs: u64, max_secs: u64) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_secs(base_secs),
            Duration::from_secs(max_secs),
            0.0,
        )
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = no_jitter(1, 10);

        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_record_uptime_resets_only_when_stable() {
        let mut backoff = no_jitter(1, 60);
        backoff.next_delay();
        backoff.next_delay();

        assert!(!backoff.record_uptime(Duration::from_secs(5), Duration::from_secs(300)));
        assert_eq!(backoff.attempt(), 2);

        assert!(backoff.record_uptime(Duration::from_secs(300), Duration::from_secs(300)));
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(60), 0.2);

        let secs = backoff.next_delay().as_secs_f64();
        assert!((8.0..=12.0).contains(&secs), "delay was {}", secs);
    }

    #[test]
    fn test_negative_jitter_is_clamped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), -0.5);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_policy_never_caps_below_base() {
        let policy = BackoffPolicy {
            base_ms: 5_000,
            max_ms: 1_000,
            jitter: 0.0,
        };
        let mut backoff = policy.build();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: BackoffPolicy = serde_json::from_str(r#"{"base_ms": 250}"#).unwrap();
        assert_eq!(policy.base_ms, 250);
        assert_eq!(policy.max_ms, 60_000);
        assert_eq!(policy.jitter, 0.1);
    }
}
