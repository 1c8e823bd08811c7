//! Retry and alerting policy attached to the error taxonomy.

use crate::error::ErrorKind;
use crate::ports::RandomSource;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff used when the configured schedule is empty.
pub const DEFAULT_BACKOFF_MS: [u64; 2] = [2, 8];

/// How failures of each [`ErrorKind`] are handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    /// Attempts per logical request, inclusive of the first one. At least 1.
    pub transient_max_attempts: u32,
    /// Sleep before retry `n` is `backoff_ms[n - 1]`, clamped to the last entry.
    pub backoff_ms: Vec<u64>,
    /// Upper bound of the uniform jitter added to every backoff sleep.
    pub jitter_ms: u64,
    /// Fire the alert side-channel on system failures.
    pub alert_on_system_error: bool,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            transient_max_attempts: 3,
            backoff_ms: DEFAULT_BACKOFF_MS.to_vec(),
            jitter_ms: 1,
            alert_on_system_error: false,
        }
    }
}

impl ErrorPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts (clamped to at least 1).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.transient_max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff schedule in milliseconds.
    pub fn backoff(mut self, schedule: impl Into<Vec<u64>>) -> Self {
        self.backoff_ms = schedule.into();
        self
    }

    /// Set the jitter upper bound in milliseconds.
    pub fn jitter(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    /// Enable or disable alerting on system failures.
    pub fn alert_on_system_error(mut self, enabled: bool) -> Self {
        self.alert_on_system_error = enabled;
        self
    }

    /// Attempts actually allowed, never below 1.
    pub fn attempts(&self) -> u32 {
        self.transient_max_attempts.max(1)
    }

    /// Whether a failure of `kind` on attempt `attempt` (1-based) gets another try.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.attempts()
    }

    pub fn should_alert(&self, kind: ErrorKind) -> bool {
        self.alert_on_system_error && kind.is_alertable()
    }

    /// Base delay after the failed attempt `attempt` (1-based), without jitter.
    pub fn base_backoff_ms(&self, attempt: u32) -> u64 {
        let schedule: &[u64] = if self.backoff_ms.is_empty() {
            &DEFAULT_BACKOFF_MS
        } else {
            &self.backoff_ms
        };
        let index = (attempt.saturating_sub(1) as usize).min(schedule.len() - 1);
        schedule[index]
    }

    /// Full sleep after the failed attempt `attempt`: base delay plus uniform jitter.
    pub fn backoff_delay(&self, attempt: u32, random: &dyn RandomSource) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0.0
        } else {
            random.uniform01() * self.jitter_ms as f64
        };
        Duration::from_millis(self.base_backoff_ms(attempt))
            + Duration::from_micros((jitter * 1000.0).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FixedRandom;

    #[test]
    fn should_index_schedule_by_attempt() {
        let policy = ErrorPolicy::new().backoff(vec![2, 8, 20]);
        assert_eq!(policy.base_backoff_ms(1), 2);
        assert_eq!(policy.base_backoff_ms(2), 8);
        assert_eq!(policy.base_backoff_ms(3), 20);
    }

    #[test]
    fn should_clamp_to_last_entry_when_attempts_exceed_schedule() {
        let policy = ErrorPolicy::new().backoff(vec![5, 7]);
        assert_eq!(policy.base_backoff_ms(9), 7);
    }

    #[test]
    fn should_fall_back_to_default_schedule_when_empty() {
        let policy = ErrorPolicy::new().backoff(Vec::new());
        assert_eq!(policy.base_backoff_ms(1), 2);
        assert_eq!(policy.base_backoff_ms(2), 8);
        assert_eq!(policy.base_backoff_ms(3), 8);
    }

    #[test]
    fn should_add_jitter_within_bound() {
        let policy = ErrorPolicy::new().backoff(vec![10]).jitter(4);
        let delay = policy.backoff_delay(1, &FixedRandom::new(0.5));
        assert_eq!(delay, Duration::from_millis(12));

        let delay = policy.backoff_delay(1, &FixedRandom::new(0.0));
        assert_eq!(delay, Duration::from_millis(10));
    }

    #[test]
    fn should_retry_transient_only_while_attempts_remain() {
        let policy = ErrorPolicy::new().max_attempts(2);
        assert!(policy.should_retry(ErrorKind::Transient, 1));
        assert!(!policy.should_retry(ErrorKind::Transient, 2));
        assert!(!policy.should_retry(ErrorKind::Validation, 1));
        assert!(!policy.should_retry(ErrorKind::System, 1));
    }

    #[test]
    fn should_never_allow_zero_attempts() {
        let policy = ErrorPolicy {
            transient_max_attempts: 0,
            ..ErrorPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
        assert_eq!(ErrorPolicy::new().max_attempts(0).transient_max_attempts, 1);
    }

    #[test]
    fn should_alert_only_when_enabled_and_system() {
        let policy = ErrorPolicy::new().alert_on_system_error(true);
        assert!(policy.should_alert(ErrorKind::System));
        assert!(!policy.should_alert(ErrorKind::Transient));
        assert!(!ErrorPolicy::new().should_alert(ErrorKind::System));
    }
}
