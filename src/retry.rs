//! Bounded retry policy with capped exponential backoff.

use std::time::Duration;

/// How often, and how patiently, a rate-limited call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits, for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the given failed attempt (1-based).
    ///
    /// Doubles per attempt, capped at `max_backoff`. A server hint wins
    /// when it is longer, still subject to the cap.
    pub fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let computed = self
            .initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff);
        match hint {
            Some(hint) if hint > computed => hint.min(self.max_backoff),
            _ => computed,
        }
    }
}
