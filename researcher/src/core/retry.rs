//! Retry decisions for worker oracle requests.

use std::time::Duration;

use crate::core::types::FailureKind;

/// Backoff settings for a worker's oracle requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Rate-limit backoff grows linearly: `unit * attempt`.
    pub rate_limit_unit: Duration,
    /// Fixed delay between attempts after a transient API error.
    pub api_error_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_unit: Duration::from_secs(2),
            api_error_delay: Duration::from_secs(2),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then issue the same request again.
    RetryAfter(Duration),
    /// The payload is too large; retrying cannot help.
    SizeLimit,
    /// Stop retrying; the request failed.
    GiveUp,
}

impl RetryPolicy {
    /// Decide the next step after attempt number `attempt` (1-indexed) failed
    /// with `kind`.
    pub fn decide(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        let attempts_left = attempt < self.max_attempts;
        match kind {
            FailureKind::PayloadTooLarge => RetryDecision::SizeLimit,
            FailureKind::RateLimited if attempts_left => {
                RetryDecision::RetryAfter(self.rate_limit_unit * attempt)
            }
            FailureKind::Transient if attempts_left => {
                RetryDecision::RetryAfter(self.api_error_delay)
            }
            FailureKind::RateLimited | FailureKind::Transient | FailureKind::Fatal => {
                RetryDecision::GiveUp
            }
        }
    }
}
