use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    /// Error message from the failed attempt.
    pub error: String,
    /// When this attempt occurred.
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of recording a failure in a [`RetryBudget`].
#[derive(Debug, Clone)]
pub enum RetryDecision {
    Retry { attempt: u8 },
    Exhausted { history: Vec<RetryAttempt> },
}

/// Failure history of one call, with a fixed number of retries allowed.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_retries: u8,
    history: Vec<RetryAttempt>,
}

impl RetryBudget {
    pub fn new(max_retries: u8) -> Self {
        Self {
            max_retries,
            history: Vec::new(),
        }
    }

    /// Record a failed attempt and decide whether another one is allowed.
    pub fn record_failure(&mut self, error: impl Into<String>) -> RetryDecision {
        let attempt = self.history.len() as u8 + 1;
        self.history.push(RetryAttempt::new(attempt, error));

        if attempt <= self.max_retries {
            RetryDecision::Retry { attempt }
        } else {
            RetryDecision::Exhausted {
                history: std::mem::take(&mut self.history),
            }
        }
    }

    /// Number of failures recorded so far.
    pub fn failures(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[RetryAttempt] {
        &self.history
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)` (0-25% jitter)
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    let total_delay = delay_ms.saturating_add(jitter).min(max_ms);
    Duration::from_millis(total_delay)
}
