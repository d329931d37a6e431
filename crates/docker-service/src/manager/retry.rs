//! Automatic retry policy for attempts that got no response

use crate::transport::TransportOutcome;
use std::time::Duration;

/// How a finished attempt is treated by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// No response arrived and the failure came from the network
    Retryable,
    /// A response arrived, or the failure was local
    NonRetryable,
    /// The attempt succeeded
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Stop { reason: String },
}

/// Fixed-delay retry of transport failures where no response was received
#[derive(Debug, Clone)]
pub struct AutomaticRetry {
    time_before_retry: Duration,
}

impl AutomaticRetry {
    pub fn new(time_before_retry: Duration) -> Self {
        Self { time_before_retry }
    }

    pub fn time_before_retry(&self) -> Duration {
        self.time_before_retry
    }

    pub fn classify(&self, outcome: &TransportOutcome) -> ErrorClassification {
        match (&outcome.head, &outcome.error) {
            (Some(_), None) => ErrorClassification::Success,
            (Some(_), Some(_)) => ErrorClassification::NonRetryable,
            (None, Some(error)) if error.is_network() => ErrorClassification::Retryable,
            (None, Some(_)) => ErrorClassification::NonRetryable,
            // Nothing came back and nothing was reported: an unknown network failure.
            (None, None) => ErrorClassification::Retryable,
        }
    }

    pub fn should_retry(
        &self,
        outcome: &TransportOutcome,
        remaining_retries: u32,
        cancelled: bool,
    ) -> RetryDecision {
        if cancelled {
            return RetryDecision::Stop {
                reason: "Call was cancelled".to_string(),
            };
        }
        match self.classify(outcome) {
            ErrorClassification::Success => RetryDecision::Stop {
                reason: "Attempt succeeded".to_string(),
            },
            ErrorClassification::NonRetryable => RetryDecision::Stop {
                reason: "Error is not retryable".to_string(),
            },
            ErrorClassification::Retryable if remaining_retries == 0 => RetryDecision::Stop {
                reason: "No automatic retries left".to_string(),
            },
            ErrorClassification::Retryable => RetryDecision::Retry {
                delay: self.time_before_retry,
            },
        }
    }
}
