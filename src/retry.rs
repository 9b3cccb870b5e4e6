//! Retry policies.
//!
//! A [`RetryPolicy`] is an immutable description of how many attempts an
//! operation gets, how the wait between attempts grows, whether each attempt
//! is raced against a deadline, and which kinds of failure may be retried.

use crate::error::StructuredError;
use crate::kind::{BuiltinKind, ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Reasons a policy is rejected before the first attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("backoff multiplier must be a finite number greater than zero, got {0}")]
    InvalidMultiplier(f64),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

impl From<PolicyError> for StructuredError {
    fn from(err: PolicyError) -> Self {
        StructuredError::validation(format!("Invalid retry policy: {err}"))
    }
}

/// Configurable retry policy for operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Wait before the first retry.
    #[serde(rename = "delay_ms", with = "millis")]
    pub delay: Duration,
    /// Factor applied to the wait after each retry.
    pub backoff_multiplier: f64,
    /// When set, only errors of these kinds are retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable_kinds: Option<Vec<ErrorKind>>,
    /// Deadline for each individual attempt.
    #[serde(
        rename = "timeout_ms",
        with = "opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            retryable_kinds: None,
            timeout: None,
        }
    }
}

/// What the executor does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then run the next attempt.
    Retry { delay: Duration },
    /// Surface the error to the caller.
    GiveUp,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the wait before the first retry.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Only retry errors of these kinds.
    pub fn with_retryable_kinds<I, K>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ErrorKind>,
    {
        self.retryable_kinds = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    /// Only retry network errors, timeouts and server errors.
    pub fn with_transient_kinds(mut self) -> Self {
        self.retryable_kinds = Some(transient_kinds());
        self
    }

    /// Race each attempt against this deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reject policies the executor cannot run.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(PolicyError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(PolicyError::ZeroTimeout);
        }
        Ok(())
    }

    /// Maximum number of times the operation runs.
    pub fn total_attempts(&self) -> u64 {
        u64::from(self.max_retries) + 1
    }

    /// Wait before retry number `retry` (0 for the first retry):
    /// `delay * backoff_multiplier^retry`, saturating.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let nanos = self.delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);

        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            Duration::from_nanos(u64::MAX)
        } else {
            Duration::from_nanos(nanos.max(0.0) as u64)
        }
    }

    /// Whether the allow-list, if any, admits this error's kind.
    pub fn allows_kind(&self, error: &StructuredError) -> bool {
        match &self.retryable_kinds {
            None => true,
            Some(kinds) => kinds.contains(&error.kind_or_unknown()),
        }
    }

    /// Decide what follows the failure of attempt `attempt` (0-based).
    pub fn decide(&self, attempt: u32, error: &StructuredError) -> RetryDecision {
        if attempt < self.max_retries && error.is_retryable() && self.allows_kind(error) {
            RetryDecision::Retry {
                delay: self.delay_for_retry(attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Predefined policies for the data-access layer.
impl RetryPolicy {
    /// For listing queries, which are safe to repeat.
    pub fn reads() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
            retryable_kinds: Some(transient_kinds()),
            timeout: Some(Duration::from_secs(8)),
        }
    }

    /// For submissions. Kept to a single retry because a retried write may be
    /// applied twice unless the backend honors the idempotency key.
    pub fn writes() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            retryable_kinds: Some(transient_kinds()),
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Run once, propagate immediately on failure.
    pub fn once() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

fn transient_kinds() -> Vec<ErrorKind> {
    BuiltinKind::ALL
        .into_iter()
        .filter(BuiltinKind::is_transient)
        .map(ErrorKind::Builtin)
        .collect()
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::millis::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
