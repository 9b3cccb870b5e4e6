//! Global retry configuration and environment variable handling.
//!
//! Zero-config defaults that can be overridden through environment variables,
//! loaded once and cached for the lifetime of the application.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Default retry behavior for the data-access layer.
///
/// Consumed by [`MenuRepository::new`](crate::repository::MenuRepository::new).
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub delay: Duration,
    /// Factor applied to the wait after each retry.
    pub backoff_multiplier: f64,
    /// Per-attempt deadline, if any.
    pub timeout: Option<Duration>,
    /// Whether failed reads and writes fall back to local data.
    pub fallback_enabled: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            timeout: None,
            fallback_enabled: true,
        }
    }
}

impl RetrySettings {
    /// Get global retry settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MENU_RETRY_MAX_RETRIES` | `3` | Retries after the first attempt |
    /// | `MENU_RETRY_DELAY_MS` | `100` | Wait before the first retry |
    /// | `MENU_RETRY_BACKOFF` | `2.0` | Backoff multiplier (must be > 0) |
    /// | `MENU_RETRY_TIMEOUT_MS` | unset | Per-attempt timeout; unset or `0` disables it |
    /// | `MENU_RETRY_FALLBACK` | `true` | Substitute local data when the backend is unreachable |
    ///
    /// Values that fail to parse keep their default.
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static SETTINGS: OnceLock<RetrySettings> = OnceLock::new();

        SETTINGS.get_or_init(|| Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).map(|value| value.trim().to_string());

        let max_retries = parsed("MENU_RETRY_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_retries);

        let delay = parsed("MENU_RETRY_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.delay);

        let backoff_multiplier = parsed("MENU_RETRY_BACKOFF")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(defaults.backoff_multiplier);

        let timeout = parsed("MENU_RETRY_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let fallback_enabled = parsed("MENU_RETRY_FALLBACK")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(defaults.fallback_enabled);

        Self {
            max_retries,
            delay,
            backoff_multiplier,
            timeout,
            fallback_enabled,
        }
    }

    /// The policy these settings describe, with no kind allow-list.
    pub fn default_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new()
            .with_max_retries(self.max_retries)
            .with_delay(self.delay)
            .with_backoff_multiplier(self.backoff_multiplier);

        match self.timeout {
            Some(timeout) => policy.with_timeout(timeout),
            None => policy,
        }
    }
}
