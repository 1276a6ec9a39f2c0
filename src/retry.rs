//! Retry policies and the backoff decision engine.
//!
//! A [`RetryConfig`] is the partial, user-facing description of a policy: any
//! field may be omitted. The client-level config and an optional per-call config
//! are merged with [`RetryConfig::merge`] and then resolved into an immutable
//! [`RetryPolicy`]. During one dispatch a [`Backoff`] walks that policy, turning
//! each observed status code into a [`RetryDecision`].
//!
//! Nothing here sleeps or performs I/O. The async and blocking dispatchers share
//! this logic and differ only in how they wait for the returned delay.

use crate::{Error, Result};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Initial delay used when the config leaves it unset, in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

/// Maximum delay used when the config leaves it unset, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Partial retry configuration.
///
/// Delays are expressed in milliseconds. Omitting `status_codes` or
/// `max_retries` disables retries entirely.
///
/// # Examples
///
/// ```
/// use sdk_dispatch::RetryConfig;
///
/// let client_level = RetryConfig::new()
///     .status_codes([429, 5])
///     .max_retries(2)
///     .initial_delay(500);
/// let per_call = RetryConfig::new().initial_delay(200);
///
/// let policy = client_level.merge(Some(&per_call)).resolve().unwrap();
/// assert_eq!(policy.max_retries, 2);
/// assert_eq!(policy.initial_delay.as_millis(), 200);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Status codes that trigger a retry: an exact code (100..=599) or a
    /// hundreds selector (0..=5, e.g. `5` for every 5xx).
    #[serde(alias = "statusCodes", skip_serializing_if = "Option::is_none")]
    pub status_codes: Option<Vec<u16>>,
    /// Wait before the first retry.
    #[serde(alias = "initialDelay", skip_serializing_if = "Option::is_none")]
    pub initial_delay: Option<u64>,
    /// Upper bound for any single wait.
    #[serde(alias = "maxDelay", skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<u64>,
    /// Factor applied to the current wait to get the next one.
    #[serde(alias = "backoffFactor", skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f64>,
    /// Retries allowed after the first attempt; `5` means up to 6 requests.
    #[serde(alias = "maxRetries", skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl RetryConfig {
    /// Creates an empty config that disables retries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retryable status codes.
    pub fn status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Sets the initial delay in milliseconds.
    pub fn initial_delay(mut self, millis: u64) -> Self {
        self.initial_delay = Some(millis);
        self
    }

    /// Sets the maximum delay in milliseconds.
    pub fn max_delay(mut self, millis: u64) -> Self {
        self.max_delay = Some(millis);
        self
    }

    /// Sets the backoff factor.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Merges a request-scoped override over this config, field by field.
    pub fn merge(&self, overrides: Option<&RetryConfig>) -> RetryConfig {
        let Some(overrides) = overrides else {
            return self.clone();
        };

        RetryConfig {
            status_codes: overrides
                .status_codes
                .clone()
                .or_else(|| self.status_codes.clone()),
            initial_delay: overrides.initial_delay.or(self.initial_delay),
            max_delay: overrides.max_delay.or(self.max_delay),
            backoff_factor: overrides.backoff_factor.or(self.backoff_factor),
            max_retries: overrides.max_retries.or(self.max_retries),
        }
    }

    /// Fills in defaults and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for status codes outside `0..=5`
    /// and `100..=599`, and for a negative or non-finite backoff factor.
    pub fn resolve(&self) -> Result<RetryPolicy> {
        let status_codes = self.status_codes.clone().unwrap_or_default();
        if let Some(code) = status_codes
            .iter()
            .find(|code| !(**code <= 5 || (100..=599).contains(*code)))
        {
            return Err(Error::ConfigurationError(format!(
                "retry status code {} is neither a range selector (0-5) \
                 nor a status code (100-599)",
                code
            )));
        }

        let backoff_factor = self.backoff_factor.unwrap_or(1.0);
        if !backoff_factor.is_finite() || backoff_factor < 0.0 {
            return Err(Error::ConfigurationError(format!(
                "retry backoff factor must be a finite, non-negative number, got {}",
                backoff_factor
            )));
        }

        Ok(RetryPolicy {
            status_codes,
            initial_delay: Duration::from_millis(
                self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY_MS),
            ),
            max_delay: Duration::from_millis(self.max_delay.unwrap_or(DEFAULT_MAX_DELAY_MS)),
            backoff_factor,
            max_retries: self.max_retries.unwrap_or(0),
        })
    }
}

/// A resolved, immutable retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Exact codes or hundreds selectors that trigger a retry.
    pub status_codes: Vec<u16>,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Factor applied to the current wait to get the next one.
    pub backoff_factor: f64,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            status_codes: Vec::new(),
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_factor: 1.0,
            max_retries: 0,
        }
    }
}

impl RetryPolicy {
    /// Starts tracking the attempts of one dispatch under this policy.
    pub fn backoff(&self) -> Backoff<'_> {
        Backoff::new(self)
    }
}

/// Returns `true` if `status` matches any of the configured retry codes.
///
/// A configured code below 6 matches its whole hundreds range (`4` matches
/// 400..=499); any other code must match exactly.
///
/// # Examples
///
/// ```
/// use sdk_dispatch::retry::should_retry;
///
/// assert!(should_retry(503, &[5]));
/// assert!(should_retry(429, &[429, 5]));
/// assert!(!should_retry(404, &[5]));
/// assert!(!should_retry(500, &[]));
/// ```
pub fn should_retry(status: u16, retry_codes: &[u16]) -> bool {
    retry_codes.iter().any(|&code| {
        if code < 6 {
            code * 100 <= status && status < (code + 1) * 100
        } else {
            status == code
        }
    })
}

/// What the dispatcher does after observing one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The response is successful; hand it back.
    Done,
    /// Wait for the delay, then send the request again.
    RetryAfter(Duration),
    /// Stop and report the response as an API error.
    GiveUp,
}

/// Attempt state for a single dispatch.
///
/// Created per dispatch and dropped when it terminates.
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    retries: u32,
    current_delay: Duration,
}

impl<'a> Backoff<'a> {
    /// Creates attempt state with no retries performed yet.
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            retries: 0,
            current_delay: policy.initial_delay,
        }
    }

    /// Number of retries decided so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Decides what to do with a response carrying `status`.
    ///
    /// The first retry waits `initial_delay`; each later wait is the previous
    /// one multiplied by `backoff_factor`, capped at `max_delay`.
    pub fn next_decision(&mut self, status: StatusCode) -> RetryDecision {
        if status.is_success() {
            return RetryDecision::Done;
        }

        if self.retries >= self.policy.max_retries
            || !should_retry(status.as_u16(), &self.policy.status_codes)
        {
            return RetryDecision::GiveUp;
        }

        let delay = self.current_delay;
        self.current_delay =
            Duration::try_from_secs_f64(delay.as_secs_f64() * self.policy.backoff_factor)
                .unwrap_or(self.policy.max_delay)
                .min(self.policy.max_delay);
        self.retries += 1;

        RetryDecision::RetryAfter(delay)
    }
}
