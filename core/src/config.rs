//! Configuration for retries, completeness checks and continuation runs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ContinuationError;

/// Backoff schedule for transient provider failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 1s).
    pub initial_delay: Duration,
    /// Upper bound for any single delay (default: 30s).
    pub max_delay: Duration,
    /// Multiplier applied after each retry (default: 2.0).
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt and never sleeps.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 2.0,
        }
    }

    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Delay slept before retry number `retry` (0-based).
    ///
    /// Formula: `min(initial_delay * backoff_factor^retry, max_delay)`.
    ///
    /// ```
    /// use rig_continue_core::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    /// assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    /// assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    /// ```
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(scaled).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Checks the policy invariants.
    ///
    /// # Errors
    ///
    /// Returns `ContinuationError::InvalidConfig` when `max_attempts` is zero,
    /// the factor is not a finite number above 1, or `max_delay < initial_delay`.
    pub fn validate(&self) -> Result<(), ContinuationError> {
        if self.max_attempts == 0 {
            return Err(ContinuationError::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return Err(ContinuationError::InvalidConfig(format!(
                "retry backoff_factor must be greater than 1, got {}",
                self.backoff_factor
            )));
        }
        if self.max_delay < self.initial_delay {
            return Err(ContinuationError::InvalidConfig(format!(
                "retry max_delay ({:?}) is shorter than initial_delay ({:?})",
                self.max_delay, self.initial_delay
            )));
        }
        Ok(())
    }
}

/// Which structural balance rules the validator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct BalanceChecks {
    /// `\begin{..}` / `\end{..}` pairs (default: on).
    pub latex: bool,
    /// Triple-backtick fences (default: on).
    pub code_fence: bool,
    /// `[`/`{` against `]`/`}` for JSON-like payloads (default: off).
    pub bracket: bool,
}

impl Default for BalanceChecks {
    fn default() -> Self {
        Self {
            latex: true,
            code_fence: true,
            bracket: false,
        }
    }
}

impl BalanceChecks {
    /// All balance rules disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            latex: false,
            code_fence: false,
            bracket: false,
        }
    }

    /// All balance rules enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            latex: true,
            code_fence: true,
            bracket: true,
        }
    }
}

/// Suffixes that mark generated text as cut off.
pub const DEFAULT_TRUNCATION_INDICATORS: &[&str] =
    &["...", "\u{2026}", "[continued]", "to be continued"];

/// Rules the completeness validator applies to accumulated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Trailing markers that mean the text stopped early, matched exactly.
    pub truncation_indicators: Vec<String>,
    /// Enabled balance rules.
    pub check_balance: BalanceChecks,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            truncation_indicators: DEFAULT_TRUNCATION_INDICATORS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            check_balance: BalanceChecks::default(),
        }
    }
}

impl ValidationConfig {
    /// No indicators and no balance checks: every text is complete.
    #[must_use]
    pub const fn permissive() -> Self {
        Self {
            truncation_indicators: Vec::new(),
            check_balance: BalanceChecks::none(),
        }
    }

    /// Replace the truncation indicators.
    #[must_use]
    pub fn with_indicators<I, S>(mut self, indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.truncation_indicators = indicators.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the balance rules.
    #[must_use]
    pub const fn with_balance(mut self, checks: BalanceChecks) -> Self {
        self.check_balance = checks;
        self
    }
}

/// Settings for one continuation loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationConfig {
    /// Maximum provider requests per run, continuations included (default: 3).
    pub max_attempts: usize,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature (default: 0.7).
    pub temperature: f64,
    /// Output token budget per request (default: none).
    pub max_tokens: Option<u64>,
    /// Wall-clock limit for a whole run (default: none).
    pub deadline: Option<Duration>,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            model: String::new(),
            temperature: 0.7,
            max_tokens: None,
            deadline: None,
        }
    }
}

impl ContinuationConfig {
    /// Set the maximum number of provider requests per run.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-request token budget.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the run deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Checks the loop invariants.
    ///
    /// # Errors
    ///
    /// Returns `ContinuationError::InvalidConfig` when `max_attempts` is zero
    /// or the temperature is not finite.
    pub fn validate(&self) -> Result<(), ContinuationError> {
        if self.max_attempts == 0 {
            return Err(ContinuationError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.temperature.is_finite() {
            return Err(ContinuationError::InvalidConfig(format!(
                "temperature must be finite, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}
