//! Error taxonomy for provider calls and continuation runs.

use std::time::Duration;
use thiserror::Error;

use crate::metrics::GenerationMetrics;
use crate::retry::Retryable;

/// A queued or backing-off operation was aborted before it could run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled while waiting")]
pub struct Cancelled;

/// Errors raised by a generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider asked us to slow down.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Connection-level failure that may succeed on retry.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider did not answer in time.
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    /// Any other provider failure (auth, bad request, refusal).
    #[error("Provider error: {0}")]
    Permanent(String),

    /// The provider answered with something we could not interpret.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The call was cancelled before it was dispatched.
    #[error("Provider call cancelled")]
    Cancelled,
}

impl From<Cancelled> for ProviderError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Network(_) | Self::Timeout(_)
        )
    }
}

/// Errors that end a continuation run.
#[derive(Debug, Error)]
pub enum ContinuationError {
    /// The provider failed permanently, or transiently past the retry budget.
    #[error("Provider failed: {0}")]
    Provider(ProviderError),

    /// The provider returned no content; continuing would make no progress.
    #[error("Provider returned empty content at attempt {attempt}")]
    EmptyResponse {
        /// Provider request number (1-indexed) that came back empty.
        attempt: usize,
    },

    /// The output still looked truncated when the attempt budget ran out.
    #[error("Generation incomplete after {attempts} attempts (max: {max_attempts})")]
    IncompleteAfterMaxAttempts {
        /// Number of provider requests made.
        attempts: usize,
        /// Maximum attempts allowed.
        max_attempts: usize,
        /// Text accumulated so far, for diagnostics only.
        partial_text: String,
        /// Metrics tracked across all attempts.
        metrics: GenerationMetrics,
    },

    /// The caller cancelled the run.
    #[error("Generation cancelled")]
    Cancelled,

    /// The run deadline expired.
    #[error("Generation deadline of {deadline:?} exceeded")]
    DeadlineExceeded {
        /// The configured deadline.
        deadline: Duration,
    },

    /// The orchestrator configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller supplied an unusable request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ContinuationError {
    /// Returns true for caller-driven aborts (token or deadline).
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded { .. })
    }
}

impl From<ProviderError> for ContinuationError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Cancelled => Self::Cancelled,
            other => Self::Provider(other),
        }
    }
}
