//! Metrics tracking and token estimation for continuation runs.

use std::time::Duration;

/// Metrics collected during a continuation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationMetrics {
    /// Provider requests issued by the loop (transient retries not included).
    pub provider_requests: usize,
    /// Requests that were continuation directives.
    pub continuations: usize,
    /// Wall-clock time elapsed during the run.
    pub wall_time: Duration,
    /// Estimated input tokens sent to the provider.
    pub estimated_input_tokens: usize,
    /// Estimated output tokens received from the provider.
    pub estimated_output_tokens: usize,
}

/// Estimate token count from text using the standard 4-chars-per-token heuristic.
///
/// Uses `chars().count()` to handle UTF-8 correctly (not `len()` which counts bytes).
/// Returns ceiling division to avoid underestimation.
///
/// # Examples
///
/// ```
/// use rig_continue_core::metrics::estimate_tokens;
///
/// assert_eq!(estimate_tokens("hello"), 2);  // 5 chars / 4 = 1.25 -> 2
/// assert_eq!(estimate_tokens("hello world"), 3);  // 11 chars / 4 = 2.75 -> 3
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
