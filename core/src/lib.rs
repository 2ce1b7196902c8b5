//! Resilient completion orchestration for text-generation providers.
//!
//! This crate drives a truncation-prone provider to completion:
//!
//! - [`BackoffRetrier`] - Exponential backoff for transient provider errors
//! - [`RequestThrottle`] - Shared FIFO queue with a minimum dispatch interval
//! - [`validation`] - Structural completeness heuristics
//! - [`ContinuationLoop`] - State machine that re-requests "continue from here"
//!   until the text is complete or the attempt budget is spent
//!
//! The provider itself is reached through the [`GenerationProvider`] trait.

pub mod config;
pub mod continuation;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod retry;
pub mod throttle;
pub mod validation;

pub use config::{BalanceChecks, ContinuationConfig, RetryPolicy, ValidationConfig};
pub use continuation::{continuation_messages, ContinuationLoop, GenerationAttempt};
pub use error::{Cancelled, ContinuationError, ProviderError};
pub use metrics::{estimate_tokens, GenerationMetrics};
pub use provider::{
    FinishSignal, GenerationProvider, GenerationRequest, GenerationResponse, Message, Role,
};
pub use retry::{BackoffRetrier, Retryable};
pub use throttle::RequestThrottle;
pub use validation::{is_complete, IncompleteReason, Verdict};

/// Re-exported so callers can cancel runs without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;

/// Common traits and types for ergonomic usage of the orchestrator.
pub mod prelude {
    pub use crate::{
        CancellationToken, ContinuationConfig, ContinuationError, ContinuationLoop, FinishSignal,
        GenerationProvider, GenerationRequest, GenerationResponse, Message, ProviderError,
        RequestThrottle, RetryPolicy, ValidationConfig,
    };
}
