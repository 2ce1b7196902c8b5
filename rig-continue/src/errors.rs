//! Public error types for rig-continue.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the facade and the `rig-continue` binary.
///
/// Orchestrator and provider failures pass through unchanged so callers can
/// still match on the underlying variant.
#[derive(Debug, Error)]
pub enum Error {
    /// A continuation run failed.
    #[error("{0}")]
    Continuation(#[from] rig_continue_core::ContinuationError),

    /// A provider call failed outside a continuation run.
    #[error("{0}")]
    Provider(#[from] rig_continue_core::ProviderError),

    /// A provider adapter could not be constructed.
    #[error("{0}")]
    Adapter(#[from] rig_continue_provider::AdapterError),

    /// A setting is missing or out of range.
    #[error("Configuration error: {0}")]
    Settings(String),

    /// The settings file could not be read.
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`Settings`](crate::settings::Settings).
    #[error("Failed to parse settings: {0}")]
    Toml(#[from] toml::de::Error),
}
