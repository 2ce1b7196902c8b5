use thiserror::Error;

/// Errors raised while constructing provider adapters.
///
/// Failures during generation are reported as
/// [`ProviderError`](rig_continue_core::ProviderError) instead.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The command executable could not be located.
    #[error("Command executable not found: {0}")]
    ExecutableNotFound(String),
}
