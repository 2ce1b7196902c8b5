//! Resolution of the generation command executable.

use crate::errors::AdapterError;
use std::path::PathBuf;
use which::which;

/// Environment variable that overrides the command executable path.
pub const COMMAND_BIN_ENV_VAR: &str = "RIG_CONTINUE_COMMAND";

/// Locates the generation command.
///
/// Resolution order:
/// 1. `explicit_path` if provided and the file exists.
/// 2. The path in the `RIG_CONTINUE_COMMAND` environment variable.
/// 3. `fallback_name` resolved via `$PATH`.
///
/// A bare name passed as `explicit_path` is also looked up on `$PATH`.
///
/// # Errors
///
/// Returns `AdapterError::ExecutableNotFound` when no valid executable can be
/// located.
pub fn discover_command(
    explicit_path: Option<PathBuf>,
    fallback_name: &str,
) -> Result<PathBuf, AdapterError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path);
        }
        if path.components().count() == 1 {
            if let Ok(resolved) = which(&path) {
                return Ok(resolved);
            }
        }
        return Err(AdapterError::ExecutableNotFound(format!(
            "Explicit path does not exist: {}",
            path.display()
        )));
    }

    if let Ok(path_str) = std::env::var(COMMAND_BIN_ENV_VAR) {
        let path = PathBuf::from(path_str);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            event = "command_env_path_missing",
            path = %path.display(),
            "Ignoring {COMMAND_BIN_ENV_VAR}; path does not exist"
        );
    }

    which(fallback_name).map_err(|e| AdapterError::ExecutableNotFound(format!("{fallback_name}: {e}")))
}
