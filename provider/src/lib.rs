#![deny(missing_docs)]
//! Provider adapters for the continuation orchestrator.
//!
//! Each adapter implements [`GenerationProvider`](rig_continue_core::GenerationProvider)
//! over a concrete backend: any Rig completion model, or an external command
//! that speaks JSON over stdin/stdout.

/// Adapter implementations for the supported backends.
pub mod adapters;
/// Executable discovery for the command adapter.
pub mod discovery;
/// Error types for adapter construction.
pub mod errors;
/// Utility functions.
pub mod utils;

// Re-export specific adapters for easier access
pub use adapters::command::{CommandConfig, CommandProvider, InputFormat};
pub use adapters::rig::RigProvider;
pub use discovery::{discover_command, COMMAND_BIN_ENV_VAR};
pub use errors::AdapterError;
