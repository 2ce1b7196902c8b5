//! Common imports for rig-continue usage.
//!
//! ```
//! use rig_continue::prelude::*;
//! ```

// Orchestrator types
pub use rig_continue_core::prelude::*;
pub use rig_continue_core::GenerationMetrics;

// Adapters
pub use rig_continue_provider::{CommandConfig, CommandProvider, InputFormat, RigProvider};

// Facade
pub use crate::errors::Error;
pub use crate::settings::Settings;
pub use crate::telemetry::init_tracing;

// Re-export the Rig trait needed to turn a client into a completion model
pub use rig::client::CompletionClient;
