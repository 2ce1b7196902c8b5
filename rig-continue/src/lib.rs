//! # rig-continue
//!
//! Drive truncation-prone text generation to completion.
//!
//! A [`ContinuationLoop`](rig_continue_core::ContinuationLoop) sends a
//! conversation to a provider, checks whether the answer looks finished, and
//! asks the provider to "continue from" the accumulated text until it does.
//! Every provider call goes through a shared FIFO throttle and an exponential
//! backoff retrier.
//!
//! ## Example
//!
//! ```no_run
//! # use rig_continue::prelude::*;
//! # use std::sync::Arc;
//! # async fn example() -> Result<(), Error> {
//! let settings = Settings::load(None)?;
//! let provider = CommandProvider::discover(settings.command.path.clone())?;
//! let throttle = settings.throttle();
//!
//! let orchestrator = settings.build_loop(Arc::new(provider), throttle)?;
//! let (text, metrics) = orchestrator
//!     .generate_from_topic("Write a short essay.", "tide pools", &CancellationToken::new())
//!     .await?;
//! println!("{text}\n({} requests)", metrics.provider_requests);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Public error types.
pub mod errors;

/// Layered settings loading.
pub mod settings;

/// Tracing subscriber setup.
pub mod telemetry;

/// Commonly used types and traits.
pub mod prelude;

pub use errors::Error;
pub use settings::Settings;
pub use telemetry::init_tracing;

pub use rig_continue_core as orchestrator;
pub use rig_continue_provider as providers;
