//! Request/response contract between the orchestrator and a generation provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the provider.
    System,
    /// Caller input.
    User,
    /// Previously generated output.
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl Message {
    /// Creates a new message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Reason reported by the provider for ending a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishSignal {
    /// Natural completion.
    Stop,
    /// Cut off by the token budget.
    Length,
    /// The provider did not say.
    #[default]
    Unknown,
}

impl FinishSignal {
    /// Maps a provider finish reason string onto a signal.
    ///
    /// ```
    /// use rig_continue_core::FinishSignal;
    ///
    /// assert_eq!(FinishSignal::from_reason(Some("stop")), FinishSignal::Stop);
    /// assert_eq!(FinishSignal::from_reason(Some("max_tokens")), FinishSignal::Length);
    /// assert_eq!(FinishSignal::from_reason(None), FinishSignal::Unknown);
    /// ```
    #[must_use]
    pub fn from_reason(reason: Option<&str>) -> Self {
        match reason.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("stop" | "end_turn" | "stop_sequence") => Self::Stop,
            Some("length" | "max_tokens") => Self::Length,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for FinishSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Input to a single provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Ordered conversation.
    pub messages: Vec<Message>,
    /// Model identifier understood by the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output token budget, if the caller sets one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

/// Output of a single provider call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text, absent when the provider produced none.
    pub content: Option<String>,
    /// Finish signal reported alongside the text.
    #[serde(default)]
    pub finish: FinishSignal,
}

impl GenerationResponse {
    /// Creates a response carrying text and a finish signal.
    #[must_use]
    pub fn new(content: impl Into<String>, finish: FinishSignal) -> Self {
        Self {
            content: Some(content.into()),
            finish,
        }
    }

    /// Creates a response with no content.
    #[must_use]
    pub const fn empty(finish: FinishSignal) -> Self {
        Self {
            content: None,
            finish,
        }
    }
}

/// A text-generation backend the continuation loop can drive.
///
/// Implementations must not share mutable state with each other; each adapter
/// owns its own client.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Sends one request to the provider.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] classified as transient (rate limit,
    /// network, timeout) or permanent.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResponse, ProviderError>;
}
