use std::fmt::Write;

use rig_continue_core::{Message, ProviderError, Role};

/// Flattens the conversation into a single plain-text transcript.
#[must_use]
pub fn format_transcript(messages: &[Message]) -> String {
    let mut prompt_str = String::new();

    for (index, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::System if index == 0 => {
                let _ = write!(prompt_str, "System: {}\n\n", msg.content);
            }
            Role::System => {
                let _ = writeln!(prompt_str, "System: {}", msg.content);
            }
            Role::User => {
                let _ = writeln!(prompt_str, "User: {}", msg.content);
            }
            Role::Assistant => {
                let _ = writeln!(prompt_str, "Assistant: {}", msg.content);
            }
        }
    }

    prompt_str
}

/// Classifies a free-form provider failure message.
///
/// Rate-limit wording maps to `RateLimited`, overload and connection wording
/// to `Network`, anything else to `Permanent`.
#[must_use]
pub fn classify_error_message(message: &str) -> ProviderError {
    let lower = message.to_lowercase();

    let rate_limited = ["429", "rate limit", "rate_limit", "ratelimit", "too many requests"]
        .iter()
        .any(|needle| lower.contains(needle));
    if rate_limited {
        return ProviderError::RateLimited(message.trim().to_string());
    }

    let transient = [
        "502",
        "503",
        "504",
        "overloaded",
        "connection reset",
        "connection refused",
        "broken pipe",
        "timed out",
        "temporarily unavailable",
    ]
    .iter()
    .any(|needle| lower.contains(needle));
    if transient {
        return ProviderError::Network(message.trim().to_string());
    }

    ProviderError::Permanent(message.trim().to_string())
}
