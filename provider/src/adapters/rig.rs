use crate::utils::classify_error_message;
use async_trait::async_trait;
use rig::completion::{
    message::AssistantContent, CompletionError, CompletionModel, Message as RigMessage,
};
use rig_continue_core::{
    FinishSignal, GenerationProvider, GenerationRequest, GenerationResponse, Message, ProviderError,
    Role,
};

/// A conversation split into the pieces a Rig completion request takes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RigConversation {
    /// System instructions joined into one preamble.
    pub preamble: Option<String>,
    /// Everything between the instructions and the final message.
    pub history: Vec<Message>,
    /// The final message, sent as the prompt.
    pub prompt: Option<Message>,
}

/// Splits messages into preamble, history and prompt.
///
/// System messages anywhere in the conversation are folded into the preamble.
#[must_use]
pub fn split_conversation(messages: &[Message]) -> RigConversation {
    let mut system = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        if message.role == Role::System {
            system.push(message.content.as_str());
        } else {
            rest.push(message.clone());
        }
    }

    let prompt = rest.pop();
    RigConversation {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history: rest,
        prompt,
    }
}

fn to_rig_message(message: &Message) -> RigMessage {
    match message.role {
        Role::Assistant => RigMessage::assistant(message.content.clone()),
        Role::User | Role::System => RigMessage::user(message.content.clone()),
    }
}

/// Maps a Rig completion failure onto the provider error taxonomy.
#[must_use]
pub fn classify_completion_error(error: &CompletionError) -> ProviderError {
    match error {
        CompletionError::HttpError(e) => match classify_error_message(&e.to_string()) {
            ProviderError::RateLimited(message) => ProviderError::RateLimited(message),
            _ => ProviderError::Network(e.to_string()),
        },
        CompletionError::JsonError(e) => ProviderError::InvalidResponse(e.to_string()),
        other => match classify_error_message(&other.to_string()) {
            ProviderError::RateLimited(message) => ProviderError::RateLimited(message),
            _ => ProviderError::Permanent(other.to_string()),
        },
    }
}

/// Generation provider backed by any Rig [`CompletionModel`].
///
/// Rig does not report why a completion stopped, so every response carries
/// [`FinishSignal::Unknown`] and completeness is left to the validator.
#[derive(Clone)]
pub struct RigProvider<M> {
    model: M,
    name: String,
}

impl<M> RigProvider<M>
where
    M: CompletionModel,
{
    /// Wraps a completion model.
    pub fn new(model: M) -> Self {
        Self {
            model,
            name: "rig".to_string(),
        }
    }

    /// Overrides the name reported to the orchestrator.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the wrapped model.
    pub const fn model(&self) -> &M {
        &self.model
    }
}

#[async_trait]
impl<M> GenerationProvider for RigProvider<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let conversation = split_conversation(&request.messages);
        let Some(prompt) = conversation.prompt else {
            return Err(ProviderError::Permanent(
                "conversation has no user or assistant message".to_string(),
            ));
        };

        let history: Vec<RigMessage> =
            conversation.history.iter().map(to_rig_message).collect();

        let mut builder = self
            .model
            .completion_request(to_rig_message(&prompt))
            .messages(history)
            .temperature(request.temperature);
        if let Some(preamble) = conversation.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        let response = builder.send().await.map_err(|e| {
            let error = classify_completion_error(&e);
            tracing::debug!(event = "rig_completion_failed", provider = %self.name, error = %e);
            error
        })?;

        let text = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<String>();

        if text.is_empty() {
            Ok(GenerationResponse::empty(FinishSignal::Unknown))
        } else {
            Ok(GenerationResponse::new(text, FinishSignal::Unknown))
        }
    }
}
