use rig::completion::{
    message::{AssistantContent, Message as RigMessage, UserContent},
    CompletionError, CompletionModel, CompletionRequest, CompletionResponse, Usage,
};
use rig::streaming::StreamingCompletionResponse;
use rig::OneOrMany;
use rig_continue_core::{
    CancellationToken, ContinuationConfig, ContinuationError, ContinuationLoop, FinishSignal,
    GenerationProvider, GenerationRequest, GenerationResponse, Message, ProviderError,
    RetryPolicy,
};
use rig_continue_provider::RigProvider;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the model saw on one completion call.
#[derive(Debug, Clone, PartialEq)]
struct SeenRequest {
    preamble: Option<String>,
    history: Vec<(&'static str, String)>,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
}

fn flatten(request: &CompletionRequest) -> SeenRequest {
    let history = request
        .chat_history
        .iter()
        .map(|msg| match msg {
            RigMessage::User { content } => (
                "user",
                content
                    .iter()
                    .map(|c| match c {
                        UserContent::Text(t) => t.text.clone(),
                        _ => String::new(),
                    })
                    .collect::<String>(),
            ),
            RigMessage::Assistant { content, .. } => (
                "assistant",
                content
                    .iter()
                    .map(|c| match c {
                        AssistantContent::Text(t) => t.text.clone(),
                        _ => String::new(),
                    })
                    .collect::<String>(),
            ),
        })
        .collect();

    SeenRequest {
        preamble: request.preamble.clone(),
        history,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

/// Replies from a script and records every request it receives.
#[derive(Clone, Default)]
struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<Vec<&'static str>, &'static str>>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<Vec<&'static str>, &'static str>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            seen: Arc::default(),
        }
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl CompletionModel for ScriptedModel {
    type Response = ();
    type StreamingResponse = ();
    type Client = Self;

    fn make(client: &Self::Client, _model: impl Into<String>) -> Self {
        client.clone()
    }

    async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        self.seen.lock().unwrap().push(flatten(&request));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err("script exhausted"));

        let parts = reply.map_err(|message| CompletionError::ProviderError(message.to_string()))?;
        let choice = OneOrMany::many(parts.into_iter().map(AssistantContent::text))
            .map_err(|_| CompletionError::ResponseError("no content".to_string()))?;

        Ok(CompletionResponse {
            choice,
            usage: Usage::default(),
            raw_response: (),
        })
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<StreamingCompletionResponse<Self::StreamingResponse>, CompletionError> {
        Err(CompletionError::ProviderError(
            "streaming is not scripted".to_string(),
        ))
    }
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

#[tokio::test]
async fn conversation_and_settings_reach_the_model() {
    let model = ScriptedModel::new(vec![Ok(vec!["Hel", "lo."])]);
    let provider = RigProvider::new(model.clone());

    let request = GenerationRequest {
        messages: vec![
            Message::system("Be terse."),
            Message::user("Hi"),
            Message::assistant("Hello"),
            Message::user("Continue from: Hello"),
        ],
        model: "scripted".to_string(),
        temperature: 0.25,
        max_tokens: Some(256),
    };
    let response = provider.generate(&request).await.unwrap();

    assert_eq!(response, GenerationResponse::new("Hello.", FinishSignal::Unknown));
    assert_eq!(
        model.seen(),
        vec![SeenRequest {
            preamble: Some("Be terse.".to_string()),
            history: vec![
                ("user", "Hi".to_string()),
                ("assistant", "Hello".to_string()),
                ("user", "Continue from: Hello".to_string()),
            ],
            temperature: Some(0.25),
            max_tokens: Some(256),
        }]
    );
}

#[tokio::test]
async fn empty_text_becomes_an_empty_response() {
    let model = ScriptedModel::new(vec![Ok(vec![""])]);
    let provider = RigProvider::new(model);

    let request = GenerationRequest {
        messages: vec![Message::user("Hi")],
        model: String::new(),
        temperature: 0.7,
        max_tokens: None,
    };
    let response = provider.generate(&request).await.unwrap();

    assert_eq!(response, GenerationResponse::empty(FinishSignal::Unknown));
}

#[tokio::test]
async fn completion_errors_are_classified_on_send() {
    let model = ScriptedModel::new(vec![Err("invalid api key")]);
    let provider = RigProvider::new(model);

    let request = GenerationRequest {
        messages: vec![Message::user("Hi")],
        model: String::new(),
        temperature: 0.7,
        max_tokens: None,
    };
    let err = provider.generate(&request).await.unwrap_err();

    assert!(matches!(err, ProviderError::Permanent(message) if message.contains("invalid api key")));
}

#[tokio::test]
async fn continuation_loop_finishes_an_open_environment() {
    let model = ScriptedModel::new(vec![
        Ok(vec!["\\begin{proof} Assume"]),
        Ok(vec!["the contrary. \\end{proof}"]),
    ]);
    let orchestrator = ContinuationLoop::new(Arc::new(RigProvider::new(model.clone())))
        .with_config(ContinuationConfig::default().with_temperature(0.1))
        .with_retry_policy(quick_retry());

    let (text, metrics) = orchestrator
        .generate_from_topic("Prove it.", "the lemma", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(text, "\\begin{proof} Assume\nthe contrary. \\end{proof}");
    assert_eq!(metrics.continuations, 1);

    let seen = model.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].preamble.as_deref(), Some("Prove it."));
    assert_eq!(seen[0].history, vec![("user", "the lemma".to_string())]);
    assert_eq!(seen[0].temperature, Some(0.1));
    assert_eq!(seen[1].preamble.as_deref(), Some("Prove it."));
    assert_eq!(
        seen[1].history,
        vec![("user", "Continue from: \\begin{proof} Assume".to_string())]
    );
}

#[tokio::test]
async fn rate_limited_completion_is_retried_by_the_loop() {
    let model = ScriptedModel::new(vec![
        Err("HTTP 429 Too Many Requests"),
        Ok(vec!["All done."]),
    ]);
    let orchestrator = ContinuationLoop::new(Arc::new(RigProvider::new(model.clone())))
        .with_retry_policy(quick_retry());

    let (text, metrics) = orchestrator
        .run(vec![Message::user("Hi")], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(text, "All done.");
    assert_eq!(metrics.provider_requests, 1);
    assert_eq!(model.seen().len(), 2);
}

#[tokio::test]
async fn empty_completion_stops_the_loop() {
    let model = ScriptedModel::new(vec![Ok(vec!["  "])]);
    let orchestrator = ContinuationLoop::new(Arc::new(RigProvider::new(model.clone())))
        .with_retry_policy(quick_retry());

    let err = orchestrator
        .run(vec![Message::user("Hi")], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ContinuationError::EmptyResponse { attempt: 1 }));
    assert_eq!(model.seen().len(), 1);
}
