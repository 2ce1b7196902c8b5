//! Continuation loop: drive a provider until the accumulated text is complete.
//!
//! Each run moves through an explicit state machine:
//!
//! ```text
//! Idle -> Requesting -> Validating -> { Continuing -> Requesting | Done | Failed }
//! ```
//!
//! Provider calls go through the [`BackoffRetrier`] and every attempt is
//! admitted by the shared [`RequestThrottle`].

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{ContinuationConfig, RetryPolicy, ValidationConfig};
use crate::error::{ContinuationError, ProviderError};
use crate::metrics::{estimate_tokens, GenerationMetrics};
use crate::provider::{
    FinishSignal, GenerationProvider, GenerationRequest, GenerationResponse, Message, Role,
};
use crate::retry::BackoffRetrier;
use crate::throttle::RequestThrottle;
use crate::validation::{validate, Verdict};

/// Prefix of the user message that asks the provider to resume.
pub const CONTINUE_DIRECTIVE: &str = "Continue from: ";

/// Mutable state of one run. Text is only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationAttempt {
    accumulated_text: String,
    attempt_count: usize,
    last_finish_signal: FinishSignal,
}

impl GenerationAttempt {
    /// A fresh attempt with no text.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An attempt resuming from previously generated text.
    #[must_use]
    pub fn resumed(partial_text: impl Into<String>) -> Self {
        Self {
            accumulated_text: partial_text.into(),
            ..Self::default()
        }
    }

    /// Appends a segment, newline-joined to anything already accumulated.
    pub fn append(&mut self, segment: &str, finish: FinishSignal) {
        if !self.accumulated_text.is_empty() {
            self.accumulated_text.push('\n');
        }
        self.accumulated_text.push_str(segment);
        self.last_finish_signal = finish;
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.accumulated_text
    }

    /// Continuations counted against the attempt budget.
    #[must_use]
    pub const fn attempt_count(&self) -> usize {
        self.attempt_count
    }

    /// Finish signal of the latest response.
    #[must_use]
    pub const fn last_finish_signal(&self) -> FinishSignal {
        self.last_finish_signal
    }

    fn into_text(self) -> String {
        self.accumulated_text
    }
}

/// Builds the request for a continuation call.
///
/// The first initial message is kept verbatim. A trailing user message is
/// replaced by the directive; otherwise the directive is appended.
///
/// ```
/// use rig_continue_core::{continuation_messages, Message};
///
/// let initial = vec![Message::system("Write a report."), Message::user("Topic: tides")];
/// let next = continuation_messages(&initial, "Tides are");
/// assert_eq!(next, vec![Message::system("Write a report."), Message::user("Continue from: Tides are")]);
/// ```
#[must_use]
pub fn continuation_messages(initial: &[Message], accumulated: &str) -> Vec<Message> {
    let mut messages = initial.to_vec();
    if messages.len() > 1 && messages.last().is_some_and(|m| m.role == Role::User) {
        messages.pop();
    }
    messages.push(Message::user(format!("{CONTINUE_DIRECTIVE}{accumulated}")));
    messages
}

/// Whether a response ends the run.
///
/// `Length` always continues, `Stop` needs the validator to agree, and an
/// unknown signal defers to the validator alone.
#[must_use]
pub const fn is_done(finish: FinishSignal, verdict: &Verdict) -> bool {
    match finish {
        FinishSignal::Length => false,
        FinishSignal::Stop | FinishSignal::Unknown => verdict.is_complete(),
    }
}

enum LoopState {
    Requesting,
    Validating,
    Continuing,
    Done,
    Failed(ContinuationError),
}

/// Drives a [`GenerationProvider`] until its output is structurally complete.
#[derive(Clone)]
pub struct ContinuationLoop {
    provider: Arc<dyn GenerationProvider>,
    throttle: RequestThrottle,
    retrier: BackoffRetrier,
    validation: ValidationConfig,
    config: ContinuationConfig,
}

impl ContinuationLoop {
    /// Creates a loop with default configuration and an unthrottled queue.
    #[must_use]
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider,
            throttle: RequestThrottle::unthrottled(),
            retrier: BackoffRetrier::default(),
            validation: ValidationConfig::default(),
            config: ContinuationConfig::default(),
        }
    }

    /// Uses a shared throttle (fluent builder pattern).
    #[must_use]
    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the retry policy for transient provider errors.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retrier = BackoffRetrier::new(policy);
        self
    }

    /// Sets the completeness rules.
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    /// Sets the loop configuration.
    #[must_use]
    pub fn with_config(mut self, config: ContinuationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of provider requests per run.
    #[must_use]
    pub const fn max_attempts(mut self, max: usize) -> Self {
        self.config.max_attempts = max;
        self
    }

    /// The loop configuration.
    #[must_use]
    pub const fn config(&self) -> &ContinuationConfig {
        &self.config
    }

    /// The throttle shared by this loop.
    #[must_use]
    pub const fn throttle(&self) -> &RequestThrottle {
        &self.throttle
    }

    /// The provider this loop drives.
    #[must_use]
    pub fn provider(&self) -> &dyn GenerationProvider {
        self.provider.as_ref()
    }

    /// Runs the loop from the caller's initial messages.
    ///
    /// Returns the accumulated text and metrics once the output is complete.
    ///
    /// # Errors
    ///
    /// - `ContinuationError::Provider` when the provider fails permanently or
    ///   past the retry budget.
    /// - `ContinuationError::EmptyResponse` when a response carries no text.
    /// - `ContinuationError::IncompleteAfterMaxAttempts` when the text still
    ///   looks truncated after `max_attempts` requests.
    /// - `ContinuationError::Cancelled` / `DeadlineExceeded` on abort.
    /// - `ContinuationError::InvalidConfig` / `InvalidRequest` up front.
    pub async fn run(
        &self,
        messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<(String, GenerationMetrics), ContinuationError> {
        self.execute(messages, GenerationAttempt::new(), cancel).await
    }

    /// Generates a document about `topic` under the given instructions.
    pub async fn generate_from_topic(
        &self,
        instructions: &str,
        topic: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, GenerationMetrics), ContinuationError> {
        self.run(initial_messages(instructions, topic.to_string()), cancel)
            .await
    }

    /// Generates a document from a transcript under the given instructions.
    pub async fn generate_from_transcript(
        &self,
        instructions: &str,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, GenerationMetrics), ContinuationError> {
        self.run(
            initial_messages(instructions, format!("Transcript:\n{transcript}")),
            cancel,
        )
        .await
    }

    /// Resumes a run whose earlier output is `partial_text`.
    ///
    /// The first request is already a continuation request and the returned
    /// text starts with `partial_text`.
    pub async fn continue_generation(
        &self,
        messages: Vec<Message>,
        partial_text: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, GenerationMetrics), ContinuationError> {
        self.execute(messages, GenerationAttempt::resumed(partial_text), cancel)
            .await
    }

    async fn execute(
        &self,
        messages: Vec<Message>,
        attempt: GenerationAttempt,
        cancel: &CancellationToken,
    ) -> Result<(String, GenerationMetrics), ContinuationError> {
        self.config.validate()?;
        self.retrier.policy().validate()?;
        if messages.is_empty() {
            return Err(ContinuationError::InvalidRequest(
                "at least one message is required".to_string(),
            ));
        }

        match self.config.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.drive(&messages, attempt, cancel))
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!(
                        event = "generation_deadline_exceeded",
                        deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                        "generation_deadline_exceeded"
                    );
                    Err(ContinuationError::DeadlineExceeded { deadline })
                }),
            None => self.drive(&messages, attempt, cancel).await,
        }
    }

    async fn drive(
        &self,
        initial: &[Message],
        mut attempt: GenerationAttempt,
        cancel: &CancellationToken,
    ) -> Result<(String, GenerationMetrics), ContinuationError> {
        let start = Instant::now();
        let max_attempts = self.config.max_attempts;
        let mut metrics = GenerationMetrics::default();

        let mut messages = if attempt.text().is_empty() {
            initial.to_vec()
        } else {
            metrics.continuations += 1;
            continuation_messages(initial, attempt.text())
        };

        let mut state = LoopState::Requesting;
        loop {
            state = match state {
                LoopState::Requesting => {
                    if cancel.is_cancelled() {
                        return Err(ContinuationError::Cancelled);
                    }
                    metrics.provider_requests += 1;
                    metrics.estimated_input_tokens += messages
                        .iter()
                        .map(|m| estimate_tokens(&m.content))
                        .sum::<usize>();

                    tracing::info!(
                        event = "provider_request",
                        provider = self.provider.name(),
                        request = metrics.provider_requests,
                        messages = messages.len(),
                        "provider_request"
                    );

                    let response = self.dispatch(&messages, cancel).await?;
                    match response.content {
                        Some(content) if !content.trim().is_empty() => {
                            metrics.estimated_output_tokens += estimate_tokens(&content);
                            attempt.append(&content, response.finish);
                            LoopState::Validating
                        }
                        _ => LoopState::Failed(ContinuationError::EmptyResponse {
                            attempt: metrics.provider_requests,
                        }),
                    }
                }
                LoopState::Validating => {
                    let verdict = validate(attempt.text(), &self.validation);
                    let finish = attempt.last_finish_signal();
                    tracing::debug!(
                        event = "completeness_verdict",
                        finish = %finish,
                        complete = verdict.is_complete(),
                        reason = ?verdict,
                        "completeness_verdict"
                    );
                    if is_done(finish, &verdict) {
                        LoopState::Done
                    } else {
                        LoopState::Continuing
                    }
                }
                LoopState::Continuing => {
                    attempt.attempt_count += 1;
                    if attempt.attempt_count >= max_attempts {
                        metrics.wall_time = start.elapsed();
                        LoopState::Failed(ContinuationError::IncompleteAfterMaxAttempts {
                            attempts: metrics.provider_requests,
                            max_attempts,
                            partial_text: attempt.text().to_string(),
                            metrics: metrics.clone(),
                        })
                    } else {
                        tracing::info!(
                            event = "continuation_scheduled",
                            attempt = attempt.attempt_count,
                            max_attempts,
                            accumulated_chars = attempt.text().chars().count(),
                            "continuation_scheduled"
                        );
                        messages = continuation_messages(initial, attempt.text());
                        metrics.continuations += 1;
                        LoopState::Requesting
                    }
                }
                LoopState::Done => {
                    metrics.wall_time = start.elapsed();
                    tracing::info!(
                        event = "generation_complete",
                        requests = metrics.provider_requests,
                        continuations = metrics.continuations,
                        wall_time_ms = u64::try_from(metrics.wall_time.as_millis()).unwrap_or(u64::MAX),
                        "generation_complete"
                    );
                    return Ok((attempt.into_text(), metrics));
                }
                LoopState::Failed(error) => {
                    tracing::warn!(event = "generation_failed", error = %error, "generation_failed");
                    return Err(error);
                }
            };
        }
    }

    /// One provider call: retried on transient errors, each try admitted by the throttle.
    async fn dispatch(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError> {
        let request = GenerationRequest {
            messages: messages.to_vec(),
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let request = &request;
        let provider = self.provider.as_ref();
        let throttle = &self.throttle;

        self.retrier
            .run(
                || async move {
                    throttle
                        .admit(|| provider.generate(request), cancel)
                        .await
                        .unwrap_or_else(|cancelled| Err(cancelled.into()))
                },
                cancel,
            )
            .await
    }
}

fn initial_messages(instructions: &str, user: String) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !instructions.trim().is_empty() {
        messages.push(Message::system(instructions));
    }
    messages.push(Message::user(user));
    messages
}
