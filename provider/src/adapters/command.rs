use crate::discovery::discover_command;
use crate::errors::AdapterError;
use crate::utils::{classify_error_message, format_transcript};
use async_trait::async_trait;
use rig_continue_core::{
    FinishSignal, GenerationProvider, GenerationRequest, GenerationResponse, ProviderError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

/// Exit code a command uses to report a temporary failure (`EX_TEMPFAIL`).
pub const EXIT_TEMPFAIL: i32 = 75;

/// Executable looked up on `$PATH` when nothing else is configured.
pub const DEFAULT_COMMAND_NAME: &str = "rig-continue-backend";

/// How the request is written to the command's stdin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// The full request serialized as JSON.
    #[default]
    Json,
    /// A flattened `Role: text` transcript.
    Transcript,
}

/// Configuration for a [`CommandProvider`].
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments passed on every call.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
    /// Per-call time limit.
    pub timeout: Duration,
    /// Stdin encoding.
    pub input: InputFormat,
}

impl CommandConfig {
    /// Creates a configuration for `program` with a 120 second timeout.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(120),
            input: InputFormat::Json,
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Sets the per-call time limit.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the stdin encoding.
    #[must_use]
    pub const fn input(mut self, input: InputFormat) -> Self {
        self.input = input;
        self
    }
}

/// Structured stdout a command may print instead of raw text.
#[derive(Debug, Deserialize)]
struct CommandOutput {
    content: Option<String>,
    finish_reason: Option<String>,
    error: Option<CommandFailure>,
}

#[derive(Debug, Deserialize)]
struct CommandFailure {
    kind: Option<String>,
    message: String,
}

impl CommandFailure {
    fn into_provider_error(self) -> ProviderError {
        match self.kind.as_deref() {
            Some("rate_limit" | "rate_limited") => ProviderError::RateLimited(self.message),
            Some("network" | "overloaded") => ProviderError::Network(self.message),
            Some("permanent") => ProviderError::Permanent(self.message),
            _ => classify_error_message(&self.message),
        }
    }
}

/// Generation provider backed by an external executable.
///
/// Each call spawns the command, writes the request to stdin and reads the
/// answer from stdout. The child is killed if the call is dropped or times out.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    config: CommandConfig,
    name: String,
}

impl CommandProvider {
    /// Wraps an already-resolved command configuration.
    #[must_use]
    pub fn new(config: CommandConfig) -> Self {
        let name = config
            .program
            .file_name()
            .map_or_else(|| "command".to_string(), |n| n.to_string_lossy().into_owned());
        Self { config, name }
    }

    /// Resolves the executable and builds a provider for it.
    ///
    /// # Errors
    /// Returns `AdapterError::ExecutableNotFound` if discovery fails.
    pub fn discover(explicit_path: Option<PathBuf>) -> Result<Self, AdapterError> {
        let program = discover_command(explicit_path, DEFAULT_COMMAND_NAME)?;
        Ok(Self::new(CommandConfig::new(program)))
    }

    /// Replaces the configuration, keeping the resolved program.
    #[must_use]
    pub fn with_config(mut self, config: CommandConfig) -> Self {
        let program = std::mem::take(&mut self.config.program);
        self.config = CommandConfig { program, ..config };
        self
    }

    /// Overrides the name reported to the orchestrator.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &CommandConfig {
        &self.config
    }

    fn encode(&self, request: &GenerationRequest) -> Result<Vec<u8>, ProviderError> {
        match self.config.input {
            InputFormat::Json => serde_json::to_vec(request)
                .map_err(|e| ProviderError::Permanent(format!("failed to encode request: {e}"))),
            InputFormat::Transcript => Ok(format_transcript(&request.messages).into_bytes()),
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Interprets a command's stdout.
///
/// A JSON object carrying `content` or `error` is decoded; anything else is
/// taken verbatim as the generated text with an unknown finish signal.
///
/// # Errors
/// Returns the error the command reported in its `error` object.
pub fn parse_output(stdout: &str) -> Result<GenerationResponse, ProviderError> {
    let trimmed = stdout.trim();
    if trimmed.starts_with('{') {
        if let Ok(output) = serde_json::from_str::<CommandOutput>(trimmed) {
            if let Some(failure) = output.error {
                return Err(failure.into_provider_error());
            }
            if output.content.is_some() || output.finish_reason.is_some() {
                return Ok(GenerationResponse {
                    content: output.content,
                    finish: FinishSignal::from_reason(output.finish_reason.as_deref()),
                });
            }
        }
    }

    let text = stdout.trim_end_matches(['\r', '\n']);
    if text.is_empty() {
        Ok(GenerationResponse::empty(FinishSignal::Unknown))
    } else {
        Ok(GenerationResponse::new(text, FinishSignal::Unknown))
    }
}

/// Maps a non-zero exit to a provider error.
#[must_use]
pub fn classify_exit(code: Option<i32>, stderr: &str) -> ProviderError {
    let detail = if stderr.trim().is_empty() {
        format!("command exited with {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))
    } else {
        stderr.trim().to_string()
    };

    match code {
        Some(EXIT_TEMPFAIL) => ProviderError::Network(detail),
        _ => match classify_error_message(&detail) {
            ProviderError::RateLimited(message) => ProviderError::RateLimited(message),
            _ => ProviderError::Permanent(detail),
        },
    }
}

#[async_trait]
impl GenerationProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let payload = self.encode(request)?;
        let start_time = Instant::now();

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        for (k, v) in &self.config.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ProviderError::Permanent(format!(
                "failed to spawn {}: {e}",
                self.config.program.display()
            ))
        })?;

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ProviderError::Permanent(
                "command pipes were not captured".to_string(),
            ));
        };

        tracing::debug!(
            event = "command_spawned",
            provider = %self.name,
            program = %self.config.program.display(),
            bytes = payload.len()
        );

        // A command may exit without draining stdin; the broken pipe is not an error.
        let stdin_task = tokio::spawn(async move {
            let _ = stdin.write_all(&payload).await;
            let _ = stdin.shutdown().await;
        });
        let stdout_task = tokio::spawn(read_all(stdout));
        let stderr_task = tokio::spawn(read_all(stderr));

        let wait_task = async {
            let status = child.wait().await?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            let _ = stdin_task.await;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let waited = timeout(self.config.timeout, wait_task).await;
        let (status, stdout, stderr) = match waited {
            Ok(res) => res.map_err(|e| ProviderError::Network(e.to_string()))?,
            Err(_) => {
                let _ = child.kill().await;
                tracing::warn!(
                    event = "command_timeout",
                    provider = %self.name,
                    timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
                );
                return Err(ProviderError::Timeout(self.config.timeout));
            }
        };

        let duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
        if !status.success() {
            let error = classify_exit(status.code(), &stderr);
            tracing::warn!(
                event = "command_failed",
                provider = %self.name,
                exit_code = ?status.code(),
                duration_ms,
                error = %error
            );
            return Err(error);
        }

        tracing::debug!(
            event = "command_finished",
            provider = %self.name,
            duration_ms,
            stdout_bytes = stdout.len()
        );
        parse_output(&stdout)
    }
}
