//! Layered settings: defaults, then a TOML file, then `RIG_CONTINUE_*`
//! environment variables.

use crate::errors::Error;
use rig_continue_core::{
    ContinuationConfig, ContinuationLoop, GenerationProvider, RequestThrottle, RetryPolicy,
    ValidationConfig,
};
use rig_continue_provider::{CommandConfig, InputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "RIG_CONTINUE_";

/// Generation parameters for each continuation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output token budget per request.
    pub max_tokens: Option<u64>,
    /// Provider requests per run, continuations included.
    pub max_attempts: usize,
    /// Wall-clock limit for a run, in seconds.
    pub deadline_secs: Option<u64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let config = ContinuationConfig::default();
        Self {
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_attempts: config.max_attempts,
            deadline_secs: None,
        }
    }
}

/// Backoff schedule for transient provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per provider call, the first included.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor between delays.
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: duration_ms(policy.initial_delay),
            max_delay_ms: duration_ms(policy.max_delay),
            backoff_factor: policy.backoff_factor,
        }
    }
}

/// Shared dispatch pacing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    /// Maximum dispatches per second; zero or absent disables pacing.
    pub requests_per_second: Option<f64>,
}

/// External command used by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Executable path (None = discover).
    pub path: Option<PathBuf>,
    /// Arguments passed on every call.
    pub args: Vec<String>,
    /// Per-call time limit, in seconds.
    pub timeout_secs: u64,
    /// Stdin encoding.
    pub input: InputFormat,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            timeout_secs: 120,
            input: InputFormat::Json,
        }
    }
}

/// Complete rig-continue settings.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Per-run generation parameters.
    pub generation: GenerationSettings,
    /// Retry schedule for transient errors.
    pub retry: RetrySettings,
    /// Dispatch pacing.
    pub throttle: ThrottleSettings,
    /// Completeness heuristics.
    pub validation: ValidationConfig,
    /// External command settings.
    pub command: CommandSettings,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Settings(format!("{ENV_PREFIX}{key}={raw:?}: {e}")))
}

impl Settings {
    /// Default settings file: `<config_dir>/rig-continue/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rig-continue").join("config.toml"))
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    /// Returns `Error::Toml` if the text is malformed.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Reads settings from a TOML file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, `Error::Toml` if it is
    /// malformed.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolves settings from all layers.
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// when present. Environment overrides are applied last.
    ///
    /// # Errors
    /// Propagates file, parse and environment errors.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(default) => {
                    tracing::debug!(event = "settings_file", path = %default.display());
                    Self::from_file(&default)?
                }
                None => Self::default(),
            },
        };
        settings.apply_env()?;
        Ok(settings)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Settings` when a variable does not parse.
    pub fn apply_env(&mut self) -> Result<(), Error> {
        self.apply_env_from(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Applies overrides using `lookup`, which receives the variable name
    /// without the `RIG_CONTINUE_` prefix.
    ///
    /// # Errors
    /// Returns `Error::Settings` when a value does not parse.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("TEMPERATURE") {
            self.generation.temperature = parse_value("TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("MAX_TOKENS") {
            self.generation.max_tokens = Some(parse_value("MAX_TOKENS", &v)?);
        }
        if let Some(v) = lookup("MAX_ATTEMPTS") {
            self.generation.max_attempts = parse_value("MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("DEADLINE_SECS") {
            self.generation.deadline_secs = Some(parse_value("DEADLINE_SECS", &v)?);
        }
        if let Some(v) = lookup("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_value("RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("RETRY_INITIAL_DELAY_MS") {
            self.retry.initial_delay_ms = parse_value("RETRY_INITIAL_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_value("RETRY_MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("RETRY_BACKOFF_FACTOR") {
            self.retry.backoff_factor = parse_value("RETRY_BACKOFF_FACTOR", &v)?;
        }
        if let Some(v) = lookup("REQUESTS_PER_SECOND") {
            self.throttle.requests_per_second = Some(parse_value("REQUESTS_PER_SECOND", &v)?);
        }
        if let Some(v) = lookup("COMMAND") {
            self.command.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("COMMAND_TIMEOUT_SECS") {
            self.command.timeout_secs = parse_value("COMMAND_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    /// Per-run loop configuration.
    #[must_use]
    pub fn continuation_config(&self) -> ContinuationConfig {
        let generation = &self.generation;
        ContinuationConfig {
            max_attempts: generation.max_attempts,
            model: generation.model.clone(),
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            deadline: generation.deadline_secs.map(Duration::from_secs),
        }
    }

    /// Retry policy for provider calls.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_factor: self.retry.backoff_factor,
        }
    }

    /// A fresh throttle; clone it to share between loops.
    #[must_use]
    pub fn throttle(&self) -> RequestThrottle {
        self.throttle
            .requests_per_second
            .map_or_else(RequestThrottle::unthrottled, RequestThrottle::from_requests_per_second)
    }

    /// Command configuration for `program`.
    #[must_use]
    pub fn command_config(&self, program: PathBuf) -> CommandConfig {
        CommandConfig {
            program,
            args: self.command.args.clone(),
            env: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(self.command.timeout_secs),
            input: self.command.input,
        }
    }

    /// Checks every derived configuration.
    ///
    /// # Errors
    /// Returns `Error::Continuation` wrapping `InvalidConfig` for the first
    /// rejected value, or `Error::Settings` for a zero command timeout.
    pub fn validate(&self) -> Result<(), Error> {
        self.continuation_config().validate()?;
        self.retry_policy().validate()?;
        if self.command.timeout_secs == 0 {
            return Err(Error::Settings(
                "command timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds a continuation loop over `provider` that dispatches through
    /// `throttle`.
    ///
    /// # Errors
    /// Returns the first validation error.
    pub fn build_loop(
        &self,
        provider: Arc<dyn GenerationProvider>,
        throttle: RequestThrottle,
    ) -> Result<ContinuationLoop, Error> {
        self.validate()?;
        Ok(ContinuationLoop::new(provider)
            .with_config(self.continuation_config())
            .with_retry_policy(self.retry_policy())
            .with_validation(self.validation.clone())
            .with_throttle(throttle))
    }

    /// Renders the settings as TOML.
    ///
    /// # Errors
    /// Returns `Error::Settings` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Settings(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.continuation_config(), ContinuationConfig::default());
        assert_eq!(settings.validation, ValidationConfig::default());
        assert_eq!(settings.throttle().min_interval(), Duration::ZERO);
    }

    #[test]
    fn file_values_are_applied() {
        let settings = Settings::from_toml_str(
            r#"
            [generation]
            model = "gpt-4o"
            max_attempts = 5
            deadline_secs = 90

            [retry]
            initial_delay_ms = 250

            [throttle]
            requests_per_second = 4.0

            [validation]
            truncation_indicators = ["<more>"]

            [validation.check_balance]
            bracket = true

            [command]
            args = ["--fast"]
            input = "transcript"
            "#,
        )
        .unwrap();

        let config = settings.continuation_config();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.deadline, Some(Duration::from_secs(90)));
        assert_eq!(settings.retry_policy().initial_delay, Duration::from_millis(250));
        assert_eq!(settings.retry_policy().max_attempts, 3);
        assert_eq!(settings.throttle().min_interval(), Duration::from_millis(250));
        assert_eq!(settings.validation.truncation_indicators, vec!["<more>".to_string()]);
        assert!(settings.validation.check_balance.bracket);
        assert!(settings.validation.check_balance.latex);
        assert_eq!(settings.command.input, InputFormat::Transcript);
        assert_eq!(
            settings.command_config(PathBuf::from("/bin/gen")).args,
            vec!["--fast".to_string()]
        );
    }

    #[test]
    fn environment_overrides_file() {
        let mut settings =
            Settings::from_toml_str("[generation]\nmodel = \"from-file\"\ntemperature = 0.1\n")
                .unwrap();
        settings
            .apply_env_from(env(&[
                ("MODEL", "from-env"),
                ("RETRY_MAX_ATTEMPTS", "7"),
                ("REQUESTS_PER_SECOND", "2"),
                ("COMMAND", "/opt/gen"),
            ]))
            .unwrap();

        assert_eq!(settings.generation.model, "from-env");
        assert_eq!(settings.generation.temperature, 0.1);
        assert_eq!(settings.retry.max_attempts, 7);
        assert_eq!(settings.throttle().min_interval(), Duration::from_millis(500));
        assert_eq!(settings.command.path, Some(PathBuf::from("/opt/gen")));
    }

    #[test]
    fn unparsable_environment_value_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env_from(env(&[("MAX_ATTEMPTS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("RIG_CONTINUE_MAX_ATTEMPTS"));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut settings = Settings::default();
        settings.generation.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retry.backoff_factor = 0.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.command.timeout_secs = 0;
        assert!(matches!(settings.validate(), Err(Error::Settings(_))));
    }

    #[test]
    fn rendered_settings_parse_back() {
        let mut settings = Settings::default();
        settings.generation.model = "m".to_string();
        settings.throttle.requests_per_second = Some(1.5);

        let text = settings.to_toml_string().unwrap();
        assert_eq!(Settings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn malformed_toml_is_a_toml_error() {
        let err = Settings::from_toml_str("[generation\nmodel = 1").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
