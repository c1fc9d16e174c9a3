//! Configuration management for bedtime.
//!
//! CLI flags are parsed with clap. Everything the story call needs lives in
//! [`Settings`], which is read once from the environment (optionally seeded
//! from a dotenv file) and then passed around by reference.

use crate::error::{BedtimeError, Result};
use clap::{ArgAction, Parser, builder::BoolishValueParser};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
/// Environment variable overriding the model name.
pub const MODEL_VAR: &str = "BEDTIME_MODEL";
/// Environment variable overriding the sampling temperature.
pub const TEMPERATURE_VAR: &str = "BEDTIME_TEMPERATURE";
/// Environment variable overriding the per-call timeout, in seconds.
pub const TIMEOUT_VAR: &str = "BEDTIME_TIMEOUT";
/// Environment variable overriding the metrics server port.
pub const METRICS_PORT_VAR: &str = "BEDTIME_METRICS_PORT";
/// Environment variable overriding the API base URL.
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

/// CLI arguments for bedtime.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "bedtime",
    version,
    about = "Generate a one-sentence bedtime story about a unicorn.",
    after_help = "EXAMPLES:\n    \
        bedtime\n    \
        bedtime --mock\n    \
        bedtime --env-file secrets.env --json-logs"
)]
pub struct Args {
    /// Run in offline mock mode
    #[arg(
        long,
        env = "BEDTIME_MOCK",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub mock: bool,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, env = "BEDTIME_ENV_FILE")]
    pub env_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "BEDTIME_VERBOSE")]
    pub verbose: bool,

    /// Output logs as JSON
    #[arg(long, env = "BEDTIME_JSON_LOGS")]
    pub json_logs: bool,

    /// Do not start the metrics HTTP server
    #[arg(long, env = "BEDTIME_NO_METRICS")]
    pub no_metrics: bool,
}

impl Args {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Wait after the first failed attempt.
    pub initial_backoff: Duration,

    /// Upper bound for any single wait.
    pub max_backoff: Duration,

    /// Growth factor between consecutive waits.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Immutable settings for a single run.
#[derive(Clone)]
pub struct Settings {
    /// API key sent as a bearer token.
    pub api_key: String,

    /// Chat model identifier.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Per-call timeout enforced by the HTTP client.
    pub timeout: Duration,

    /// Port for the metrics HTTP server.
    pub metrics_port: u16,

    /// Base URL of the chat-completion API, without a trailing slash.
    pub base_url: String,

    /// Retry settings for transient failures.
    pub retry: RetryConfig,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_metrics_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Settings {
    /// Settings with the given API key and every tunable at its default.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            temperature: default_temperature(),
            timeout: default_timeout(),
            metrics_port: default_metrics_port(),
            base_url: default_base_url(),
            retry: RetryConfig::default(),
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(BedtimeError::MissingApiKey(API_KEY_VAR))?;

        let mut settings = Self::new(api_key);

        if let Some(model) = non_empty(&lookup, MODEL_VAR) {
            settings.model = model;
        }

        if let Some(raw) = non_empty(&lookup, TEMPERATURE_VAR) {
            let temperature: f32 = parse(TEMPERATURE_VAR, &raw)?;
            if !(0.0..=2.0).contains(&temperature) {
                return Err(BedtimeError::InvalidSetting {
                    key: TEMPERATURE_VAR,
                    value: raw,
                    reason: "must be between 0.0 and 2.0".to_string(),
                });
            }
            settings.temperature = temperature;
        }

        if let Some(raw) = non_empty(&lookup, TIMEOUT_VAR) {
            let secs: f64 = parse(TIMEOUT_VAR, &raw)?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(BedtimeError::InvalidSetting {
                    key: TIMEOUT_VAR,
                    value: raw,
                    reason: "must be a positive number of seconds".to_string(),
                });
            }
            settings.timeout = Duration::from_secs_f64(secs);
        }

        if let Some(raw) = non_empty(&lookup, METRICS_PORT_VAR) {
            settings.metrics_port = parse(METRICS_PORT_VAR, &raw)?;
        }

        if let Some(url) = non_empty(&lookup, BASE_URL_VAR) {
            settings.base_url = url.trim_end_matches('/').to_string();
        }

        Ok(settings)
    }

    /// Full URL of the chat completions endpoint.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("metrics_port", &self.metrics_port)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>().map_err(|e| BedtimeError::InvalidSetting {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Seed the process environment from a dotenv file.
///
/// With an explicit `path` the file must exist. Without one, `.env` in the
/// working directory is loaded if present; parent directories are not
/// searched. Variables already set are never overridden. Returns the path
/// that was loaded, if any.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    load_env_file_in(path, Path::new("."))
}

/// Like [`load_env_file`], looking for the default `.env` in `dir`.
pub fn load_env_file_in(path: Option<&Path>, dir: &Path) -> Result<Option<PathBuf>> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (dir.join(".env"), false),
    };

    match dotenvy::from_path(&path) {
        Ok(()) => {
            debug!(path = %path.display(), "Loaded env file");
            Ok(Some(path))
        }
        Err(e) if !required && e.not_found() => Ok(None),
        Err(source) => Err(BedtimeError::EnvFile { path, source }),
    }
}
