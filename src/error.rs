//! Error types for bedtime.
//!
//! Every failure the tool can hit is a [`BedtimeError`]. Each variant knows
//! whether it is worth retrying, which terminal class it falls into, and
//! which process exit code that class maps to.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for missing or invalid settings.
pub const EXIT_CONFIG: i32 = 1;
/// Exit code for a quota or rate-limit failure.
pub const EXIT_QUOTA: i32 = 2;
/// Exit code for any other remote API failure.
pub const EXIT_API: i32 = 3;

/// Errors that can occur while configuring or generating a story.
#[derive(Error, Debug)]
pub enum BedtimeError {
    /// The API key was not set or was empty.
    #[error("missing required environment variable {0}")]
    MissingApiKey(&'static str),

    /// A tunable was set to a value that does not parse or is out of range.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidSetting {
        /// Environment variable name.
        key: &'static str,
        /// The offending raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An explicitly requested dotenv file could not be loaded.
    #[error("failed to load env file '{path}': {source}")]
    EnvFile {
        /// Path that was requested.
        path: PathBuf,
        /// The underlying dotenv error.
        #[source]
        source: dotenvy::Error,
    },

    /// The metrics server could not bind its port.
    #[error("failed to bind metrics server to {addr}: {source}")]
    MetricsBind {
        /// Address that was requested.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The API rejected the call for rate or quota reasons (HTTP 429).
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        /// Message reported by the API.
        message: String,
    },

    /// The call did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The API answered with a non-success status.
    #[error("API returned status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message reported by the API, or the raw body.
        message: String,
    },

    /// The request never produced a response (connection, TLS, DNS).
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The API answered 2xx but the body was not a usable completion.
    #[error("invalid API response: {message}")]
    InvalidResponse {
        /// Description of what was invalid.
        message: String,
    },
}

/// Terminal classification of a failure, as seen by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid settings.
    Config,
    /// Usage allowance exhausted or rate limited.
    QuotaExceeded,
    /// Any other remote API failure.
    Api,
}

impl ErrorKind {
    /// Process exit code for this class.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Config => EXIT_CONFIG,
            Self::QuotaExceeded => EXIT_QUOTA,
            Self::Api => EXIT_API,
        }
    }
}

impl BedtimeError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout(_))
    }

    /// Terminal class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingApiKey(_)
            | Self::InvalidSetting { .. }
            | Self::EnvFile { .. }
            | Self::MetricsBind { .. } => ErrorKind::Config,
            Self::RateLimited { .. } => ErrorKind::QuotaExceeded,
            Self::Timeout(_)
            | Self::Api { .. }
            | Self::Transport(_)
            | Self::InvalidResponse { .. } => ErrorKind::Api,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// Result type alias for bedtime operations.
pub type Result<T> = std::result::Result<T, BedtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let rate_limited = BedtimeError::RateLimited {
            message: "slow down".into(),
        };
        let server_error = BedtimeError::Api {
            status: 500,
            message: "boom".into(),
        };

        assert!(rate_limited.is_transient());
        assert!(BedtimeError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(!server_error.is_transient());
        assert!(!BedtimeError::MissingApiKey("OPENAI_API_KEY").is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BedtimeError::MissingApiKey("OPENAI_API_KEY").exit_code(), 1);
        let invalid = BedtimeError::InvalidSetting {
            key: "BEDTIME_TIMEOUT",
            value: "soon".into(),
            reason: "not a number".into(),
        };
        assert_eq!(invalid.exit_code(), 1);

        let quota = BedtimeError::RateLimited {
            message: "insufficient_quota".into(),
        };
        assert_eq!(quota.exit_code(), 2);

        // Timeouts are retried but surface as a generic API failure.
        assert_eq!(BedtimeError::Timeout(Duration::from_secs(1)).exit_code(), 3);
        let invalid_response = BedtimeError::InvalidResponse {
            message: "no choices".into(),
        };
        assert_eq!(invalid_response.exit_code(), 3);
    }

    #[test]
    fn test_error_display() {
        let err = BedtimeError::Api {
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "API returned status 503: overloaded");
    }
}
