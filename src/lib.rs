//! # debate-client
//!
//! Resilient AI completion client and moderator for scripted, turn-based
//! debates between two personas.
//!
//! Every completion call goes through a circuit breaker wrapping a retry
//! executor, so a flaky upstream is retried with backoff and a persistently
//! broken one fails fast.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use debate_client::{CompletionClient, CompletionRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), debate_client::Error> {
//!     let client = CompletionClient::from_env().await?;
//!     let text = client
//!         .complete(CompletionRequest::new("Argue for four-day work weeks."))
//!         .await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```
//!
//! ## Moderating a Debate
//!
//! ```rust,no_run
//! use debate_client::{CompletionClient, Moderator, find_persona};
//!
//! # async fn example() -> Result<(), debate_client::Error> {
//! let client = CompletionClient::from_env().await?;
//! let moderator = Moderator::new(client);
//! let optimist = find_persona("optimist").unwrap();
//! let skeptic = find_persona("skeptic").unwrap();
//!
//! let id = moderator.start("Should cities ban cars?", optimist, skeptic, 6)?;
//! let opening = moderator.next_argument(id).await?;
//! moderator.curveball(id, "Assume public transit is free.")?;
//! let reply = moderator.next_argument(id).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod client;
pub mod config;
pub mod debate;
pub mod observability;

pub use client::{
    CircuitBreaker, CircuitConfig, CircuitHealth, CircuitOpenError, CircuitState, Classify,
    ClientBuilder, ClientConfig, ClientHealth, CompletionClient, CompletionRequest,
    ExponentialBackoff, Message, Resilience, ResilienceConfig, RetryConfig, RetryExecutor,
    RetryPolicy, Role, is_transient,
};
pub use config::{ConfigBuilder, ConfigError, ConfigProvider, ConfigProviderExt};
pub use debate::{
    Argument, DebatePhase, DebateSession, DebateStore, Moderator, Persona, builtin_personas,
    find_persona,
};
pub use observability::{MetricsSummary, ResilienceMetrics};

/// Error type for debate-client operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Upstream returned a non-success response.
    #[error("API error (HTTP {status}): {message}", status = status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into()))]
    Api {
        message: String,
        status: Option<u16>,
        error_type: Option<String>,
    },

    /// Network connectivity or request failed. Request-building and
    /// body-decoding failures are mapped to other variants by `From`.
    #[error("Network request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Response body did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// API rate limit exceeded.
    #[error("Rate limit exceeded{}", match retry_after {
        Some(d) => format!(", retry in {:.0}s", d.as_secs_f64()),
        None => String::new(),
    })]
    RateLimit {
        retry_after: Option<std::time::Duration>,
    },

    /// A single attempt exceeded its timeout.
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(std::time::Duration),

    /// Request parameters are invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The circuit breaker rejected the call without contacting upstream.
    #[error(transparent)]
    CircuitOpen(#[from] client::CircuitOpenError),

    /// Debate session lookup or state error.
    #[error("Session error: {0}")]
    Session(String),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Authentication or authorization failures (401, 403)
    Authorization,
    /// Configuration, validation, or parsing errors
    Configuration,
    /// Network, timeout, rate limit, or server errors that may succeed on retry
    Transient,
    /// Upstream judged unhealthy; fail fast until the breaker probes again
    CircuitOpen,
    /// Session state errors
    Stateful,
    /// Anything else, including unexpected client errors
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Api {
                status: Some(401 | 403),
                ..
            } => ErrorCategory::Authorization,

            Error::Config(_) | Error::Parse(_) | Error::InvalidRequest(_) | Error::Json(_) => {
                ErrorCategory::Configuration
            }

            Error::Network(e) if network_is_transient(e) => ErrorCategory::Transient,
            Error::Network(_) => ErrorCategory::Internal,
            Error::RateLimit { .. } | Error::Timeout(_) => ErrorCategory::Transient,
            Error::Api {
                status: Some(408 | 429 | 500..=599),
                ..
            } => ErrorCategory::Transient,

            Error::CircuitOpen(_) => ErrorCategory::CircuitOpen,

            Error::Session(_) => ErrorCategory::Stateful,

            Error::Api { .. } => ErrorCategory::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        is_transient(self)
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => *status,
            Error::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Error::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl Classify for Error {
    fn status_code(&self) -> Option<u16> {
        Error::status_code(self)
    }

    fn transient(&self) -> Option<bool> {
        match self {
            Error::Network(e) => Some(network_is_transient(e)),
            Error::Timeout(_) | Error::RateLimit { .. } => Some(true),
            Error::Json(_)
            | Error::Parse(_)
            | Error::Config(_)
            | Error::InvalidRequest(_)
            | Error::CircuitOpen(_)
            | Error::Session(_) => Some(false),
            Error::Api { .. } => None,
        }
    }
}

/// Connection, timeout and send failures may clear up; anything else reqwest
/// reports (builder, body, decode, redirect) will fail the same way again.
fn network_is_transient(err: &reqwest::Error) -> bool {
    !err.is_builder() && !err.is_body() && !err.is_decode() && !err.is_redirect()
        && (err.is_connect() || err.is_timeout() || err.is_request())
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Error::InvalidRequest(format!("could not build HTTP request: {}", err))
        } else if err.is_decode() {
            Error::Parse(format!("could not decode response body: {}", err))
        } else {
            Error::Network(err)
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound { key } => {
                Error::Config(format!("Key not found: {}", key))
            }
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("Invalid value for {}: {}", key, message))
            }
            config::ConfigError::Env(e) => Error::Config(e.to_string()),
            config::ConfigError::Provider { message } => Error::Config(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One-shot completion using configuration from `DEBATE_*` environment variables.
pub async fn query(prompt: &str) -> Result<String> {
    let client = CompletionClient::from_env().await?;
    client.complete(CompletionRequest::new(prompt)).await
}
