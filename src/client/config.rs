//! Client configuration.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::{ConfigError, ConfigProvider, ConfigProviderExt, ConfigResult};

use super::messages::DEFAULT_MAX_TOKENS;

/// Default Anthropic API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Upstream endpoint and credentials. Resilience settings live in
/// [`ResilienceConfig`](super::ResilienceConfig).
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_key: SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub api_version: String,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_key: SecretString::from(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Reads `api.*` keys. `api.key` is required.
    pub async fn load<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let api_key: String = provider.require("api.key").await?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "api.key".into(),
                message: "must not be empty".into(),
            });
        }

        let mut config = Self::new(api_key);
        if let Some(base_url) = provider.get::<Url>("api.base_url").await? {
            config.base_url = base_url;
        }
        config.model = provider.get_or("api.model", config.model).await?;
        config.max_tokens = provider.get_or("api.max_tokens", config.max_tokens).await?;
        if config.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.max_tokens".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(config)
    }

    /// `{base_url}/v1/messages`, tolerating a trailing slash or path prefix.
    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.as_str().trim_end_matches('/'))
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_version", &self.api_version)
            .finish()
    }
}

fn default_base_url() -> Url {
    // Constant input; parsing cannot fail.
    Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!("valid default base URL"))
}
