//! Resilient completion client for the Anthropic Messages API.

pub mod config;
pub mod messages;
pub mod resilience;
pub mod transport;

pub use config::{ClientConfig, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use messages::{
    CompletionRequest, ContentBlock, CreateMessageRequest, DEFAULT_MAX_TOKENS, Message,
    MessageResponse, Role, Usage,
};
pub use resilience::{
    CircuitBreaker, CircuitConfig, CircuitHealth, CircuitOpenError, CircuitPermit, CircuitState,
    Classify, ExponentialBackoff, Resilience, ResilienceConfig, RetryConfig, RetryExecutor,
    RetryObserver, RetryPolicy, RetryPredicate, is_transient,
};

use std::sync::Arc;

use serde::Serialize;

use crate::config::{ConfigBuilder, ConfigProvider};
use crate::observability::MetricsSummary;
use crate::{Error, Result};

/// Completion client. Every call runs through the configured [`Resilience`]
/// stack. Clones share the HTTP pool, breaker and metrics.
#[derive(Clone)]
pub struct CompletionClient {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    resilience: Arc<Resilience>,
}

/// Operational snapshot for admin or debug surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ClientHealth {
    pub circuit: Option<CircuitHealth>,
    pub metrics: MetricsSummary,
}

impl CompletionClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Loads `api.*`, `retry.*`, `circuit.*` and `request.*` from `DEBATE_*`
    /// environment variables.
    pub async fn from_env() -> Result<Self> {
        Self::from_provider(&ConfigBuilder::new().env().build()).await
    }

    pub async fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let config = ClientConfig::load(provider).await?;
        let resilience = ResilienceConfig::load(provider).await?;
        Self::builder().config(config).resilience(resilience).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn resilience(&self) -> &Arc<Resilience> {
        &self.resilience
    }

    pub async fn query(&self, prompt: &str) -> Result<String> {
        self.complete(CompletionRequest::new(prompt)).await
    }

    /// Sends one completion. Transient failures are retried with backoff; an
    /// open circuit fails immediately with [`Error::CircuitOpen`].
    pub async fn complete(&self, request: CompletionRequest) -> Result<String> {
        request.validate()?;
        let body =
            CreateMessageRequest::from_completion(request, &self.config.model, self.config.max_tokens);

        let response = self.resilience.execute(|| self.send_once(&body)).await?;
        tracing::debug!(
            id = response.id.as_deref().unwrap_or(""),
            stop_reason = response.stop_reason.as_deref().unwrap_or(""),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );
        Ok(response.text())
    }

    async fn send_once(&self, body: &CreateMessageRequest) -> Result<MessageResponse> {
        let request = self
            .http
            .post(self.config.messages_url())
            .header("x-api-key", self.config.api_key())
            .header("anthropic-version", &self.config.api_version)
            .json(body);

        let text = transport::fetch_text(request, self.resilience.timeout()).await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Parse(format!("unexpected message response: {}", e)))
    }

    pub fn health(&self) -> ClientHealth {
        ClientHealth {
            circuit: self.resilience.circuit().map(|cb| cb.health()),
            metrics: self.resilience.metrics().summary(),
        }
    }

    /// Forces the breaker back to closed. Administrative override only.
    pub fn reset_circuit(&self) {
        if let Some(cb) = self.resilience.circuit() {
            tracing::info!("Circuit reset by operator");
            cb.reset();
        }
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("config", &self.config)
            .field("resilience", &self.resilience)
            .finish()
    }
}

#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    resilience_config: Option<ResilienceConfig>,
    circuit: Option<Arc<CircuitBreaker>>,
    http: Option<reqwest::Client>,
    on_retry: Option<RetryObserver<Error>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config = Some(match self.config.take() {
            Some(mut config) => {
                config.api_key = secrecy::SecretString::from(key.into());
                config
            }
            None => ClientConfig::new(key),
        });
        self
    }

    pub fn resilience(mut self, config: ResilienceConfig) -> Self {
        self.resilience_config = Some(config);
        self
    }

    /// Shares an existing breaker, e.g. across clients for the same upstream.
    pub fn circuit(mut self, circuit: Arc<CircuitBreaker>) -> Self {
        self.circuit = Some(circuit);
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn on_retry(mut self, observer: impl Fn(&Error, u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> Result<CompletionClient> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("API key is required".into()))?;

        // Per-attempt deadlines come from the resilience layer, so the pool
        // itself carries no request timeout.
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?,
        };

        let resilience_config = self.resilience_config.unwrap_or_default();
        let mut resilience = match self.circuit {
            Some(circuit) => Resilience::with_circuit(resilience_config, circuit),
            None => Resilience::new(resilience_config),
        };
        if let Some(observer) = self.on_retry {
            resilience = resilience.on_retry(move |e, attempt| observer(e, attempt));
        }

        Ok(CompletionClient {
            config: Arc::new(config),
            http,
            resilience: Arc::new(resilience),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_resilience(max_retries: u32, threshold: u32) -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryConfig {
                max_retries,
                backoff: ExponentialBackoff::new(
                    Duration::from_millis(1),
                    Duration::from_millis(5),
                    2.0,
                ),
                ..RetryConfig::default()
            },
            circuit: Some(CircuitConfig::new(threshold, Duration::from_secs(60))),
            timeout: Duration::from_secs(5),
        }
    }

    fn client_for(server: &MockServer, resilience: ResilienceConfig) -> CompletionClient {
        let base = url::Url::parse(&server.uri()).unwrap();
        CompletionClient::builder()
            .config(ClientConfig::new("sk-test").with_base_url(base))
            .resilience(resilience)
            .build()
            .unwrap()
    }

    fn ok_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    #[tokio::test]
    async fn test_complete_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", DEFAULT_API_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "max_tokens": DEFAULT_MAX_TOKENS,
                "system": "Be brief.",
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("Hi.")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_resilience(0, 5));
        let text = client
            .complete(CompletionRequest::new("Hello").with_system("Be brief."))
            .await
            .unwrap();
        assert_eq!(text, "Hi.");
    }

    #[tokio::test]
    async fn test_retries_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("recovered")))
            .mount(&server)
            .await;

        let retries = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&retries);
        let base = url::Url::parse(&server.uri()).unwrap();
        let client = CompletionClient::builder()
            .config(ClientConfig::new("sk-test").with_base_url(base))
            .resilience(fast_resilience(3, 5))
            .on_retry(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        assert_eq!(client.query("ping").await.unwrap(), "recovered");
        assert_eq!(retries.load(Ordering::SeqCst), 2);

        let health = client.health();
        assert_eq!(health.metrics.total_calls, 1);
        assert_eq!(health.metrics.total_attempts, 3);
        assert_eq!(health.metrics.total_retries, 2);
        assert_eq!(health.circuit.unwrap().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "bad model"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_resilience(3, 5));
        let err = client.query("ping").await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unsendable_request_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("x")))
            .expect(0)
            .mount(&server)
            .await;

        let retries = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&retries);
        let base = url::Url::parse(&server.uri()).unwrap();
        let client = CompletionClient::builder()
            .config(ClientConfig::new("bad\nkey").with_base_url(base))
            .resilience(fast_resilience(3, 5))
            .on_retry(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let err = client.query("hi").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)), "got {err:?}");
        assert!(!err.is_retryable());
        assert_eq!(retries.load(Ordering::SeqCst), 0);
        assert_eq!(client.health().metrics.total_attempts, 1);
    }

    #[tokio::test]
    async fn test_circuit_opens_and_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        // Two calls of two attempts each trip a threshold of 2.
        let client = client_for(&server, fast_resilience(1, 2));
        for _ in 0..2 {
            let err = client.query("ping").await.unwrap_err();
            assert_eq!(err.status_code(), Some(500));
        }

        let err = client.query("ping").await.unwrap_err();
        assert!(err.is_circuit_open());

        let health = client.health();
        let circuit = health.circuit.unwrap();
        assert_eq!(circuit.state, CircuitState::Open);
        assert_eq!(circuit.failure_count, 2);
        assert!(circuit.next_attempt_time.is_some());
        assert_eq!(health.metrics.circuit_rejections, 1);

        client.reset_circuit();
        assert_eq!(
            client.resilience().circuit().unwrap().state(),
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"nope\": true}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_resilience(3, 5));
        let err = client.query("ping").await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_never_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("x")))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_resilience(3, 5));
        let err = client.query("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(client.health().metrics.total_calls, 0);
    }

    #[test]
    fn test_builder_requires_key() {
        assert!(matches!(
            CompletionClient::builder().build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_health_serializes() {
        let client = CompletionClient::new(ClientConfig::new("sk-test")).unwrap();
        let json = serde_json::to_value(client.health()).unwrap();
        assert_eq!(json["circuit"]["state"], "closed");
        assert_eq!(json["metrics"]["total_calls"], 0);
    }
}
