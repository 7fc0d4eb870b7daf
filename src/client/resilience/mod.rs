//! Resilience layer for the completion client.
//!
//! Retry with exponential backoff and jitter, composed under a circuit
//! breaker: `breaker.execute(|| RetryExecutor::execute(op, &policy))`. The
//! breaker therefore counts call-level outcomes, after retries.

mod backoff;
mod circuit;
mod retry;

pub use backoff::ExponentialBackoff;
pub use circuit::{
    CircuitBreaker, CircuitConfig, CircuitHealth, CircuitOpenError, CircuitPermit, CircuitState,
};
pub use retry::{Classify, RetryExecutor, RetryObserver, RetryPolicy, RetryPredicate, is_transient};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ConfigProvider, ConfigProviderExt, ConfigResult};
use crate::observability::ResilienceMetrics;
use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub circuit: Option<CircuitConfig>,
    /// Per-attempt timeout enforced by the network wrapper.
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: ExponentialBackoff,
    pub retry_on_rate_limit: bool,
    pub retry_on_server_error: bool,
    pub retry_on_network_error: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit: Some(CircuitConfig::default()),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            retry_on_rate_limit: true,
            retry_on_server_error: true,
            retry_on_network_error: true,
        }
    }
}

impl RetryConfig {
    /// [`is_transient`] narrowed by the per-category switches.
    pub fn should_retry(&self, error: &Error) -> bool {
        match error.status_code() {
            Some(429) => self.retry_on_rate_limit,
            Some(408 | 500..=599) => self.retry_on_server_error,
            Some(_) => false,
            None => self.retry_on_network_error && is_transient(error),
        }
    }

    pub fn policy(&self) -> RetryPolicy<Error> {
        let config = self.clone();
        RetryPolicy::custom(self.max_retries, move |e| config.should_retry(e))
            .with_backoff(self.backoff.clone())
    }
}

impl ResilienceConfig {
    pub fn no_retry() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
            circuit: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn aggressive() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 5,
                backoff: ExponentialBackoff::new(
                    Duration::from_millis(50),
                    Duration::from_secs(10),
                    2.0,
                ),
                ..Default::default()
            },
            circuit: Some(CircuitConfig::new(10, Duration::from_secs(30))),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn conservative() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 2,
                backoff: ExponentialBackoff::new(
                    Duration::from_millis(500),
                    Duration::from_secs(30),
                    2.0,
                ),
                ..Default::default()
            },
            circuit: Some(CircuitConfig::new(3, Duration::from_secs(120))),
            timeout: Duration::from_secs(20),
        }
    }

    /// Reads `retry.*`, `circuit.*` and `request.timeout_ms`, falling back
    /// to [`ResilienceConfig::default`] for missing keys.
    pub async fn load<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let defaults = Self::default();
        let default_backoff = &defaults.retry.backoff;
        let default_circuit = CircuitConfig::default();

        let backoff = ExponentialBackoff::new(
            Duration::from_millis(
                provider
                    .get_or(
                        "retry.initial_delay_ms",
                        default_backoff.initial_delay().as_millis() as u64,
                    )
                    .await?,
            ),
            Duration::from_millis(
                provider
                    .get_or(
                        "retry.max_delay_ms",
                        default_backoff.max_delay().as_millis() as u64,
                    )
                    .await?,
            ),
            provider
                .get_or("retry.backoff_factor", default_backoff.factor())
                .await?,
        );

        let retry = RetryConfig {
            max_retries: provider
                .get_or("retry.max_retries", defaults.retry.max_retries)
                .await?,
            backoff,
            ..defaults.retry
        };

        let circuit = if provider.get_or("circuit.enabled", true).await? {
            Some(CircuitConfig::new(
                provider
                    .get_or("circuit.failure_threshold", default_circuit.failure_threshold)
                    .await?,
                Duration::from_millis(
                    provider
                        .get_or(
                            "circuit.recovery_timeout_ms",
                            default_circuit.recovery_timeout.as_millis() as u64,
                        )
                        .await?,
                ),
            ))
        } else {
            None
        };

        let timeout = Duration::from_millis(
            provider
                .get_or("request.timeout_ms", defaults.timeout.as_millis() as u64)
                .await?,
        );

        Ok(Self {
            retry,
            circuit,
            timeout,
        })
    }
}

/// `CircuitBreaker(RetryExecutor(operation))` with metrics.
pub struct Resilience {
    config: ResilienceConfig,
    circuit: Option<Arc<CircuitBreaker>>,
    policy: RetryPolicy<Error>,
    metrics: Arc<ResilienceMetrics>,
}

impl Resilience {
    /// Builds a breaker from `config.circuit`, if any.
    pub fn new(config: ResilienceConfig) -> Self {
        let circuit = config
            .circuit
            .as_ref()
            .map(|c| Arc::new(CircuitBreaker::new(c.clone())));
        Self::assemble(config, circuit, None)
    }

    /// Guards calls with an existing breaker, e.g. one shared by every
    /// client that talks to the same upstream. `config.circuit` is ignored.
    pub fn with_circuit(config: ResilienceConfig, circuit: Arc<CircuitBreaker>) -> Self {
        Self::assemble(config, Some(circuit), None)
    }

    /// Adds an observer called before each backoff sleep.
    pub fn on_retry(self, observer: impl Fn(&Error, u32) + Send + Sync + 'static) -> Self {
        let observer: RetryObserver<Error> = Arc::new(observer);
        Self::assemble(self.config, self.circuit, Some(observer))
    }

    fn assemble(
        config: ResilienceConfig,
        circuit: Option<Arc<CircuitBreaker>>,
        observer: Option<RetryObserver<Error>>,
    ) -> Self {
        let metrics = Arc::new(ResilienceMetrics::new());
        let counted = Arc::clone(&metrics);
        let policy = config.retry.policy().on_retry(move |error, attempt| {
            counted.record_retry();
            if let Some(observer) = &observer {
                observer(error, attempt);
            }
        });

        Self {
            config,
            circuit,
            policy,
            metrics,
        }
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn circuit(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit.as_ref()
    }

    pub fn policy(&self) -> &RetryPolicy<Error> {
        &self.policy
    }

    pub fn metrics(&self) -> &ResilienceMetrics {
        &self.metrics
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.metrics.record_call_start();
        let started = Instant::now();

        let attempt = || {
            self.metrics.record_attempt();
            operation()
        };
        let result = match &self.circuit {
            Some(cb) => {
                cb.execute(|| RetryExecutor::execute(attempt, &self.policy))
                    .await
            }
            None => RetryExecutor::execute(attempt, &self.policy).await,
        };

        if let Err(ref e) = result {
            if e.is_circuit_open() {
                self.metrics.record_rejection();
            }
            tracing::warn!(error = %e, "Resilient call failed");
        }
        self.metrics
            .record_call_end(result.is_ok(), started.elapsed().as_secs_f64() * 1000.0);

        result
    }
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}

impl std::fmt::Debug for Resilience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilience")
            .field("config", &self.config)
            .field("circuit", &self.circuit)
            .finish()
    }
}
