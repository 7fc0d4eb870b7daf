//! Circuit breaker implementation.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    /// Reserved for windowed failure counting; not consulted today.
    pub monitoring_period: Option<Duration>,
}

impl CircuitConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            monitoring_period: None,
        }
    }

    pub fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = Some(period);
        self
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Returned instead of invoking the guarded operation while the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circuit breaker is open, service temporarily disabled{}", match retry_at {
    Some(at) => format!(" until {}", at.to_rfc3339()),
    None => String::new(),
})]
pub struct CircuitOpenError {
    pub retry_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a breaker, suitable for a debug endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitHealth {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy)]
struct FailureMark {
    at: Instant,
    wall: DateTime<Utc>,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<FailureMark>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn health(&self) -> CircuitHealth {
        let inner = self.lock();
        let last_failure_time = inner.last_failure.map(|mark| mark.wall);
        let next_attempt_time = match inner.state {
            CircuitState::Open => last_failure_time.and_then(|wall| self.reopen_at(wall)),
            _ => None,
        };

        CircuitHealth {
            state: inner.state,
            failure_count: inner.consecutive_failures,
            last_failure_time,
            next_attempt_time,
        }
    }

    /// Administrative override back to Closed with a zero failure count.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        inner.probe_in_flight = false;
        tracing::info!("Circuit breaker reset");
    }

    /// Runs `operation` if the circuit admits it and records the outcome.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let permit = self.try_acquire().map_err(E::from)?;
        let result = operation().await;
        match &result {
            Ok(_) => permit.success(),
            Err(_) => permit.failure(),
        }
        result
    }

    /// Admission check. An Open circuit whose recovery timeout has elapsed
    /// moves to HalfOpen and the caller becomes the single probe.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, CircuitOpenError> {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(CircuitPermit::new(self, false)),
            CircuitState::Open => {
                let ready = inner
                    .last_failure
                    .is_none_or(|mark| mark.at.elapsed() >= self.config.recovery_timeout);
                if !ready {
                    return Err(CircuitOpenError {
                        retry_at: inner.last_failure.and_then(|mark| self.reopen_at(mark.wall)),
                    });
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                tracing::info!("Circuit breaker half-open, probing upstream");
                Ok(CircuitPermit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(CircuitOpenError { retry_at: None });
                }
                inner.probe_in_flight = true;
                Ok(CircuitPermit::new(self, true))
            }
        }
    }

    fn reopen_at(&self, last_failure: DateTime<Utc>) -> Option<DateTime<Utc>> {
        TimeDelta::from_std(self.config.recovery_timeout)
            .ok()
            .and_then(|delta| last_failure.checked_add_signed(delta))
    }

    fn record_success(&self, probe: bool) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if probe => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.probe_in_flight = false;
                tracing::info!("Circuit breaker closed");
            }
            // Late results from calls admitted before the circuit opened.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(FailureMark {
            at: Instant::now(),
            wall: Utc::now(),
        });

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen if probe => {
                inner.state = CircuitState::Open;
                inner.probe_in_flight = false;
                tracing::warn!(
                    failures = inner.consecutive_failures,
                    "Circuit breaker probe failed, reopening"
                );
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). Dropping an unreported probe frees the probe
/// slot so the next caller can test the upstream.
#[must_use = "report the call outcome with success() or failure()"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    reported: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            reported: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record_success(self.probe);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record_failure(self.probe);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.reported {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitConfig::new(threshold, recovery))
    }

    async fn fail(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<(), String> {
        cb.execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), String>("upstream failed".into())
        })
        .await
    }

    async fn succeed(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<(), String> {
        cb.execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        })
        .await
    }

    impl From<CircuitOpenError> for String {
        fn from(err: CircuitOpenError) -> Self {
            format!("open: {}", err)
        }
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new(CircuitConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_threshold_is_at_least_one() {
        let config = CircuitConfig::new(0, Duration::from_secs(1));
        assert_eq!(config.failure_threshold, 1);
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let cb = breaker(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            assert!(fail(&cb, &calls).await.is_err());
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        assert_eq!(fail(&cb, &calls).await.unwrap_err(), "upstream failed");
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let rejected = fail(&cb, &calls).await.unwrap_err();
        assert!(rejected.starts_with("open:"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.failure_count(), 2);

        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.failure_count(), 0);

        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let cb = breaker(2, Duration::from_millis(500));
        let calls = AtomicU32::new(0);

        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(fail(&cb, &calls).await.unwrap_err().starts_with("open:"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_millis(1)).await;
        succeed(&cb, &calls).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(fail(&cb, &calls).await.unwrap_err(), "upstream failed");
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 2);

        // The failed probe restarts the recovery window.
        assert!(fail(&cb, &calls).await.unwrap_err().starts_with("open:"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_in_flight() {
        let cb = breaker(1, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let _ = fail(&cb, &calls).await;

        tokio::time::advance(Duration::from_millis(10)).await;
        let probe = cb.try_acquire().unwrap();
        assert!(probe.is_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let err = cb.try_acquire().err().unwrap();
        assert_eq!(err.retry_at, None);

        probe.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(!cb.try_acquire().unwrap().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_releases_slot() {
        let cb = breaker(1, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let _ = fail(&cb, &calls).await;

        tokio::time::advance(Duration::from_millis(10)).await;
        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let next = cb.try_acquire().unwrap();
        assert!(next.is_probe());
        next.failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_health_snapshot() {
        let cb = breaker(2, Duration::from_secs(30));
        let calls = AtomicU32::new(0);

        let health = cb.health();
        assert_eq!(health.state, CircuitState::Closed);
        assert!(health.last_failure_time.is_none());
        assert!(health.next_attempt_time.is_none());

        let _ = fail(&cb, &calls).await;
        let health = cb.health();
        assert_eq!(health.failure_count, 1);
        assert!(health.last_failure_time.is_some());
        assert!(health.next_attempt_time.is_none());

        let _ = fail(&cb, &calls).await;
        let health = cb.health();
        assert_eq!(health.state, CircuitState::Open);
        let last = health.last_failure_time.unwrap();
        assert_eq!(
            health.next_attempt_time.unwrap(),
            last + TimeDelta::seconds(30)
        );

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["state"], "open");
        assert_eq!(json["failure_count"], 2);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = breaker(2, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        succeed(&cb, &calls).await.unwrap();
    }

    #[tokio::test]
    async fn test_late_success_does_not_close_open_circuit() {
        let cb = breaker(1, Duration::from_secs(60));
        let early = cb.try_acquire().unwrap();

        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);

        early.success();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 1);
    }
}
