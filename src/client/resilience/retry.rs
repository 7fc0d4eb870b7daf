//! Retry execution with exponential backoff and pluggable classification.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::backoff::ExponentialBackoff;

const NETWORK_MARKERS: &[&str] = &[
    "network",
    "connection",
    "connect",
    "dns",
    "econnrefused",
    "econnreset",
    "enotfound",
    "fetch failed",
];

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];

/// Failure shape understood by the default retry predicate.
///
/// A failure is described by its human-readable message and, when it came
/// from an HTTP exchange, the status code it carried. Types that know their
/// own fault kind can answer [`transient`](Classify::transient) directly.
pub trait Classify: fmt::Display {
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Explicit verdict. Takes precedence over status and message.
    fn transient(&self) -> Option<bool> {
        None
    }
}

/// Default retry predicate.
///
/// Uses [`Classify::transient`] when the error answers it. Otherwise retries
/// on 5xx, 408 and 429 statuses, and on messages that look like a network
/// fault or a timeout. Everything else is permanent.
pub fn is_transient<E: Classify + ?Sized>(error: &E) -> bool {
    if let Some(verdict) = error.transient() {
        return verdict;
    }
    if let Some(status) = error.status_code() {
        return matches!(status, 500..=599 | 408 | 429);
    }

    let message = error.to_string().to_lowercase();
    NETWORK_MARKERS
        .iter()
        .chain(TIMEOUT_MARKERS)
        .any(|marker| message.contains(marker))
}

pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
pub type RetryObserver<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Immutable retry policy. Cheap to clone and safe to share across tasks.
pub struct RetryPolicy<E = crate::Error> {
    max_retries: u32,
    backoff: ExponentialBackoff,
    predicate: RetryPredicate<E>,
    on_retry: Option<RetryObserver<E>>,
}

impl<E: Classify + 'static> RetryPolicy<E> {
    /// Policy using [`is_transient`] and the default backoff.
    pub fn new(max_retries: u32) -> Self {
        Self::custom(max_retries, is_transient::<E>)
    }
}

impl<E: Classify + 'static> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<E> RetryPolicy<E> {
    pub fn custom(max_retries: u32, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self {
            max_retries,
            backoff: ExponentialBackoff::default(),
            predicate: Arc::new(predicate),
            on_retry: None,
        }
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    pub fn on_retry(mut self, observer: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }

    pub fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }

    fn notify(&self, error: &E, attempt: u32) {
        let Some(observer) = &self.on_retry else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| observer(error, attempt))).is_err() {
            tracing::warn!(attempt, "Retry observer panicked, continuing");
        }
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            backoff: self.backoff.clone(),
            predicate: Arc::clone(&self.predicate),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Stateless retry driver. Every call to [`RetryExecutor::execute`] is independent.
pub struct RetryExecutor;

impl RetryExecutor {
    /// Runs `operation` until it succeeds, the policy rejects the failure, or
    /// `max_retries + 1` attempts have been made. Attempts never overlap.
    pub async fn execute<F, Fut, T, E>(mut operation: F, policy: &RetryPolicy<E>) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = policy.max_attempts();
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::debug!(error = %error, attempt, "Retry budget exhausted");
                return Err(error);
            }

            if !policy.should_retry(&error) {
                tracing::debug!(error = %error, attempt, "Failure is not retryable");
                return Err(error);
            }

            let delay = policy.backoff.delay_for(attempt);
            tracing::debug!(
                error = %error,
                attempt,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying after failure"
            );
            policy.notify(&error, attempt);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
