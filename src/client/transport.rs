//! Network convenience layer: per-attempt timeouts and status translation.
//!
//! Everything here turns transport outcomes into [`Error`] values the retry
//! predicate can classify. A timeout drops the in-flight request future,
//! which aborts the underlying connection.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;

use super::messages::ErrorResponse;
use crate::{Error, Result};

/// Sends `request`, failing with [`Error::Timeout`] if no response headers
/// arrive within `timeout`. Non-2xx responses become errors.
pub async fn send_with_timeout(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response> {
    match tokio::time::timeout(timeout, request.send()).await {
        Ok(response) => check_response(response?).await,
        Err(_elapsed) => Err(Error::Timeout(timeout)),
    }
}

/// Like [`send_with_timeout`], but the deadline also covers reading the body.
pub async fn fetch_text(request: reqwest::RequestBuilder, timeout: Duration) -> Result<String> {
    let exchange = async {
        let response = check_response(request.send().await?).await?;
        Ok(response.text().await?)
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_elapsed) => Err(Error::Timeout(timeout)),
    }
}

pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    if code == 429 {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(Error::RateLimit { retry_after });
    }

    let text = response.text().await.unwrap_or_default();
    if let Ok(body) = serde_json::from_str::<ErrorResponse>(&text) {
        return Err(body.into_error(code));
    }

    let message = if text.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        text
    };
    Err(Error::Api {
        message,
        status: Some(code),
        error_type: None,
    })
}
