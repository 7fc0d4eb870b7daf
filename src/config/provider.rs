//! Configuration provider trait.

use std::str::FromStr;

use super::{ConfigError, ConfigResult};

/// Read-only source of raw string settings keyed by dotted names
/// (`retry.max_retries`).
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>>;
}

/// Typed access on top of [`ConfigProvider::get_raw`].
pub trait ConfigProviderExt: ConfigProvider {
    fn get<T>(&self, key: &str) -> impl std::future::Future<Output = ConfigResult<Option<T>>> + Send
    where
        T: FromStr + Send,
        T::Err: std::fmt::Display,
        Self: Sync,
    {
        async move {
            let Some(raw) = self.get_raw(key).await? else {
                return Ok(None);
            };
            raw.trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
    }

    fn get_or<T>(&self, key: &str, default: T) -> impl std::future::Future<Output = ConfigResult<T>> + Send
    where
        T: FromStr + Send,
        T::Err: std::fmt::Display,
        Self: Sync,
    {
        async move { Ok(self.get(key).await?.unwrap_or(default)) }
    }

    fn require<T>(&self, key: &str) -> impl std::future::Future<Output = ConfigResult<T>> + Send
    where
        T: FromStr + Send,
        T::Err: std::fmt::Display,
        Self: Sync,
    {
        async move {
            self.get(key).await?.ok_or_else(|| ConfigError::NotFound {
                key: key.to_string(),
            })
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}
