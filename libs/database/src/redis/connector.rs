use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use super::RedisConfig;
use crate::common::{RetryConfig, retry, retry_with_backoff};

/// Connect and verify with `PING`.
///
/// The returned [`ConnectionManager`] reconnects on its own after transient failures.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    info!("Connecting to Redis");

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

pub async fn connect_from_config(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    connect(&config.build_url()).await
}

/// [`connect`] with exponential backoff; `None` uses the default policy.
pub async fn connect_with_retry(
    url: &str,
    retry_config: Option<RetryConfig>,
) -> redis::RedisResult<ConnectionManager> {
    let url_owned = url.to_string();

    match retry_config {
        Some(config) => retry_with_backoff(|| connect(&url_owned), config).await,
        None => retry(|| connect(&url_owned)).await,
    }
}

pub async fn connect_from_config_with_retry(
    config: &RedisConfig,
    retry_config: Option<RetryConfig>,
) -> redis::RedisResult<ConnectionManager> {
    connect_with_retry(&config.build_url(), retry_config).await
}

/// Open a client without connecting.
///
/// Pub/sub subscribers need a dedicated connection that a
/// [`ConnectionManager`] cannot provide.
pub fn open_client(config: &RedisConfig) -> redis::RedisResult<Client> {
    Client::open(config.build_url())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_client_rejects_bad_url() {
        let config = RedisConfig::new("http://not-redis");
        assert!(open_client(&config).is_err());
    }

    #[test]
    fn test_open_client_does_not_connect() {
        // Nothing listens on port 1; opening must still succeed.
        let config = RedisConfig::new("redis://127.0.0.1:1");
        assert!(open_client(&config).is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_connect() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        assert!(connect(&redis_url).await.is_ok());
    }
}
