//! Redis cache implementation
//!
//! Shared verification-code storage for multi-process deployments.
//! Expiry is delegated to Redis via SETEX.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Default TTL for cache entries (1 hour)
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub struct RedisCache {
    connection: MultiplexedConnection,
    /// Used when a caller passes a zero TTL
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_ttl(redis_url, DEFAULT_TTL).await
    }

    /// Connect to `redis_url`
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn with_ttl(redis_url: &str, default_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            default_ttl,
        })
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();

        let result: Option<String> = conn
            .get(key)
            .await
            .context("Failed to get value from Redis")?;

        match result {
            Some(json) => {
                let value =
                    serde_json::from_str(&json).context("Failed to deserialize cached value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();

        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;

        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        // Redis expiry has one-second resolution
        let ttl_secs = ttl.as_secs().max(1);

        let _: () = conn
            .set_ex(key, json, ttl_secs)
            .await
            .context("Failed to set value in Redis")?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();

        let _: () = conn
            .del(key)
            .await
            .context("Failed to delete key from Redis")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    // Run with: cargo test --features redis-cache -- --ignored

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_set_get_delete() {
        let cache = RedisCache::new(&get_redis_url()).await.unwrap();
        cache.delete("ImageCode_test").await.unwrap();

        cache
            .set("ImageCode_test", &"ABCD".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<String> = cache.get("ImageCode_test").await.unwrap();
        assert_eq!(result, Some("ABCD".to_string()));

        cache.delete("ImageCode_test").await.unwrap();
        let result: Option<String> = cache.get("ImageCode_test").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_ttl_expiration() {
        let cache = RedisCache::new(&get_redis_url()).await.unwrap();

        cache
            .set("SMSCode_test", &"123456".to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        let result: Option<String> = cache.get("SMSCode_test").await.unwrap();
        assert_eq!(result, Some("123456".to_string()));

        tokio::time::sleep(Duration::from_secs(2)).await;

        let result: Option<String> = cache.get("SMSCode_test").await.unwrap();
        assert_eq!(result, None);
    }
}
