use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out")]
    Timeout,
    #[error("cache codec error: {0}")]
    Codec(String),
}

/// Client over a networked key-value store shared by every service instance.
///
/// Values are opaque strings; typing happens one layer up. Implementations
/// bound every call by their own operation timeout.
#[async_trait::async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Value plus remaining TTL in one round trip. A key without expiry
    /// reports `None` as its TTL.
    async fn get_with_ttl(
        &self,
        key: &str,
    ) -> Result<Option<(String, Option<Duration>)>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes many keys in one batch, returning how many existed.
    async fn del_many(&self, keys: &[String]) -> Result<u64, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// All keys matching a glob pattern (`*`, `?`).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError>;

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    async fn decr(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn srem(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, CacheError>;
}
