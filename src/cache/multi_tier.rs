use crate::cache::{CacheStats, CacheStatsSnapshot, CacheValue, LocalCache};
use crate::cache::{decode_envelope, encode_envelope};
use crate::domain_port::{CacheError, DistributedCache};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound for anything held in L1.
    pub local_ttl: Duration,
    /// L2 TTL when the caller does not pass one.
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
    pub l2_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl: Duration::from_secs(60),
            default_ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(30),
            l2_enabled: true,
        }
    }
}

/// L1 [`LocalCache`] composed with an optional L2 [`DistributedCache`].
///
/// Reads go L1 → L2 → miss, promoting L2 hits into L1. Writes go to both tiers
/// synchronously. L2 read failures count as misses; L2 write and delete
/// failures are returned so the caller can decide whether they matter.
pub struct MultiTierCache {
    local: LocalCache,
    remote: Option<Arc<dyn DistributedCache>>,
    config: CacheConfig,
    stats: CacheStats,
}

impl MultiTierCache {
    pub fn new(config: CacheConfig, remote: Option<Arc<dyn DistributedCache>>) -> Self {
        let remote = remote.filter(|_| config.l2_enabled);
        if remote.is_none() {
            tracing::info!("distributed cache tier disabled, running L1 only");
        }
        Self {
            local: LocalCache::new(config.cleanup_interval),
            remote,
            config,
            stats: CacheStats::default(),
        }
    }

    fn local_ttl(&self, ttl: Duration) -> Duration {
        ttl.min(self.config.local_ttl)
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        if let Some(value) = self.local.get(key) {
            self.stats.l1_hit();
            tracing::trace!(key, "cache L1 hit");
            return Some(value);
        }

        let Some(remote) = &self.remote else {
            self.stats.miss();
            return None;
        };

        match remote.get_with_ttl(key).await {
            Ok(Some((value, remaining))) => {
                self.stats.l2_hit();
                tracing::trace!(key, "cache L2 hit");
                let ttl = remaining.unwrap_or(self.config.local_ttl);
                self.local.set(key, value.clone(), self.local_ttl(ttl));
                Some(value)
            }
            Ok(None) => {
                self.stats.miss();
                None
            }
            Err(e) => {
                self.stats.l2_error();
                self.stats.miss();
                tracing::warn!(key, error = %e, "distributed cache read failed, treating as miss");
                None
            }
        }
    }

    /// `ttl` of `None` means the configured default. A zero TTL deletes the key.
    pub async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() {
            return self.delete(key).await;
        }

        self.local.set(key, value.to_owned(), self.local_ttl(ttl));
        if let Some(remote) = &self.remote {
            remote.set(key, value, ttl).await.inspect_err(|e| {
                self.stats.l2_error();
                tracing::warn!(key, error = %e, "distributed cache write failed");
            })?;
        }
        Ok(())
    }

    /// A payload that does not decode as `T` is dropped and reported as a miss.
    pub async fn get<T: CacheValue>(&self, key: &str) -> Option<T> {
        let raw = self.get_string(key).await?;
        match decode_envelope::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                if let Err(e) = self.delete(key).await {
                    tracing::warn!(key, error = %e, "failed to drop undecodable cache entry");
                }
                None
            }
        }
    }

    pub async fn set<T: CacheValue>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let raw = encode_envelope(value)?;
        self.set_string(key, &raw, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.local.delete(key);
        if let Some(remote) = &self.remote {
            remote.del(key).await.inspect_err(|e| {
                self.stats.l2_error();
                tracing::warn!(key, error = %e, "distributed cache delete failed");
            })?;
        }
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> bool {
        if self.local.get(key).is_some() {
            return true;
        }
        match &self.remote {
            Some(remote) => remote.exists(key).await.unwrap_or_else(|e| {
                self.stats.l2_error();
                tracing::warn!(key, error = %e, "distributed cache exists failed");
                false
            }),
            None => false,
        }
    }

    /// Clears all of L1, then deletes every L2 key matching `pattern`.
    ///
    /// L1 has no index to match against, so it is dropped wholesale. The L2
    /// scan is not atomic: a writer racing the scan can put a key back.
    pub async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        self.local.clear();
        let Some(remote) = &self.remote else {
            return Ok(0);
        };

        let keys = remote.scan(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = remote.del_many(&keys).await?;
        tracing::debug!(pattern, removed, "cache pattern invalidated");
        Ok(removed)
    }

    pub fn has_distributed_tier(&self) -> bool {
        self.remote.is_some()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    pub fn close(&self) {
        self.local.close();
    }
}
