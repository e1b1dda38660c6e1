use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;

/// Keys per `DEL` round trip when deleting a scanned batch.
const DEL_CHUNK: usize = 500;
/// `COUNT` hint passed to every `SCAN` step.
const SCAN_COUNT: usize = 200;

pub struct RedisDistributedCache {
    conn: ConnectionManager,
    prefix: String,
    op_timeout: Duration,
}

impl RedisDistributedCache {
    /// `prefix` namespaces every key as `<prefix>:<key>`; an empty prefix
    /// leaves keys untouched.
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, op_timeout: Duration) -> Self {
        RedisDistributedCache {
            conn,
            prefix: prefix.into(),
            op_timeout,
        }
    }

    fn key(&self, key: &str) -> String {
        prefixed(&self.prefix, key)
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Unavailable(format!("{op}: {e}"))),
            Err(_) => {
                tracing::warn!(op, timeout = ?self.op_timeout, "redis operation timed out");
                Err(CacheError::Timeout)
            }
        }
    }
}

fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}:{key}")
    }
}

fn unprefixed(prefix: &str, key: String) -> String {
    if prefix.is_empty() {
        return key;
    }
    match key.strip_prefix(prefix).and_then(|rest| rest.strip_prefix(':')) {
        Some(rest) => rest.to_owned(),
        None => key,
    }
}

/// Redis refuses `PX 0`; a sub-millisecond TTL is rounded up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// `PTTL` answers -2 for a missing key and -1 for a key without expiry.
fn pttl_to_duration(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait::async_trait]
impl DistributedCache for RedisDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.run("GET", conn.get(&key)).await
    }

    async fn get_with_ttl(
        &self,
        key: &str,
    ) -> Result<Option<(String, Option<Duration>)>, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.cmd("GET").arg(&key).cmd("PTTL").arg(&key);
        let (value, pttl): (Option<String>, i64) =
            self.run("GET+PTTL", pipe.query_async(&mut conn)).await?;
        Ok(value.map(|value| (value, pttl_to_duration(pttl))))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.run("SET PX", conn.pset_ex(&key, value, ttl_millis(ttl)))
            .await
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let removed: u64 = self.run("DEL", conn.del(&key)).await?;
        Ok(removed > 0)
    }

    async fn del_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let mut removed = 0;
        for chunk in keys.chunks(DEL_CHUNK) {
            let chunk: Vec<String> = chunk.iter().map(|k| self.key(k)).collect();
            let n: u64 = self.run("DEL", conn.del(&chunk)).await?;
            removed += n;
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.run("EXISTS", conn.exists(&key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        self.run("PEXPIRE", conn.pexpire(&key, millis)).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let pattern = self.key(pattern);
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);
            let (next, batch): (u64, Vec<String>) =
                self.run("SCAN", cmd.query_async(&mut conn)).await?;
            keys.extend(batch.into_iter().map(|k| unprefixed(&self.prefix, k)));
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let _: i64 = self.run("HSET", conn.hset(&key, field, value)).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.run("HGET", conn.hget(&key, field)).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let removed: u64 = self.run("HDEL", conn.hdel(&key, field)).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.run("INCRBY", conn.incr(&key, delta)).await
    }

    async fn decr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.run("DECRBY", conn.decr(&key, delta)).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let added: u64 = self.run("SADD", conn.sadd(&key, member)).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let removed: u64 = self.run("SREM", conn.srem(&key, member)).await?;
        Ok(removed > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.run("SISMEMBER", conn.sismember(&key, member)).await
    }
}
