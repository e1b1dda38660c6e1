use super::util::glob_match;
use crate::cache::expiry_after;
use crate::domain_port::*;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

enum MemValue {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

struct MemEntry {
    value: MemValue,
    expires_at: Option<Instant>,
}

impl MemEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Unavailable(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

/// Shared-tier stand-in keeping everything in one map. Clone the `Arc` to
/// let several `MultiTierCache` instances act as separate processes.
#[derive(Default)]
pub struct MemoryDistributedCache {
    entries: DashMap<String, MemEntry>,
    offline: AtomicBool,
}

impl MemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `CacheError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(CacheError::Unavailable("memory cache offline".to_string()));
        }
        Ok(())
    }

    /// Drops `key` if it has expired so the entry API only sees live values.
    fn evict_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
    }

    fn counter(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.check_online()?;
        self.evict_if_expired(key);
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().value {
                MemValue::Str(s) => {
                    let current: i64 = s.parse().map_err(|_| {
                        CacheError::Unavailable("value is not an integer".to_string())
                    })?;
                    let next = current + delta;
                    *s = next.to_string();
                    Ok(next)
                }
                _ => Err(wrong_type(key)),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(MemEntry {
                    value: MemValue::Str(delta.to_string()),
                    expires_at: None,
                });
                Ok(delta)
            }
        }
    }
}

#[async_trait::async_trait]
impl DistributedCache for MemoryDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.get_with_ttl(key).await?.map(|(value, _)| value))
    }

    async fn get_with_ttl(
        &self,
        key: &str,
    ) -> Result<Option<(String, Option<Duration>)>, CacheError> {
        self.check_online()?;
        let now = Instant::now();
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            drop(entry);
            self.evict_if_expired(key);
            return Ok(None);
        }
        match &entry.value {
            MemValue::Str(s) => Ok(Some((
                s.clone(),
                entry.expires_at.map(|at| at.saturating_duration_since(now)),
            ))),
            _ => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.insert(
            key.to_owned(),
            MemEntry {
                value: MemValue::Str(value.to_owned()),
                expires_at: Some(expiry_after(Instant::now(), ttl)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn del_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut removed = 0;
        for key in keys {
            if self.del(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.check_online()?;
        self.evict_if_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(expiry_after(Instant::now(), ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.check_online()?;
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.is_live(now) && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.check_online()?;
        self.evict_if_expired(key);
        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(|| MemEntry {
            value: MemValue::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            MemValue::Hash(map) => {
                map.insert(field.to_owned(), value.to_owned());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.check_online()?;
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                MemValue::Hash(map) => Ok(map.get(field).cloned()),
                _ => Err(wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        self.evict_if_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                MemValue::Hash(map) => Ok(map.remove(field).is_some()),
                _ => Err(wrong_type(key)),
            },
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.counter(key, delta)
    }

    async fn decr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.counter(key, -delta)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        self.evict_if_expired(key);
        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(|| MemEntry {
            value: MemValue::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            MemValue::Set(set) => Ok(set.insert(member.to_owned())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        self.evict_if_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                MemValue::Set(set) => Ok(set.remove(member)),
                _ => Err(wrong_type(key)),
            },
            None => Ok(false),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                MemValue::Set(set) => Ok(set.contains(member)),
                _ => Err(wrong_type(key)),
            },
            _ => Ok(false),
        }
    }
}
