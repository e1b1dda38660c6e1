use crate::cache::MultiTierCache;
use crate::domain_model::*;
use crate::domain_port::CacheError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A type that may be stored in the cache.
///
/// `KIND` and `VERSION` are written next to the payload; reading a payload
/// written under another kind or version is a decode error, never a silently
/// misinterpreted value.
pub trait CacheValue: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;
    const VERSION: u16 = 1;
}

impl CacheValue for Session {
    const KIND: &'static str = "session";
}

impl CacheValue for BlacklistEntry {
    const KIND: &'static str = "blacklist";
}

impl CacheValue for RevocationCutoff {
    const KIND: &'static str = "revocation_cutoff";
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    v: u16,
    kind: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    v: u16,
    kind: String,
}

#[derive(Deserialize)]
struct EnvelopeIn<T> {
    data: T,
}

pub fn encode_envelope<T: CacheValue>(value: &T) -> Result<String, CacheError> {
    let envelope = EnvelopeOut {
        v: T::VERSION,
        kind: T::KIND,
        data: value,
    };
    serde_json::to_string(&envelope).map_err(|e| CacheError::Codec(e.to_string()))
}

pub fn decode_envelope<T: CacheValue>(raw: &str) -> Result<T, CacheError> {
    let header: EnvelopeHeader =
        serde_json::from_str(raw).map_err(|e| CacheError::Codec(e.to_string()))?;
    if header.kind != T::KIND || header.v != T::VERSION {
        return Err(CacheError::Codec(format!(
            "expected {}/v{}, found {}/v{}",
            T::KIND,
            T::VERSION,
            header.kind,
            header.v
        )));
    }
    let envelope: EnvelopeIn<T> =
        serde_json::from_str(raw).map_err(|e| CacheError::Codec(e.to_string()))?;
    Ok(envelope.data)
}

/// Per-domain view of a [`MultiTierCache`] bound to one value type.
pub struct TypedCache<T> {
    cache: Arc<MultiTierCache>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCache<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: CacheValue> TypedCache<T> {
    pub fn new(cache: Arc<MultiTierCache>) -> Self {
        Self {
            cache,
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.cache.get::<T>(key).await
    }

    pub async fn set(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        self.cache.set(key, value, Some(ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.delete(key).await
    }
}
