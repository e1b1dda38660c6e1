use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(10);

/// Longest expiry any in-process tier honours; larger TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// `now + ttl` clamped to [`MAX_TTL`], so an oversized TTL cannot overflow.
pub fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}

struct LocalEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local TTL map.
///
/// Expired entries are dropped lazily on read and by one background sweep per
/// instance. The sweep stops on [`LocalCache::close`] or when the cache is
/// dropped.
pub struct LocalCache {
    entries: Arc<DashMap<String, LocalEntry>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl LocalCache {
    /// Must be called inside a tokio runtime for the background sweep to run.
    pub fn new(cleanup_interval: Duration) -> Self {
        let entries = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_eviction(
                    entries.clone(),
                    cleanup_interval.max(MIN_CLEANUP_INTERVAL),
                    cancel.clone(),
                ));
            }
            Err(_) => {
                tracing::warn!("no tokio runtime, local cache relies on lazy eviction only");
            }
        }

        Self {
            entries,
            closed: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        if ttl.is_zero() {
            self.entries.remove(key);
            return;
        }
        let entry = LocalEntry {
            value,
            expires_at: expiry_after(Instant::now(), ttl),
        };
        self.entries.insert(key.to_owned(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Counts entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    /// Stops the background sweep and drops all entries. Safe to call repeatedly.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.entries.clear();
        tracing::debug!("local cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn purge(entries: &DashMap<String, LocalEntry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    before.saturating_sub(entries.len())
}

async fn run_eviction(
    entries: Arc<DashMap<String, LocalEntry>>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = purge(&entries);
                if removed > 0 {
                    tracing::trace!(removed, "local cache sweep");
                }
            }
        }
    }
}
