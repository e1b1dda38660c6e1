use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryBlacklistRepo {
    entries: DashMap<String, BlacklistEntry>,
    /// user -> (revoked_before, expires_at)
    cutoffs: DashMap<UserId, (DateTime<Utc>, DateTime<Utc>)>,
    reads: AtomicUsize,
}

impl MemoryBlacklistRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Row lookup that ignores expiry.
    pub fn row(&self, token_id: &str) -> Option<BlacklistEntry> {
        self.entries.get(token_id).map(|e| e.value().clone())
    }
}

#[async_trait::async_trait]
impl BlacklistRepo for MemoryBlacklistRepo {
    async fn insert(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        let mut entry = self
            .entries
            .entry(token_id.to_owned())
            .or_insert_with(|| BlacklistEntry {
                token_id: token_id.to_owned(),
                expires_at,
                created_at: Utc::now(),
            });
        entry.expires_at = entry.expires_at.max(expires_at);
        Ok(())
    }

    async fn find_active(
        &self,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlacklistEntry>, AuthError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .entries
            .get(token_id)
            .filter(|e| e.is_active_at(now))
            .map(|e| e.value().clone()))
    }

    async fn insert_user_cutoff(
        &self,
        user_id: UserId,
        revoked_before: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut row = self
            .cutoffs
            .entry(user_id)
            .or_insert((revoked_before, expires_at));
        row.0 = row.0.max(revoked_before);
        row.1 = row.1.max(expires_at);
        Ok(())
    }

    async fn find_user_cutoff(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        Ok(self
            .cutoffs
            .get(&user_id)
            .filter(|row| row.1 > now)
            .map(|row| row.0))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let before = self.entries.len() + self.cutoffs.len();
        self.entries.retain(|_, e| e.is_active_at(now));
        self.cutoffs.retain(|_, row| row.1 > now);
        let after = self.entries.len() + self.cutoffs.len();
        Ok(before.saturating_sub(after) as u64)
    }
}
