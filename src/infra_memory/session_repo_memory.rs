use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// `user_sessions` kept in a map keyed by user id, which gives the same
/// one-row-per-user guarantee as the unique index in MySQL.
#[derive(Default)]
pub struct MemorySessionRepo {
    sessions: DashMap<UserId, Session>,
    next_id: AtomicU64,
    reads: AtomicUsize,
}

impl MemorySessionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lookups that reached this store.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn token_taken_by_other(&self, user_id: UserId, refresh_token: &str) -> bool {
        self.sessions
            .iter()
            .any(|s| s.user_id != user_id && s.refresh_token == refresh_token)
    }
}

#[async_trait::async_trait]
impl SessionRepo for MemorySessionRepo {
    async fn upsert(
        &self,
        user_id: UserId,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        if self.token_taken_by_other(user_id, refresh_token) {
            return Err(AuthError::Persistence(
                "duplicate refresh token".to_string(),
            ));
        }
        let mut entry = self.sessions.entry(user_id).or_insert_with(|| Session {
            id: self.next_id.fetch_add(1, Ordering::AcqRel) + 1,
            user_id,
            refresh_token: String::new(),
            expires_at,
            created_at,
        });
        entry.refresh_token = refresh_token.to_owned();
        entry.expires_at = expires_at;
        entry.created_at = created_at;
        Ok(entry.clone())
    }

    async fn find_active_by_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .sessions
            .get(&user_id)
            .filter(|s| !s.is_expired_at(now))
            .map(|s| s.value().clone()))
    }

    async fn find_active_by_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .sessions
            .iter()
            .find(|s| s.refresh_token == refresh_token && !s.is_expired_at(now))
            .map(|s| s.value().clone()))
    }

    async fn update_token(
        &self,
        user_id: UserId,
        expected_token: Option<&str>,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        if self.token_taken_by_other(user_id, new_token) {
            return Err(AuthError::Persistence(
                "duplicate refresh token".to_string(),
            ));
        }
        match self.sessions.get_mut(&user_id) {
            Some(mut session) => {
                if expected_token.is_some_and(|t| t != session.refresh_token) {
                    return Ok(false);
                }
                session.refresh_token = new_token.to_owned();
                session.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_user(&self, user_id: UserId) -> Result<bool, AuthError> {
        Ok(self.sessions.remove(&user_id).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok(before.saturating_sub(self.sessions.len()) as u64)
    }
}
