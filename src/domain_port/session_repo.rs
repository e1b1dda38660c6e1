use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

/// Origin store for `user_sessions`.
#[async_trait::async_trait]
pub trait SessionRepo: Send + Sync {
    /// Insert or replace the session row of `user_id` in one statement.
    async fn upsert(
        &self,
        user_id: UserId,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<Session, AuthError>;

    async fn find_active_by_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthError>;

    async fn find_active_by_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthError>;

    /// Returns whether a row was updated. With `expected_token` set, only a row
    /// still holding that token is touched.
    async fn update_token(
        &self,
        user_id: UserId,
        expected_token: Option<&str>,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    async fn delete_by_user(&self, user_id: UserId) -> Result<bool, AuthError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError>;
}
