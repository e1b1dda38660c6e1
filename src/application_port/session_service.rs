use crate::application_port::AuthError;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Replaces whatever session the user had with a new one.
    async fn create_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError>;

    async fn get_session(&self, user_id: UserId) -> Result<Session, AuthError>;

    /// Origin-only lookup; a stale cached copy must never authorize a refresh.
    async fn get_session_by_token(&self, refresh_token: &str) -> Result<Session, AuthError>;

    async fn update_session(
        &self,
        user_id: UserId,
        new_refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), AuthError>;

    /// Like `update_session`, but only if the stored token is still `old_refresh_token`.
    async fn rotate_session(
        &self,
        user_id: UserId,
        old_refresh_token: &str,
        new_refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), AuthError>;

    async fn delete_session(&self, user_id: UserId) -> Result<(), AuthError>;

    async fn purge_expired(&self) -> Result<u64, AuthError>;
}
