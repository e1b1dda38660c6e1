use crate::application_port::AuthError;
use crate::domain_model::UserId;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait BlacklistService: Send + Sync {
    async fn add_token_to_blacklist(
        &self,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn is_token_blacklisted(&self, token_id: &str) -> Result<bool, AuthError>;

    /// Revokes every token issued to `user_id` at or before `revoked_before`.
    /// `expires_at` is when the last such token would have expired anyway.
    async fn revoke_user_tokens_before(
        &self,
        user_id: UserId,
        revoked_before: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Whether a token issued to `user_id` at `issued_at` falls under a cutoff.
    async fn is_user_token_revoked(
        &self,
        user_id: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    async fn purge_expired(&self) -> Result<u64, AuthError>;
}
