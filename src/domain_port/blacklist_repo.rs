use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

/// Origin store for `token_blacklist`.
#[async_trait::async_trait]
pub trait BlacklistRepo: Send + Sync {
    /// Re-inserting an id keeps the later of the two expiries.
    async fn insert(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError>;

    async fn find_active(
        &self,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlacklistEntry>, AuthError>;

    /// Records that tokens issued to `user_id` at or before `revoked_before`
    /// are revoked. The row is needed until `expires_at`, after which no such
    /// token can still be live. An existing row keeps the later of each value.
    async fn insert_user_cutoff(
        &self,
        user_id: UserId,
        revoked_before: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn find_user_cutoff(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AuthError>;

    /// Drops elapsed token entries and user cutoffs; returns the rows removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError>;
}
