use crate::domain_model::{UserId, remaining_until};
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const USER_TTL: Duration = Duration::from_secs(30 * 60);
pub const FOLLOW_TTL: Duration = Duration::from_secs(10 * 60);
pub const FEED_TTL: Duration = Duration::from_secs(60);
/// Upper bound for a cached session copy. A backfill that races a rotation can
/// only serve the replaced token for this long.
pub const SESSION_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Revocation cutoffs, present or absent, are re-read from origin this often.
pub const REVOCATION_CUTOFF_TTL: Duration = Duration::from_secs(60);

/// Key layout shared by every domain that writes into the cache.
///
/// Each entity class owns one prefix so unrelated domains never collide.
pub struct CacheKeys;

impl CacheKeys {
    pub fn user(user_id: UserId) -> String {
        format!("user:{}", user_id)
    }

    /// Everything nested under one user, e.g. `user:1:profile`.
    pub fn user_pattern(user_id: UserId) -> String {
        format!("user:{}:*", user_id)
    }

    pub fn session(user_id: UserId) -> String {
        format!("session:{}", user_id)
    }

    /// Cutoff below which every token issued to the user is rejected.
    pub fn user_revoked_before(user_id: UserId) -> String {
        format!("user:{}:revoked_before", user_id)
    }

    pub fn follow(follower: UserId, followee: UserId) -> String {
        format!("follow:{}:{}", follower, followee)
    }

    pub fn follow_pattern(follower: UserId) -> String {
        format!("follow:{}:*", follower)
    }

    pub fn blacklist(token_id: &str) -> String {
        format!("token:blacklist:{}", token_id)
    }

    pub fn feed(cursor: &str) -> String {
        format!("feed:{}", cursor)
    }

    /// Never past the session's own expiry, and never longer than `SESSION_CACHE_TTL`.
    pub fn session_ttl(expires_at: DateTime<Utc>) -> Option<Duration> {
        remaining_until(expires_at).map(|ttl| ttl.min(SESSION_CACHE_TTL))
    }

    /// Blacklist entries only matter until the revoked token would have expired.
    pub fn blacklist_ttl(expires_at: DateTime<Utc>) -> Option<Duration> {
        remaining_until(expires_at)
    }
}
