use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side record binding a user to the refresh token currently allowed
/// to mint new token pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    pub user_id: UserId,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left until expiry, `None` once expired.
    pub fn remaining(&self) -> Option<std::time::Duration> {
        remaining_until(self.expires_at)
    }
}

/// `until - now` as a std duration, `None` when `until` is not in the future.
pub fn remaining_until(until: DateTime<Utc>) -> Option<std::time::Duration> {
    (until - Utc::now())
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
}
