use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Per-user revocation: every token issued to `user_id` at or before
/// `revoked_before` is dead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationCutoff {
    pub user_id: UserId,
    pub revoked_before: DateTime<Utc>,
}

impl RevocationCutoff {
    pub fn revokes(&self, issued_at: DateTime<Utc>) -> bool {
        issued_at <= self.revoked_before
    }
}
