use crate::application_port::AuthError;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// `now + ttl`, failing instead of overflowing.
pub fn deadline_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| AuthError::InternalError(format!("ttl out of range: {ttl:?}")))
}
