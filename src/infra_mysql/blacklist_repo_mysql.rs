use super::util::store_err;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};

pub struct MySqlBlacklistRepo {
    pool: MySqlPool,
}

impl MySqlBlacklistRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlBlacklistRepo { pool }
    }
}

#[async_trait::async_trait]
impl BlacklistRepo for MySqlBlacklistRepo {
    async fn insert(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query(
            r#"
INSERT INTO token_blacklist (token_id, expires_at, created_at)
VALUES (?, ?, ?)
ON DUPLICATE KEY UPDATE expires_at = GREATEST(expires_at, VALUES(expires_at))
"#,
        )
        .bind(token_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_err("insert blacklist entry"))?;

        Ok(())
    }

    async fn find_active(
        &self,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlacklistEntry>, AuthError> {
        let row = sqlx::query(
            r#"
SELECT token_id, expires_at, created_at
FROM token_blacklist
WHERE token_id = ? AND expires_at > ?
"#,
        )
        .bind(token_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("query blacklist entry"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(BlacklistEntry {
            token_id: row
                .try_get("token_id")
                .map_err(store_err("token_blacklist.token_id"))?,
            expires_at: row
                .try_get("expires_at")
                .map_err(store_err("token_blacklist.expires_at"))?,
            created_at: row
                .try_get("created_at")
                .map_err(store_err("token_blacklist.created_at"))?,
        }))
    }

    async fn insert_user_cutoff(
        &self,
        user_id: UserId,
        revoked_before: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
INSERT INTO user_token_cutoffs (user_id, revoked_before, expires_at)
VALUES (?, ?, ?)
ON DUPLICATE KEY UPDATE
    revoked_before = GREATEST(revoked_before, VALUES(revoked_before)),
    expires_at = GREATEST(expires_at, VALUES(expires_at))
"#,
        )
        .bind(user_id)
        .bind(revoked_before)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("insert user cutoff"))?;

        Ok(())
    }

    async fn find_user_cutoff(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        let row = sqlx::query(
            "SELECT revoked_before FROM user_token_cutoffs WHERE user_id = ? AND expires_at > ?",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("query user cutoff"))?;

        row.map(|row| row.try_get::<DateTime<Utc>, _>("revoked_before"))
            .transpose()
            .map_err(store_err("user_token_cutoffs.revoked_before"))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let tokens = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(store_err("purge blacklist"))?;
        let cutoffs = sqlx::query("DELETE FROM user_token_cutoffs WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(store_err("purge user cutoffs"))?;

        Ok(tokens.rows_affected() + cutoffs.rows_affected())
    }
}
