use super::util::{is_dup_key, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlSessionRepo {
    pool: MySqlPool,
}

impl MySqlSessionRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlSessionRepo { pool }
    }

    fn row_to_session(row: MySqlRow) -> Result<Session, AuthError> {
        Ok(Session {
            id: row.try_get("id").map_err(store_err("user_sessions.id"))?,
            user_id: row
                .try_get("user_id")
                .map_err(store_err("user_sessions.user_id"))?,
            refresh_token: row
                .try_get("refresh_token")
                .map_err(store_err("user_sessions.refresh_token"))?,
            expires_at: row
                .try_get("expires_at")
                .map_err(store_err("user_sessions.expires_at"))?,
            created_at: row
                .try_get("created_at")
                .map_err(store_err("user_sessions.created_at"))?,
        })
    }
}

#[async_trait::async_trait]
impl SessionRepo for MySqlSessionRepo {
    async fn upsert(
        &self,
        user_id: UserId,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        // LAST_INSERT_ID(id) makes the update branch report the existing row id
        let result = sqlx::query(
            r#"
INSERT INTO user_sessions (user_id, refresh_token, expires_at, created_at)
VALUES (?, ?, ?, ?)
ON DUPLICATE KEY UPDATE
    id = LAST_INSERT_ID(id),
    refresh_token = VALUES(refresh_token),
    expires_at = VALUES(expires_at),
    created_at = VALUES(created_at)
"#,
        )
        .bind(user_id)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("upsert session"))?;

        Ok(Session {
            id: result.last_insert_id(),
            user_id,
            refresh_token: refresh_token.to_owned(),
            expires_at,
            created_at,
        })
    }

    async fn find_active_by_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthError> {
        sqlx::query(
            r#"
SELECT id, user_id, refresh_token, expires_at, created_at
FROM user_sessions
WHERE user_id = ? AND expires_at > ?
"#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("query session by user"))?
        .map(Self::row_to_session)
        .transpose()
    }

    async fn find_active_by_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthError> {
        sqlx::query(
            r#"
SELECT id, user_id, refresh_token, expires_at, created_at
FROM user_sessions
WHERE refresh_token = ? AND expires_at > ?
"#,
        )
        .bind(refresh_token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("query session by token"))?
        .map(Self::row_to_session)
        .transpose()
    }

    async fn update_token(
        &self,
        user_id: UserId,
        expected_token: Option<&str>,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
UPDATE user_sessions
SET refresh_token = ?, expires_at = ?
WHERE user_id = ? AND (? IS NULL OR refresh_token = ?)
"#,
        )
        .bind(new_token)
        .bind(expires_at)
        .bind(user_id)
        .bind(expected_token)
        .bind(expected_token)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                AuthError::Persistence("duplicate refresh token".to_string())
            } else {
                AuthError::Persistence(format!("update session: {e}"))
            }
        })?;

        // sqlx connects with CLIENT_FOUND_ROWS, so a same-value rewrite still counts as matched.
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_user(&self, user_id: UserId) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(store_err("delete session"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(store_err("purge sessions"))?;

        Ok(result.rows_affected())
    }
}
