use super::util::{is_dup_key, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::sync::Arc;

pub struct MySqlUserRepo {
    pool: MySqlPool,
    credential_hasher: Arc<dyn CredentialHasher>,
}

impl MySqlUserRepo {
    pub fn new(pool: MySqlPool, credential_hasher: Arc<dyn CredentialHasher>) -> Self {
        MySqlUserRepo {
            pool,
            credential_hasher,
        }
    }

    fn row_to_user(row: &MySqlRow) -> Result<User, AuthError> {
        let id: u64 = row.try_get("id").map_err(store_err("users.id"))?;
        let username: String = row.try_get("username").map_err(store_err("users.username"))?;
        let is_active: bool = row
            .try_get("is_active")
            .map_err(store_err("users.is_active"))?;
        let last_login_at: Option<DateTime<Utc>> = row
            .try_get("last_login_at")
            .map_err(store_err("users.last_login_at"))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(store_err("users.created_at"))?;

        Ok(User {
            id: UserId(id),
            username,
            is_active,
            last_login_at,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl UserRepo for MySqlUserRepo {
    async fn verify_password(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let row = sqlx::query(
            r#"
SELECT id, username, password_hash, is_active, last_login_at, created_at
FROM users
WHERE username = ?
"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("query user"))?;

        let Some(row) = row else {
            return Err(AuthError::AuthenticationFailed);
        };
        let user = Self::row_to_user(&row)?;
        if !user.is_active {
            return Err(AuthError::AuthenticationFailed);
        }

        let password_hash: String = row
            .try_get("password_hash")
            .map_err(store_err("users.password_hash"))?;
        if !self
            .credential_hasher
            .verify_password(password, &password_hash)
            .await?
        {
            return Err(AuthError::AuthenticationFailed);
        }

        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
UPDATE users
SET username = ?, is_active = ?, last_login_at = ?
WHERE id = ?
"#,
        )
        .bind(&user.username)
        .bind(user.is_active)
        .bind(user.last_login_at)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(store_err("update user"))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let password_hash = self.credential_hasher.hash_password(password).await?;
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
INSERT INTO users (username, password_hash, is_active, created_at)
VALUES (?, ?, 1, ?)
"#,
        )
        .bind(username)
        .bind(&password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                AuthError::Persistence(format!("username {username} already taken"))
            } else {
                AuthError::Persistence(format!("insert user: {e}"))
            }
        })?;

        Ok(User {
            id: UserId(result.last_insert_id()),
            username: username.to_owned(),
            is_active: true,
            last_login_at: None,
            created_at,
        })
    }
}
