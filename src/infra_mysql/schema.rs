use sqlx::MySqlPool;

const TABLES: [&str; 4] = [
    r#"
CREATE TABLE IF NOT EXISTS users (
    id            BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    username      VARCHAR(64)     NOT NULL,
    password_hash VARCHAR(255)    NOT NULL,
    is_active     TINYINT(1)      NOT NULL DEFAULT 1,
    last_login_at DATETIME(6)     NULL,
    created_at    DATETIME(6)     NOT NULL,
    PRIMARY KEY (id),
    UNIQUE KEY uk_users_username (username)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS user_sessions (
    id            BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    user_id       BIGINT UNSIGNED NOT NULL,
    refresh_token VARCHAR(768) CHARACTER SET ascii NOT NULL,
    expires_at    DATETIME(6)     NOT NULL,
    created_at    DATETIME(6)     NOT NULL,
    PRIMARY KEY (id),
    UNIQUE KEY uk_user_sessions_user_id (user_id),
    UNIQUE KEY uk_user_sessions_refresh_token (refresh_token),
    KEY idx_user_sessions_expires_at (expires_at)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS token_blacklist (
    token_id   VARCHAR(64) CHARACTER SET ascii NOT NULL,
    expires_at DATETIME(6) NOT NULL,
    created_at DATETIME(6) NOT NULL,
    PRIMARY KEY (token_id),
    KEY idx_token_blacklist_expires_at (expires_at)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS user_token_cutoffs (
    user_id        BIGINT UNSIGNED NOT NULL,
    revoked_before DATETIME(6)     NOT NULL,
    expires_at     DATETIME(6)     NOT NULL,
    PRIMARY KEY (user_id),
    KEY idx_user_token_cutoffs_expires_at (expires_at)
)
"#,
];

/// Creates the auth tables when missing.
pub async fn migrate(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!("mysql schema ready");
    Ok(())
}
