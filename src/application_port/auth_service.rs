use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("user not found")]
    UserNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("session not found")]
    SessionNotFound,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token malformed")]
    TokenMalformed,
    #[error("token expired")]
    TokenExpired,
    #[error("token blacklisted")]
    TokenBlacklisted,
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: User,
    pub tokens: TokenPair,
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn login_with_token(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
    async fn logout(
        &self,
        user_id: UserId,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), AuthError>;
    /// Signature, expiry and revocation check of an access token.
    async fn verify_token(&self, token: &str) -> Result<Claims, AuthError>;
    async fn revoke_token(&self, token: &str) -> Result<(), AuthError>;
    async fn revoke_all_user_tokens(&self, user_id: UserId) -> Result<(), AuthError>;
    async fn get_user_session(&self, user_id: UserId) -> Result<Session, AuthError>;
    async fn validate_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
    ) -> Result<bool, AuthError>;
    async fn check_token_blacklist(&self, token_id: &str) -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}
