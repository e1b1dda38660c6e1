use crate::application_port::AuthError;
use crate::domain_model::*;
use std::time::Duration;

/// Mints and verifies signed tokens.
///
/// Verification covers signature, issuer, audience, type and expiry only.
/// Whether a token id has been revoked is answered by the blacklist; the
/// issuer's own revocation set is a process-local shortcut in front of it.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    fn generate_token_pair(&self, user_id: UserId, username: &str)
    -> Result<TokenPair, AuthError>;

    fn verify_token(&self, token: &str) -> Result<Claims, AuthError>;

    fn verify_refresh_token(&self, token: &str) -> Result<Claims, AuthError>;

    /// Extracts the token id without verifying anything.
    fn get_token_id(&self, token: &str) -> Result<String, AuthError>;

    /// Verifies the signature but not expiry or token type.
    fn peek_claims(&self, token: &str) -> Result<Claims, AuthError>;

    fn is_locally_revoked(&self, token_id: &str) -> bool;

    /// Longest lifetime of any token this issuer mints.
    fn max_token_ttl(&self) -> Duration;

    async fn revoke_token(&self, token: &str) -> Result<(), AuthError>;

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), AuthError>;
}
