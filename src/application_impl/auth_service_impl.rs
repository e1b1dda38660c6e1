use super::util::deadline_after;
use crate::application_port::*;
use crate::cache::{CacheKeys, MultiTierCache};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use std::sync::Arc;

pub struct RealAuthService {
    user_repo: Arc<dyn UserRepo>,
    token_issuer: Arc<dyn TokenIssuer>,
    session_service: Arc<dyn SessionService>,
    blacklist_service: Arc<dyn BlacklistService>,
    cache: Arc<MultiTierCache>,
}

impl RealAuthService {
    /// `token_issuer` is expected to persist its revocations into
    /// `blacklist_service`; see [`JwtTokenIssuer::with_blacklist`](super::JwtTokenIssuer::with_blacklist).
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        token_issuer: Arc<dyn TokenIssuer>,
        session_service: Arc<dyn SessionService>,
        blacklist_service: Arc<dyn BlacklistService>,
        cache: Arc<MultiTierCache>,
    ) -> Self {
        Self {
            user_repo,
            token_issuer,
            session_service,
            blacklist_service,
            cache,
        }
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, AuthError> {
        if self.token_issuer.is_locally_revoked(token_id) {
            return Ok(true);
        }
        self.blacklist_service.is_token_blacklisted(token_id).await
    }

    /// Rejects a token revoked by id or issued before a revoke-all of its user.
    async fn ensure_not_revoked(&self, claims: &Claims) -> Result<(), AuthError> {
        if self.is_revoked(&claims.token_id).await?
            || self
                .blacklist_service
                .is_user_token_revoked(claims.user_id, claims.issued_at)
                .await?
        {
            return Err(AuthError::TokenBlacklisted);
        }
        Ok(())
    }

    /// Blacklists a still-live token owned by `user_id`; anything else is skipped.
    async fn blacklist_owned_token(&self, user_id: UserId, token: &str) -> Result<(), AuthError> {
        let claims = match self.token_issuer.peek_claims(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(%user_id, error = %e, "skipping unreadable token");
                return Ok(());
            }
        };
        if claims.user_id != user_id {
            tracing::warn!(%user_id, owner = %claims.user_id, "token belongs to another user, not revoking");
            return Ok(());
        }
        if claims.expires_at <= Utc::now() {
            return Ok(());
        }
        self.blacklist_service
            .add_token_to_blacklist(&claims.token_id, claims.expires_at)
            .await
    }

    async fn record_login(&self, user: &mut User) {
        user.last_login_at = Some(Utc::now());
        if let Err(e) = self.user_repo.update_user(user).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to record last login");
        }
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn login_with_token(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput { username, password } = request;

        let mut user = self.user_repo.verify_password(&username, &password).await?;

        let tokens = self
            .token_issuer
            .generate_token_pair(user.id, &user.username)?;

        // no session row, no tokens: the pair is dropped if persistence fails
        self.session_service
            .create_session(user.id, &tokens.refresh_token, tokens.refresh_expires_at)
            .await
            .inspect_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "session persistence failed, discarding issued tokens");
            })?;

        self.record_login(&mut user).await;
        tracing::info!(user_id = %user.id, "user logged in");

        Ok(LoginResult { user, tokens })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.token_issuer.verify_refresh_token(refresh_token)?;
        self.ensure_not_revoked(&claims).await?;

        let session = self
            .session_service
            .get_session_by_token(refresh_token)
            .await?;
        if session.user_id != claims.user_id {
            tracing::warn!(user_id = %claims.user_id, session_user = %session.user_id, "refresh token bound to another user");
            return Err(AuthError::TokenInvalid);
        }

        let tokens = self
            .token_issuer
            .generate_token_pair(claims.user_id, &claims.username)?;

        self.blacklist_service
            .add_token_to_blacklist(&claims.token_id, claims.expires_at)
            .await?;

        let ttl = remaining_until(tokens.refresh_expires_at)
            .ok_or_else(|| AuthError::InternalError("issued refresh token already expired".into()))?;
        self.session_service
            .rotate_session(claims.user_id, refresh_token, &tokens.refresh_token, ttl)
            .await?;

        tracing::info!(user_id = %claims.user_id, "token pair refreshed");
        Ok(tokens)
    }

    async fn logout(
        &self,
        user_id: UserId,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        self.blacklist_owned_token(user_id, access_token).await?;
        self.blacklist_owned_token(user_id, refresh_token).await?;
        self.session_service.delete_session(user_id).await?;

        tracing::info!(%user_id, "user logged out");
        Ok(())
    }

    async fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.token_issuer.verify_token(token)?;
        self.ensure_not_revoked(&claims).await?;
        Ok(claims)
    }

    async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        match self.token_issuer.peek_claims(token)?.kind {
            TokenKind::Access => self.token_issuer.revoke_token(token).await,
            TokenKind::Refresh => self.token_issuer.revoke_refresh_token(token).await,
        }
    }

    async fn revoke_all_user_tokens(&self, user_id: UserId) -> Result<(), AuthError> {
        // covers every access and refresh token minted so far, on every instance
        let cutoff = Utc::now();
        let last_expiry = deadline_after(cutoff, self.token_issuer.max_token_ttl())?;
        self.blacklist_service
            .revoke_user_tokens_before(user_id, cutoff, last_expiry)
            .await?;
        self.session_service.delete_session(user_id).await?;

        if let Err(e) = self.cache.invalidate(&CacheKeys::user_pattern(user_id)).await {
            tracing::warn!(%user_id, error = %e, "failed to invalidate user cache entries");
        }
        tracing::info!(%user_id, "all user tokens revoked");
        Ok(())
    }

    async fn get_user_session(&self, user_id: UserId) -> Result<Session, AuthError> {
        self.session_service.get_session(user_id).await
    }

    async fn validate_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
    ) -> Result<bool, AuthError> {
        match self.session_service.get_session(user_id).await {
            Ok(session) if session.refresh_token == refresh_token => Ok(true),
            // the cached copy may predate a rotation; origin decides a mismatch
            Ok(_) => match self.session_service.get_session_by_token(refresh_token).await {
                Ok(session) => Ok(session.user_id == user_id),
                Err(AuthError::SessionNotFound) => Ok(false),
                Err(e) => Err(e),
            },
            Err(AuthError::SessionNotFound | AuthError::SessionExpired) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn check_token_blacklist(&self, token_id: &str) -> Result<bool, AuthError> {
        self.is_revoked(token_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AuthFixture, auth_fixture};
    use assert_matches::assert_matches;
    use futures_util::future::join_all;

    async fn login(f: &AuthFixture) -> LoginResult {
        f.service
            .login_with_token(LoginInput {
                username: "alice".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_issues_pair_and_creates_session() {
        let f = auth_fixture().await;
        let result = login(&f).await;

        assert_eq!(result.user.id, UserId(42));
        assert!(result.user.last_login_at.is_some());
        let refresh_in = result.tokens.refresh_expires_at - Utc::now();
        assert!(refresh_in > chrono::Duration::days(7) - chrono::Duration::minutes(1));
        assert!(refresh_in <= chrono::Duration::days(7));

        let session = f.service.get_user_session(UserId(42)).await.unwrap();
        assert_eq!(session.refresh_token, result.tokens.refresh_token);
        assert!(
            f.service
                .validate_session(UserId(42), &result.tokens.refresh_token)
                .await
                .unwrap()
        );

        let stored = f.users.find_by_username("alice").unwrap();
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn wrong_password_fails_authentication() {
        let f = auth_fixture().await;
        let err = f
            .service
            .login_with_token(LoginInput {
                username: "alice".to_string(),
                password: "battery staple".to_string(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::AuthenticationFailed);

        let err = f
            .service
            .login_with_token(LoginInput {
                username: "mallory".to_string(),
                password: "whatever".to_string(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::AuthenticationFailed);
    }

    #[tokio::test]
    async fn verify_accepts_fresh_access_token() {
        let f = auth_fixture().await;
        let result = login(&f).await;

        let claims = f.service.verify_token(&result.tokens.access_token).await.unwrap();

        assert_eq!(claims.user_id, UserId(42));
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn login_refresh_logout_scenario() {
        let f = auth_fixture().await;
        let first = login(&f).await.tokens;

        let second = f.service.refresh_token(&first.refresh_token).await.unwrap();
        assert_ne!(second.access_token, first.access_token);
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_matches!(
            f.sessions.get_session_by_token(&first.refresh_token).await,
            Err(AuthError::SessionNotFound)
        );
        assert_matches!(
            f.service.refresh_token(&first.refresh_token).await,
            Err(AuthError::TokenBlacklisted)
        );
        assert!(
            !f.service
                .validate_session(UserId(42), &first.refresh_token)
                .await
                .unwrap()
        );
        assert!(
            f.service
                .validate_session(UserId(42), &second.refresh_token)
                .await
                .unwrap()
        );

        f.service
            .logout(UserId(42), &second.access_token, &second.refresh_token)
            .await
            .unwrap();

        assert_matches!(
            f.service.get_user_session(UserId(42)).await,
            Err(AuthError::SessionNotFound | AuthError::SessionExpired)
        );
        assert_matches!(
            f.service.verify_token(&second.access_token).await,
            Err(AuthError::TokenBlacklisted)
        );
        assert_matches!(
            f.service.refresh_token(&second.refresh_token).await,
            Err(AuthError::TokenBlacklisted)
        );
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let f = auth_fixture().await;
        let tokens = login(&f).await.tokens;
        assert_matches!(
            f.service.refresh_token(&tokens.access_token).await,
            Err(AuthError::TokenInvalid)
        );
    }

    #[tokio::test]
    async fn refresh_after_new_login_fails() {
        let f = auth_fixture().await;
        let first = login(&f).await.tokens;
        let _second = login(&f).await.tokens;

        assert_matches!(
            f.service.refresh_token(&first.refresh_token).await,
            Err(AuthError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() {
        let f = auth_fixture().await;
        let tokens = login(&f).await.tokens;

        let results = join_all((0..4).map(|_| f.service.refresh_token(&tokens.refresh_token))).await;

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for result in &results {
            if let Err(e) = result {
                assert_matches!(e, AuthError::SessionNotFound | AuthError::TokenBlacklisted);
            }
        }
        let session = f.service.get_user_session(UserId(42)).await.unwrap();
        assert_eq!(session.refresh_token, winners[0].refresh_token);
    }

    #[tokio::test]
    async fn revoke_token_blocks_verification_on_every_instance() {
        let f = auth_fixture().await;
        let tokens = login(&f).await.tokens;
        let token_id = f.issuer.get_token_id(&tokens.access_token).unwrap();

        assert!(!f.service.check_token_blacklist(&token_id).await.unwrap());
        f.service.revoke_token(&tokens.access_token).await.unwrap();

        assert!(f.service.check_token_blacklist(&token_id).await.unwrap());
        assert_matches!(
            f.service.verify_token(&tokens.access_token).await,
            Err(AuthError::TokenBlacklisted)
        );

        let other = f.second_instance();
        assert!(other.check_token_blacklist(&token_id).await.unwrap());
        assert_matches!(
            other.verify_token(&tokens.access_token).await,
            Err(AuthError::TokenBlacklisted)
        );
    }

    #[tokio::test]
    async fn revoke_all_drops_session_and_refresh_token() {
        let f = auth_fixture().await;
        let tokens = login(&f).await.tokens;

        f.service.revoke_all_user_tokens(UserId(42)).await.unwrap();

        assert_matches!(
            f.service.get_user_session(UserId(42)).await,
            Err(AuthError::SessionNotFound)
        );
        assert_matches!(
            f.service.refresh_token(&tokens.refresh_token).await,
            Err(AuthError::TokenBlacklisted)
        );
        // no session at all is fine too
        f.service.revoke_all_user_tokens(UserId(42)).await.unwrap();
    }

    #[tokio::test]
    async fn revoke_all_rejects_outstanding_access_tokens_everywhere() {
        let f = auth_fixture().await;
        let other = f.second_instance();
        let tokens = login(&f).await.tokens;
        assert!(other.verify_token(&tokens.access_token).await.is_ok());

        f.service.revoke_all_user_tokens(UserId(42)).await.unwrap();

        assert_matches!(
            f.service.verify_token(&tokens.access_token).await,
            Err(AuthError::TokenBlacklisted)
        );
        assert_matches!(
            f.second_instance().verify_token(&tokens.access_token).await,
            Err(AuthError::TokenBlacklisted)
        );
        assert_matches!(
            other.refresh_token(&tokens.refresh_token).await,
            Err(AuthError::TokenBlacklisted)
        );

        // tokens minted after the cutoff are unaffected
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let fresh = login(&f).await.tokens;
        assert!(f.service.verify_token(&fresh.access_token).await.is_ok());
        assert!(f.service.refresh_token(&fresh.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn validate_session_rechecks_origin_when_cached_copy_is_stale() {
        let f = auth_fixture().await;
        let current = login(&f).await.tokens;
        let stale = Session {
            refresh_token: "replaced-token".to_string(),
            ..f.sessions.get_session(UserId(42)).await.unwrap()
        };
        let raw = crate::cache::encode_envelope(&stale).unwrap();
        f.remote
            .set("session:42", &raw, std::time::Duration::from_secs(60))
            .await
            .unwrap();
        let other = f.second_instance();

        assert_eq!(
            other.get_user_session(UserId(42)).await.unwrap().refresh_token,
            "replaced-token"
        );
        assert!(
            other
                .validate_session(UserId(42), &current.refresh_token)
                .await
                .unwrap()
        );
        assert!(!other.validate_session(UserId(7), &current.refresh_token).await.unwrap());
    }

    #[tokio::test]
    async fn login_caches_nothing_but_the_session() {
        let f = auth_fixture().await;
        login(&f).await;

        assert_eq!(f.remote.scan("*").await.unwrap(), vec!["session:42".to_string()]);
    }

    #[tokio::test]
    async fn logout_ignores_foreign_and_garbage_tokens() {
        let f = auth_fixture().await;
        let alice = login(&f).await.tokens;
        let foreign = f.issuer.generate_token_pair(UserId(7), "bob").unwrap();

        f.service
            .logout(UserId(42), "garbage", &foreign.refresh_token)
            .await
            .unwrap();

        let foreign_id = f.issuer.get_token_id(&foreign.refresh_token).unwrap();
        assert!(!f.service.check_token_blacklist(&foreign_id).await.unwrap());
        assert_matches!(
            f.service.get_user_session(UserId(42)).await,
            Err(AuthError::SessionNotFound)
        );
        // alice's access token was not passed, so it still verifies
        assert!(f.service.verify_token(&alice.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn login_survives_distributed_cache_outage() {
        let f = auth_fixture().await;
        f.remote.set_offline(true);

        let tokens = login(&f).await.tokens;
        let claims = f.service.verify_token(&tokens.access_token).await.unwrap();
        assert_eq!(claims.user_id, UserId(42));

        let refreshed = f.service.refresh_token(&tokens.refresh_token).await.unwrap();
        assert!(f.service.verify_token(&refreshed.access_token).await.is_ok());
    }
}
