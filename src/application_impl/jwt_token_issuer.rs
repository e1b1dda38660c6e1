use super::util::deadline_after;
use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Local revocations are pruned once the set grows past this many entries.
const LOCAL_REVOCATION_PRUNE_AT: usize = 4096;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub signing_key: Vec<u8>,
}

impl JwtConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.signing_key.is_empty() {
            return Err(AuthError::InternalError("empty signing key".to_string()));
        }
        if self.access_ttl.is_zero() {
            return Err(AuthError::InternalError("access ttl must be positive".to_string()));
        }
        if self.refresh_ttl <= self.access_ttl {
            return Err(AuthError::InternalError(
                "refresh ttl must exceed access ttl".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String, // user id as string
    name: String,
    typ: TokenKind,
    exp: i64,
    iat: i64,
    /// Millisecond issue time; per-user revocation cutoffs compare against it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat_ms: Option<i64>,
    iss: String,
    aud: String,
    jti: String,
}

impl TokenClaims {
    fn into_claims(self) -> Result<Claims, AuthError> {
        let user_id = self.sub.parse::<UserId>().map_err(|_| AuthError::TokenInvalid)?;
        let issued_at = match self.iat_ms {
            Some(ms) => DateTime::from_timestamp_millis(ms),
            None => DateTime::from_timestamp(self.iat, 0),
        }
        .ok_or(AuthError::TokenInvalid)?;
        let expires_at = DateTime::from_timestamp(self.exp, 0).ok_or(AuthError::TokenInvalid)?;
        Ok(Claims {
            user_id,
            username: self.name,
            token_id: self.jti,
            kind: self.typ,
            issued_at,
            expires_at,
        })
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthError::TokenMalformed
        }
        _ => AuthError::TokenInvalid,
    }
}

/// HS256 issuer for access/refresh pairs.
///
/// Revocations are remembered in a process-local set for fast rejection and,
/// when a blacklist is attached, persisted there so other instances see them.
pub struct JwtTokenIssuer {
    cfg: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    revoked: DashMap<String, DateTime<Utc>>,
    blacklist: Option<Arc<dyn BlacklistService>>,
}

impl JwtTokenIssuer {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtTokenIssuer {
            encoding_key: EncodingKey::from_secret(&cfg.signing_key),
            decoding_key: DecodingKey::from_secret(&cfg.signing_key),
            cfg,
            revoked: DashMap::new(),
            blacklist: None,
        }
    }

    pub fn with_blacklist(mut self, blacklist: Arc<dyn BlacklistService>) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    #[inline]
    fn gen_jti() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn encode_token(
        &self,
        user_id: UserId,
        username: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.cfg.access_ttl,
            TokenKind::Refresh => self.cfg.refresh_ttl,
        };
        let exp_dt = deadline_after(now, ttl)?;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            name: username.to_owned(),
            typ: kind,
            exp: exp_dt.timestamp(),
            iat: now.timestamp(),
            iat_ms: Some(now.timestamp_millis()),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: Self::gen_jti(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        Ok((token, exp_dt))
    }

    fn validation(&self, check_exp: bool) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.leeway = 0;
        v.validate_exp = check_exp;
        v.set_audience(&[self.cfg.audience.as_str()]);
        v.set_issuer(&[self.cfg.issuer.as_str()]);
        v.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        v
    }

    fn decode_claims(&self, token: &str, check_exp: bool) -> Result<Claims, AuthError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation(check_exp))
            .map_err(map_jwt_error)?;
        data.claims.into_claims()
    }

    fn decode_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.decode_claims(token, true)?;
        if claims.kind != kind {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims)
    }

    fn decode_unverified(token: &str) -> Result<TokenClaims, AuthError> {
        let mut v = Validation::new(Algorithm::HS256);
        v.insecure_disable_signature_validation();
        v.validate_exp = false;
        v.validate_aud = false;
        v.required_spec_claims.clear();
        let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &v)
            .map_err(map_jwt_error)?;
        Ok(data.claims)
    }

    fn remember_revoked(&self, token_id: &str, expires_at: DateTime<Utc>) {
        if self.revoked.len() >= LOCAL_REVOCATION_PRUNE_AT {
            let now = Utc::now();
            self.revoked.retain(|_, exp| *exp > now);
        }
        self.revoked.insert(token_id.to_owned(), expires_at);
    }

    async fn revoke_kind(&self, token: &str, kind: TokenKind) -> Result<(), AuthError> {
        let claims = self.decode_claims(token, false)?;
        if claims.kind != kind {
            return Err(AuthError::TokenInvalid);
        }
        if claims.expires_at <= Utc::now() {
            tracing::debug!(token_id = %claims.token_id, "token already expired, nothing to revoke");
            return Ok(());
        }

        self.remember_revoked(&claims.token_id, claims.expires_at);
        if let Some(blacklist) = &self.blacklist {
            blacklist
                .add_token_to_blacklist(&claims.token_id, claims.expires_at)
                .await?;
        }
        tracing::info!(user_id = %claims.user_id, token_id = %claims.token_id, %kind, "token revoked");
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenIssuer for JwtTokenIssuer {
    fn generate_token_pair(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let (access_token, access_expires_at) =
            self.encode_token(user_id, username, TokenKind::Access, now)?;
        let (refresh_token, refresh_expires_at) =
            self.encode_token(user_id, username, TokenKind::Refresh, now)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_kind(token, TokenKind::Access)
    }

    fn verify_refresh_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_kind(token, TokenKind::Refresh)
    }

    fn get_token_id(&self, token: &str) -> Result<String, AuthError> {
        let claims = Self::decode_unverified(token)?;
        if claims.jti.is_empty() {
            return Err(AuthError::TokenMalformed);
        }
        Ok(claims.jti)
    }

    fn peek_claims(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_claims(token, false)
    }

    fn is_locally_revoked(&self, token_id: &str) -> bool {
        self.revoked
            .get(token_id)
            .is_some_and(|exp| *exp > Utc::now())
    }

    fn max_token_ttl(&self) -> Duration {
        self.cfg.access_ttl.max(self.cfg.refresh_ttl)
    }

    async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        self.revoke_kind(token, TokenKind::Access).await
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), AuthError> {
        self.revoke_kind(token, TokenKind::Refresh).await
    }
}
