use super::util::deadline_after;
use crate::application_port::*;
use crate::cache::{CacheKeys, MultiTierCache, TypedCache};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Session store backed by the origin repo, with `session:<user_id>` cached
/// in front of it. Cache failures never fail a session operation.
pub struct CachedSessionService {
    repo: Arc<dyn SessionRepo>,
    cache: TypedCache<Session>,
}

impl CachedSessionService {
    pub fn new(repo: Arc<dyn SessionRepo>, cache: Arc<MultiTierCache>) -> Self {
        Self {
            repo,
            cache: TypedCache::new(cache),
        }
    }

    async fn cache_session(&self, session: &Session) {
        let key = CacheKeys::session(session.user_id);
        match CacheKeys::session_ttl(session.expires_at) {
            Some(ttl) => {
                if let Err(e) = self.cache.set(&key, session, ttl).await {
                    tracing::warn!(user_id = %session.user_id, error = %e, "failed to cache session");
                }
            }
            None => self.invalidate(session.user_id).await,
        }
    }

    async fn invalidate(&self, user_id: UserId) {
        if let Err(e) = self.cache.delete(&CacheKeys::session(user_id)).await {
            tracing::warn!(%user_id, error = %e, "failed to invalidate cached session");
        }
    }

    async fn write_token(
        &self,
        user_id: UserId,
        expected_token: Option<&str>,
        new_token: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let expires_at = deadline_after(Utc::now(), ttl)?;
        let updated = self
            .repo
            .update_token(user_id, expected_token, new_token, expires_at)
            .await?;
        if !updated {
            return Err(AuthError::SessionNotFound);
        }
        self.invalidate(user_id).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionService for CachedSessionService {
    async fn create_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let session = self
            .repo
            .upsert(user_id, refresh_token, expires_at, Utc::now())
            .await?;
        self.cache_session(&session).await;
        tracing::debug!(%user_id, session_id = session.id, "session created");
        Ok(session)
    }

    async fn get_session(&self, user_id: UserId) -> Result<Session, AuthError> {
        let mut cached_was_expired = false;
        if let Some(session) = self.cache.get(&CacheKeys::session(user_id)).await {
            if !session.is_expired() {
                return Ok(session);
            }
            cached_was_expired = true;
            self.invalidate(user_id).await;
        }

        match self.repo.find_active_by_user(user_id, Utc::now()).await? {
            Some(session) => {
                self.cache_session(&session).await;
                Ok(session)
            }
            None if cached_was_expired => Err(AuthError::SessionExpired),
            None => Err(AuthError::SessionNotFound),
        }
    }

    async fn get_session_by_token(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.repo
            .find_active_by_token(refresh_token, Utc::now())
            .await?
            .ok_or(AuthError::SessionNotFound)
    }

    async fn update_session(
        &self,
        user_id: UserId,
        new_refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        self.write_token(user_id, None, new_refresh_token, ttl).await
    }

    async fn rotate_session(
        &self,
        user_id: UserId,
        old_refresh_token: &str,
        new_refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        self.write_token(user_id, Some(old_refresh_token), new_refresh_token, ttl)
            .await
    }

    async fn delete_session(&self, user_id: UserId) -> Result<(), AuthError> {
        let existed = self.repo.delete_by_user(user_id).await?;
        self.invalidate(user_id).await;
        tracing::debug!(%user_id, existed, "session deleted");
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, AuthError> {
        self.repo.delete_expired(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::{MemoryDistributedCache, MemorySessionRepo};
    use crate::test_support::multi_tier;
    use assert_matches::assert_matches;

    struct Fixture {
        service: CachedSessionService,
        repo: Arc<MemorySessionRepo>,
        remote: Arc<MemoryDistributedCache>,
        cache: Arc<MultiTierCache>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemorySessionRepo::new());
        let remote = Arc::new(MemoryDistributedCache::new());
        let cache = multi_tier(remote.clone());
        Fixture {
            service: CachedSessionService::new(repo.clone(), cache.clone()),
            repo,
            remote,
            cache,
        }
    }

    fn in_days(days: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::days(days)
    }

    #[tokio::test]
    async fn second_create_replaces_first() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt-1", in_days(7)).await.unwrap();
        f.service.create_session(UserId(1), "rt-2", in_days(7)).await.unwrap();

        assert_eq!(f.repo.len(), 1);
        let session = f.service.get_session(UserId(1)).await.unwrap();
        assert_eq!(session.refresh_token, "rt-2");
        assert_matches!(
            f.service.get_session_by_token("rt-1").await,
            Err(AuthError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn get_is_served_from_cache_after_create() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt", in_days(7)).await.unwrap();

        let session = f.service.get_session(UserId(1)).await.unwrap();

        assert_eq!(session.refresh_token, "rt");
        assert_eq!(f.repo.reads(), 0);
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_origin_and_backfills() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt", in_days(7)).await.unwrap();
        f.cache.invalidate("session:*").await.unwrap();

        assert_eq!(f.service.get_session(UserId(1)).await.unwrap().refresh_token, "rt");
        assert_eq!(f.repo.reads(), 1);
        assert!(f.remote.exists("session:1").await.unwrap());

        f.service.get_session(UserId(1)).await.unwrap();
        assert_eq!(f.repo.reads(), 1);
    }

    #[tokio::test]
    async fn expired_cached_session_is_evicted() {
        let f = fixture();
        let expired = Session {
            id: 9,
            user_id: UserId(3),
            refresh_token: "old".to_string(),
            expires_at: Utc::now() - chrono::Duration::seconds(5),
            created_at: Utc::now() - chrono::Duration::days(7),
        };
        f.cache
            .set(&CacheKeys::session(UserId(3)), &expired, Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_matches!(
            f.service.get_session(UserId(3)).await,
            Err(AuthError::SessionExpired)
        );
        assert!(!f.remote.exists("session:3").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_has_no_session() {
        let f = fixture();
        assert_matches!(
            f.service.get_session(UserId(404)).await,
            Err(AuthError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn update_invalidates_cached_copy() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt-1", in_days(7)).await.unwrap();

        f.service
            .update_session(UserId(1), "rt-2", Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(!f.remote.exists("session:1").await.unwrap());
        let session = f.service.get_session(UserId(1)).await.unwrap();
        assert_eq!(session.refresh_token, "rt-2");
        assert!(session.expires_at <= Utc::now() + chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn update_without_session_fails() {
        let f = fixture();
        assert_matches!(
            f.service.update_session(UserId(1), "rt", Duration::from_secs(60)).await,
            Err(AuthError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn rotate_requires_current_token() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt-1", in_days(7)).await.unwrap();

        f.service
            .rotate_session(UserId(1), "rt-1", "rt-2", Duration::from_secs(60))
            .await
            .unwrap();
        assert_matches!(
            f.service
                .rotate_session(UserId(1), "rt-1", "rt-3", Duration::from_secs(60))
                .await,
            Err(AuthError::SessionNotFound)
        );
        assert_eq!(f.service.get_session(UserId(1)).await.unwrap().refresh_token, "rt-2");
    }

    #[tokio::test]
    async fn get_by_token_skips_cache() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt", in_days(7)).await.unwrap();

        let session = f.service.get_session_by_token("rt").await.unwrap();

        assert_eq!(session.user_id, UserId(1));
        assert_eq!(f.repo.reads(), 1);
    }

    #[tokio::test]
    async fn delete_removes_origin_and_cache() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt", in_days(7)).await.unwrap();

        f.service.delete_session(UserId(1)).await.unwrap();

        assert!(f.repo.is_empty());
        assert_matches!(
            f.service.get_session(UserId(1)).await,
            Err(AuthError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn cache_outage_does_not_fail_session_operations() {
        let f = fixture();
        f.remote.set_offline(true);

        f.service.create_session(UserId(1), "rt", in_days(7)).await.unwrap();
        f.cache.local().clear();
        assert_eq!(f.service.get_session(UserId(1)).await.unwrap().refresh_token, "rt");
        f.service.delete_session(UserId(1)).await.unwrap();
    }

    /// Rotates the row right after handing out the pre-rotation copy, so the
    /// caller backfills a session that is already stale.
    struct RotatingRepo {
        inner: Arc<MemorySessionRepo>,
        rotate_to: &'static str,
    }

    #[async_trait::async_trait]
    impl SessionRepo for RotatingRepo {
        async fn upsert(
            &self,
            user_id: UserId,
            refresh_token: &str,
            expires_at: DateTime<Utc>,
            created_at: DateTime<Utc>,
        ) -> Result<Session, AuthError> {
            self.inner
                .upsert(user_id, refresh_token, expires_at, created_at)
                .await
        }

        async fn find_active_by_user(
            &self,
            user_id: UserId,
            now: DateTime<Utc>,
        ) -> Result<Option<Session>, AuthError> {
            let found = self.inner.find_active_by_user(user_id, now).await?;
            if let Some(session) = &found {
                self.inner
                    .update_token(user_id, None, self.rotate_to, session.expires_at)
                    .await?;
            }
            Ok(found)
        }

        async fn find_active_by_token(
            &self,
            refresh_token: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<Session>, AuthError> {
            self.inner.find_active_by_token(refresh_token, now).await
        }

        async fn update_token(
            &self,
            user_id: UserId,
            expected_token: Option<&str>,
            new_token: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<bool, AuthError> {
            self.inner
                .update_token(user_id, expected_token, new_token, expires_at)
                .await
        }

        async fn delete_by_user(&self, user_id: UserId) -> Result<bool, AuthError> {
            self.inner.delete_by_user(user_id).await
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
            self.inner.delete_expired(now).await
        }
    }

    #[tokio::test]
    async fn backfill_racing_a_rotation_is_cached_briefly() {
        let origin = Arc::new(MemorySessionRepo::new());
        let remote = Arc::new(MemoryDistributedCache::new());
        let racing = CachedSessionService::new(
            Arc::new(RotatingRepo {
                inner: origin.clone(),
                rotate_to: "rt-2",
            }),
            multi_tier(remote.clone()),
        );
        origin
            .upsert(UserId(1), "rt-1", in_days(7), Utc::now())
            .await
            .unwrap();

        assert_eq!(racing.get_session(UserId(1)).await.unwrap().refresh_token, "rt-1");

        let (_, ttl) = remote.get_with_ttl("session:1").await.unwrap().unwrap();
        assert!(ttl.unwrap() <= crate::cache::SESSION_CACHE_TTL);
        let origin_now = origin.find_active_by_user(UserId(1), Utc::now()).await.unwrap();
        assert_eq!(origin_now.unwrap().refresh_token, "rt-2");
    }

    #[tokio::test]
    async fn long_sessions_are_cached_for_at_most_the_cap() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt", in_days(7)).await.unwrap();

        let (_, ttl) = f.remote.get_with_ttl("session:1").await.unwrap().unwrap();
        assert!(ttl.unwrap() <= crate::cache::SESSION_CACHE_TTL);
    }

    #[tokio::test]
    async fn rewriting_the_same_token_still_succeeds() {
        let f = fixture();
        f.service.create_session(UserId(1), "rt", in_days(7)).await.unwrap();

        f.service
            .update_session(UserId(1), "rt", Duration::from_secs(3600))
            .await
            .unwrap();
        f.service
            .update_session(UserId(1), "rt", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(f.service.get_session(UserId(1)).await.unwrap().refresh_token, "rt");
    }

    #[tokio::test]
    async fn purge_drops_expired_rows() {
        let f = fixture();
        f.service
            .create_session(UserId(1), "old", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        f.service.create_session(UserId(2), "new", in_days(1)).await.unwrap();

        assert_eq!(f.service.purge_expired().await.unwrap(), 1);
        assert_eq!(f.repo.len(), 1);
    }
}
