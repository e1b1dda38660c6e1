use crate::application_port::*;
use crate::cache::{CacheKeys, MultiTierCache, REVOCATION_CUTOFF_TTL, TypedCache};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Revocation registry. The origin repo is authoritative and only positive
/// answers are cached: token entries for their remaining lifetime, per-user
/// cutoffs for `REVOCATION_CUTOFF_TTL` since a later revoke-all may raise them.
pub struct CachedBlacklistService {
    repo: Arc<dyn BlacklistRepo>,
    cache: TypedCache<BlacklistEntry>,
    cutoffs: TypedCache<RevocationCutoff>,
}

impl CachedBlacklistService {
    pub fn new(repo: Arc<dyn BlacklistRepo>, cache: Arc<MultiTierCache>) -> Self {
        Self {
            repo,
            cache: TypedCache::new(cache.clone()),
            cutoffs: TypedCache::new(cache),
        }
    }

    async fn load_cutoff(&self, user_id: UserId) -> Result<Option<RevocationCutoff>, AuthError> {
        let Some(revoked_before) = self.repo.find_user_cutoff(user_id, Utc::now()).await? else {
            return Ok(None);
        };
        let cutoff = RevocationCutoff {
            user_id,
            revoked_before,
        };
        let key = CacheKeys::user_revoked_before(user_id);
        if let Err(e) = self.cutoffs.set(&key, &cutoff, REVOCATION_CUTOFF_TTL).await {
            tracing::warn!(%user_id, error = %e, "failed to cache revocation cutoff");
        }
        Ok(Some(cutoff))
    }

    async fn cache_entry(&self, entry: &BlacklistEntry) {
        let Some(ttl) = CacheKeys::blacklist_ttl(entry.expires_at) else {
            return;
        };
        let key = CacheKeys::blacklist(&entry.token_id);
        if let Err(e) = self.cache.set(&key, entry, ttl).await {
            tracing::warn!(token_id = %entry.token_id, error = %e, "failed to cache blacklist entry");
        }
    }
}

#[async_trait::async_trait]
impl BlacklistService for CachedBlacklistService {
    async fn add_token_to_blacklist(
        &self,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.repo.insert(token_id, expires_at).await?;

        let entry = BlacklistEntry {
            token_id: token_id.to_owned(),
            expires_at,
            created_at: Utc::now(),
        };
        self.cache_entry(&entry).await;
        tracing::debug!(token_id, %expires_at, "token blacklisted");
        Ok(())
    }

    async fn is_token_blacklisted(&self, token_id: &str) -> Result<bool, AuthError> {
        let now = Utc::now();
        if let Some(entry) = self.cache.get(&CacheKeys::blacklist(token_id)).await {
            if entry.is_active_at(now) {
                return Ok(true);
            }
        }

        match self.repo.find_active(token_id, now).await? {
            Some(entry) => {
                self.cache_entry(&entry).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_user_tokens_before(
        &self,
        user_id: UserId,
        revoked_before: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.repo
            .insert_user_cutoff(user_id, revoked_before, expires_at)
            .await?;
        // re-read so the cached value is the row's, which may hold a later cutoff
        self.load_cutoff(user_id).await?;
        tracing::debug!(%user_id, %revoked_before, "user tokens revoked");
        Ok(())
    }

    async fn is_user_token_revoked(
        &self,
        user_id: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let key = CacheKeys::user_revoked_before(user_id);
        let cutoff = match self.cutoffs.get(&key).await {
            Some(cutoff) => Some(cutoff),
            None => self.load_cutoff(user_id).await?,
        };
        Ok(cutoff.is_some_and(|cutoff| cutoff.revokes(issued_at)))
    }

    async fn purge_expired(&self) -> Result<u64, AuthError> {
        self.repo.delete_expired(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::{MemoryBlacklistRepo, MemoryDistributedCache};
    use crate::test_support::multi_tier;
    use std::time::Duration;

    fn service(
        remote: Arc<MemoryDistributedCache>,
        repo: Arc<MemoryBlacklistRepo>,
    ) -> CachedBlacklistService {
        CachedBlacklistService::new(repo, multi_tier(remote))
    }

    #[tokio::test]
    async fn future_entry_is_blacklisted() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let svc = service(Arc::new(MemoryDistributedCache::new()), repo.clone());

        assert!(!svc.is_token_blacklisted("tok-x").await.unwrap());
        svc.add_token_to_blacklist("tok-x", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert!(svc.is_token_blacklisted("tok-x").await.unwrap());
    }

    #[tokio::test]
    async fn past_entry_is_stored_but_has_no_effect() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let remote = Arc::new(MemoryDistributedCache::new());
        let svc = service(remote.clone(), repo.clone());

        svc.add_token_to_blacklist("tok-old", Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();

        assert!(repo.row("tok-old").is_some());
        assert!(!remote.exists("token:blacklist:tok-old").await.unwrap());
        assert!(!svc.is_token_blacklisted("tok-old").await.unwrap());
    }

    #[tokio::test]
    async fn second_instance_sees_entry_through_shared_tier() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let remote = Arc::new(MemoryDistributedCache::new());
        let first = service(remote.clone(), repo.clone());
        let second = service(remote.clone(), repo.clone());

        first
            .add_token_to_blacklist("tok-x", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert!(second.is_token_blacklisted("tok-x").await.unwrap());
        assert_eq!(repo.reads(), 0);
    }

    #[tokio::test]
    async fn origin_hit_is_recached_for_remaining_lifetime() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let remote = Arc::new(MemoryDistributedCache::new());
        repo.insert("tok-y", Utc::now() + chrono::Duration::seconds(90))
            .await
            .unwrap();
        let svc = service(remote.clone(), repo.clone());

        assert!(svc.is_token_blacklisted("tok-y").await.unwrap());
        assert_eq!(repo.reads(), 1);

        let (_, ttl) = remote
            .get_with_ttl("token:blacklist:tok-y")
            .await
            .unwrap()
            .unwrap();
        let ttl = ttl.unwrap();
        assert!(ttl <= Duration::from_secs(90));
        assert!(ttl > Duration::from_secs(80));

        assert!(svc.is_token_blacklisted("tok-y").await.unwrap());
        assert_eq!(repo.reads(), 1);
    }

    #[tokio::test]
    async fn cache_outage_falls_back_to_origin() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let remote = Arc::new(MemoryDistributedCache::new());
        let svc = service(remote.clone(), repo.clone());
        remote.set_offline(true);

        svc.add_token_to_blacklist("tok-z", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        let fresh = service(remote.clone(), repo.clone());

        assert!(fresh.is_token_blacklisted("tok-z").await.unwrap());
        assert_eq!(repo.reads(), 1);
    }

    #[tokio::test]
    async fn purge_drops_only_elapsed_rows() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let svc = service(Arc::new(MemoryDistributedCache::new()), repo.clone());
        svc.add_token_to_blacklist("old", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        svc.add_token_to_blacklist("new", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(svc.purge_expired().await.unwrap(), 1);
        assert!(repo.row("old").is_none());
        assert!(repo.row("new").is_some());
    }

    #[tokio::test]
    async fn user_cutoff_revokes_earlier_tokens_on_every_instance() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let remote = Arc::new(MemoryDistributedCache::new());
        let first = service(remote.clone(), repo.clone());
        let second = service(remote.clone(), repo.clone());
        let cutoff = Utc::now();

        assert!(!first.is_user_token_revoked(UserId(7), cutoff).await.unwrap());
        first
            .revoke_user_tokens_before(UserId(7), cutoff, cutoff + chrono::Duration::days(7))
            .await
            .unwrap();

        assert!(second.is_user_token_revoked(UserId(7), cutoff).await.unwrap());
        assert!(
            !second
                .is_user_token_revoked(UserId(7), cutoff + chrono::Duration::seconds(1))
                .await
                .unwrap()
        );
        assert!(!second.is_user_token_revoked(UserId(8), cutoff).await.unwrap());

        let (_, ttl) = remote
            .get_with_ttl("user:7:revoked_before")
            .await
            .unwrap()
            .unwrap();
        assert!(ttl.unwrap() <= REVOCATION_CUTOFF_TTL);
    }

    #[tokio::test]
    async fn earlier_cutoff_does_not_roll_back_a_later_one() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let svc = service(Arc::new(MemoryDistributedCache::new()), repo.clone());
        let later = Utc::now();
        let earlier = later - chrono::Duration::minutes(5);
        let until = later + chrono::Duration::days(7);

        svc.revoke_user_tokens_before(UserId(7), later, until).await.unwrap();
        svc.revoke_user_tokens_before(UserId(7), earlier, until).await.unwrap();

        let issued = later - chrono::Duration::minutes(1);
        assert!(svc.is_user_token_revoked(UserId(7), issued).await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_elapsed_user_cutoffs() {
        let repo = Arc::new(MemoryBlacklistRepo::new());
        let svc = service(Arc::new(MemoryDistributedCache::new()), repo.clone());
        let now = Utc::now();
        svc.revoke_user_tokens_before(UserId(1), now, now - chrono::Duration::seconds(1))
            .await
            .unwrap();
        svc.revoke_user_tokens_before(UserId(2), now, now + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(svc.purge_expired().await.unwrap(), 1);
        assert_eq!(repo.find_user_cutoff(UserId(1), now).await.unwrap(), None);
        assert_eq!(repo.find_user_cutoff(UserId(2), now).await.unwrap(), Some(now));
    }
}
