//! Fixtures shared by the unit tests. Everything runs on the in-memory backends.

use crate::application_impl::*;
use crate::application_port::*;
use crate::cache::{CacheConfig, MultiTierCache};
use crate::domain_model::UserId;
use crate::infra_memory::*;
use argon2::Params;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn fast_hasher() -> Argon2PasswordHasher {
    let params = Params::new(8, 1, 1, None).unwrap();
    Argon2PasswordHasher::with_params(params)
}

pub(crate) fn jwt_config() -> JwtConfig {
    JwtConfig {
        issuer: "tokenvault-test".to_string(),
        audience: "tokenvault-clients".to_string(),
        access_ttl: Duration::from_secs(15 * 60),
        refresh_ttl: Duration::from_secs(7 * 24 * 3600),
        signing_key: b"test-signing-key-0123456789abcdef".to_vec(),
    }
}

pub(crate) fn multi_tier(remote: Arc<MemoryDistributedCache>) -> Arc<MultiTierCache> {
    let config = CacheConfig {
        local_ttl: Duration::from_secs(60),
        default_ttl: Duration::from_secs(30 * 60),
        cleanup_interval: Duration::from_secs(1),
        l2_enabled: true,
    };
    Arc::new(MultiTierCache::new(config, Some(remote)))
}

pub(crate) fn blacklist_service() -> (Arc<dyn BlacklistService>, Arc<MemoryBlacklistRepo>) {
    let repo = Arc::new(MemoryBlacklistRepo::new());
    let cache = multi_tier(Arc::new(MemoryDistributedCache::new()));
    let service = Arc::new(CachedBlacklistService::new(repo.clone(), cache));
    (service, repo)
}

/// One facade instance plus handles on its backends. `alice`/`correct horse`
/// is seeded as user 42.
pub(crate) struct AuthFixture {
    pub service: RealAuthService,
    pub issuer: Arc<JwtTokenIssuer>,
    pub sessions: Arc<dyn SessionService>,
    pub users: Arc<MemoryUserRepo>,
    pub remote: Arc<MemoryDistributedCache>,
    session_repo: Arc<MemorySessionRepo>,
    blacklist_repo: Arc<MemoryBlacklistRepo>,
}

struct Instance {
    service: RealAuthService,
    issuer: Arc<JwtTokenIssuer>,
    sessions: Arc<dyn SessionService>,
}

fn instance(
    users: Arc<MemoryUserRepo>,
    session_repo: Arc<MemorySessionRepo>,
    blacklist_repo: Arc<MemoryBlacklistRepo>,
    remote: Arc<MemoryDistributedCache>,
) -> Instance {
    let cache = multi_tier(remote);
    let blacklist: Arc<dyn BlacklistService> =
        Arc::new(CachedBlacklistService::new(blacklist_repo, cache.clone()));
    let sessions: Arc<dyn SessionService> =
        Arc::new(CachedSessionService::new(session_repo, cache.clone()));
    let issuer = Arc::new(JwtTokenIssuer::new(jwt_config()).with_blacklist(blacklist.clone()));
    let service = RealAuthService::new(users, issuer.clone(), sessions.clone(), blacklist, cache);
    Instance {
        service,
        issuer,
        sessions,
    }
}

pub(crate) async fn auth_fixture() -> AuthFixture {
    let users = Arc::new(MemoryUserRepo::new(Arc::new(fast_hasher())));
    users
        .insert_with_id(UserId(42), "alice", "correct horse")
        .await
        .unwrap();
    let session_repo = Arc::new(MemorySessionRepo::new());
    let blacklist_repo = Arc::new(MemoryBlacklistRepo::new());
    let remote = Arc::new(MemoryDistributedCache::new());

    let Instance {
        service,
        issuer,
        sessions,
    } = instance(
        users.clone(),
        session_repo.clone(),
        blacklist_repo.clone(),
        remote.clone(),
    );
    AuthFixture {
        service,
        issuer,
        sessions,
        users,
        remote,
        session_repo,
        blacklist_repo,
    }
}

impl AuthFixture {
    /// Another process: own issuer and L1, same origin stores and L2.
    pub fn second_instance(&self) -> RealAuthService {
        instance(
            self.users.clone(),
            self.session_repo.clone(),
            self.blacklist_repo.clone(),
            self.remote.clone(),
        )
        .service
    }
}
