use crate::application_impl::*;
use crate::application_port::*;
use crate::cache::MultiTierCache;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::Janitor;
use crate::settings::Settings;
use anyhow::{Context, anyhow};
use nanoid::nanoid;
use sqlx::{MySql, Pool};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Stores {
    user_repo: Arc<dyn UserRepo>,
    session_repo: Arc<dyn SessionRepo>,
    blacklist_repo: Arc<dyn BlacklistRepo>,
    pool: Option<Pool<MySql>>,
}

async fn open_stores(
    settings: &Settings,
    credential_hasher: Arc<dyn CredentialHasher>,
) -> anyhow::Result<Stores> {
    match settings.store.backend.as_str() {
        "memory" => Ok(Stores {
            user_repo: Arc::new(MemoryUserRepo::new(credential_hasher)),
            session_repo: Arc::new(MemorySessionRepo::new()),
            blacklist_repo: Arc::new(MemoryBlacklistRepo::new()),
            pool: None,
        }),
        "mysql" => {
            let dsn = settings
                .store
                .dsn
                .as_deref()
                .ok_or_else(|| anyhow!("store.dsn is required for the mysql backend"))?;
            let pool = Pool::<MySql>::connect(dsn)
                .await
                .context("connect to mysql")?;
            let value: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await?;
            debug!("MySQL -> {}", value);
            if settings.store.migrate {
                migrate(&pool).await.context("apply mysql schema")?;
            }
            Ok(Stores {
                user_repo: Arc::new(MySqlUserRepo::new(pool.clone(), credential_hasher)),
                session_repo: Arc::new(MySqlSessionRepo::new(pool.clone())),
                blacklist_repo: Arc::new(MySqlBlacklistRepo::new(pool.clone())),
                pool: Some(pool),
            })
        }
        other => Err(anyhow!("Unknown store backend: {}", other)),
    }
}

async fn open_distributed_cache(settings: &Settings) -> anyhow::Result<Arc<dyn DistributedCache>> {
    match settings.redis.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryDistributedCache::new())),
        "redis" => {
            let dsn = settings
                .redis
                .dsn
                .as_deref()
                .ok_or_else(|| anyhow!("redis.dsn is required for the redis backend"))?;
            let redis_client = redis::Client::open(dsn)?;
            let mut redis_manager = redis_client
                .get_connection_manager()
                .await
                .context("connect to redis")?;
            let pong: String = redis::cmd("PING").query_async(&mut redis_manager).await?;
            debug!("PING -> {}", pong);
            Ok(Arc::new(RedisDistributedCache::new(
                redis_manager,
                settings.cache.key_prefix.clone(),
                settings.cache.op_timeout(),
            )))
        }
        other => Err(anyhow!("Unknown redis backend: {}", other)),
    }
}

/// Composition root: every port wired to the backends named in the settings.
pub struct Server {
    pub run_id: String,
    pub auth_service: Arc<dyn AuthService>,
    pub user_repo: Arc<dyn UserRepo>,
    pub session_service: Arc<dyn SessionService>,
    pub blacklist_service: Arc<dyn BlacklistService>,
    pub cache: Arc<MultiTierCache>,
    janitor_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let alphabet: [char; 16] = [
            '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f',
        ];
        let run_id = nanoid!(10, &alphabet);

        let jwt_config = settings.auth.jwt_config()?;
        let cache_config = settings.cache.cache_config()?;

        let credential_hasher: Arc<dyn CredentialHasher> =
            Arc::new(Argon2PasswordHasher::default());
        let stores = open_stores(settings, credential_hasher).await?;
        let remote = open_distributed_cache(settings).await?;
        let cache = Arc::new(MultiTierCache::new(cache_config, Some(remote)));

        let session_service: Arc<dyn SessionService> = Arc::new(CachedSessionService::new(
            stores.session_repo,
            cache.clone(),
        ));
        let blacklist_service: Arc<dyn BlacklistService> = Arc::new(CachedBlacklistService::new(
            stores.blacklist_repo,
            cache.clone(),
        ));
        let token_issuer: Arc<dyn TokenIssuer> =
            Arc::new(JwtTokenIssuer::new(jwt_config).with_blacklist(blacklist_service.clone()));

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            stores.user_repo.clone(),
            token_issuer,
            session_service.clone(),
            blacklist_service.clone(),
            cache.clone(),
        ));

        // region runtime infra
        let cancel = CancellationToken::new();

        let janitor = Janitor::new(
            session_service.clone(),
            blacklist_service.clone(),
            settings.janitor.interval(),
            cancel.clone(),
        );
        let janitor_handle = tokio::spawn(async move {
            let _ = janitor.run().await;
        });

        // endregion

        info!(
            %run_id,
            store = %settings.store.backend,
            redis = %settings.redis.backend,
            "server started"
        );

        Ok(Self {
            run_id,
            auth_service,
            user_repo: stores.user_repo,
            session_service,
            blacklist_service,
            cache,
            janitor_handle: Mutex::new(Some(janitor_handle)),
            cancel,
            pool: stores.pool,
        })
    }

    pub async fn shutdown(&self) {
        info!(run_id = %self.run_id, "server shutting down...");

        self.cancel.cancel();

        let handle = self.janitor_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("janitor handle dropped: {:?}", r);
        }

        let stats = self.cache.stats();
        info!(?stats, hit_rate = stats.hit_rate(), "cache closed");
        self.cache.close();

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
