use crate::application_port::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically drops expired session and blacklist rows from the origin stores.
pub struct Janitor {
    session_service: Arc<dyn SessionService>,
    blacklist_service: Arc<dyn BlacklistService>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: u64,
    pub blacklist_entries: u64,
}

impl Janitor {
    pub fn new(
        session_service: Arc<dyn SessionService>,
        blacklist_service: Arc<dyn BlacklistService>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            session_service,
            blacklist_service,
            interval,
            cancellation_token,
        }
    }

    pub async fn tick_once(&self) -> anyhow::Result<PurgeReport> {
        let sessions = self.session_service.purge_expired().await?;
        let blacklist_entries = self.blacklist_service.purge_expired().await?;
        let report = PurgeReport {
            sessions,
            blacklist_entries,
        };
        if report != PurgeReport::default() {
            tracing::info!(sessions, blacklist_entries, "purged expired rows");
        }
        Ok(report)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("janitor shutting down...");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.tick_once().await {
                        tracing::error!("janitor error: {:#}", e);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{CachedBlacklistService, CachedSessionService};
    use crate::domain_model::UserId;
    use crate::infra_memory::{MemoryBlacklistRepo, MemoryDistributedCache, MemorySessionRepo};
    use crate::test_support::multi_tier;
    use chrono::Utc;

    struct Fixture {
        sessions: Arc<dyn SessionService>,
        blacklist: Arc<dyn BlacklistService>,
        session_repo: Arc<MemorySessionRepo>,
    }

    fn fixture() -> Fixture {
        let cache = multi_tier(Arc::new(MemoryDistributedCache::new()));
        let session_repo = Arc::new(MemorySessionRepo::new());
        Fixture {
            sessions: Arc::new(CachedSessionService::new(session_repo.clone(), cache.clone())),
            blacklist: Arc::new(CachedBlacklistService::new(
                Arc::new(MemoryBlacklistRepo::new()),
                cache,
            )),
            session_repo,
        }
    }

    #[tokio::test]
    async fn tick_purges_both_stores() {
        let f = fixture();
        let past = Utc::now() - chrono::Duration::seconds(1);
        let future = Utc::now() + chrono::Duration::hours(1);
        f.sessions.create_session(UserId(1), "old", past).await.unwrap();
        f.sessions.create_session(UserId(2), "new", future).await.unwrap();
        f.blacklist.add_token_to_blacklist("gone", past).await.unwrap();
        f.blacklist.add_token_to_blacklist("live", future).await.unwrap();

        let janitor = Janitor::new(
            f.sessions.clone(),
            f.blacklist.clone(),
            Duration::from_secs(60),
            CancellationToken::new(),
        );

        let report = janitor.tick_once().await.unwrap();
        assert_eq!(
            report,
            PurgeReport {
                sessions: 1,
                blacklist_entries: 1
            }
        );
        assert_eq!(f.session_repo.len(), 1);
        assert_eq!(janitor.tick_once().await.unwrap(), PurgeReport::default());
        assert!(f.blacklist.is_token_blacklisted("live").await.unwrap());
    }

    #[tokio::test]
    async fn run_purges_periodically_and_stops_on_cancel() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let janitor = Janitor::new(
            f.sessions.clone(),
            f.blacklist.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        );
        f.sessions
            .create_session(UserId(1), "old", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();

        let handle = tokio::spawn(async move { janitor.run().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(f.session_repo.is_empty());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
