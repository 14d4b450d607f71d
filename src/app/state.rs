use crate::adapter::catalog::MemoryCatalog;
use crate::adapter::memory::MemoryStore;
use crate::adapter::redis::RedisStore;
use crate::config::{Settings, StoreBackend};
use crate::domain::{KeySpace, ViewStatus, ViewerId};
use crate::error::TrendingError;
use crate::port::{ArticleCatalog, Clock, DebounceStore, RankingStore, SystemClock};
use crate::scheduler::{ArchivalJob, ArchivalPolicy};
use crate::service::{
    RankingService, TrendingService, ViewPolicy, ViewRecorder, ViewTicket, ViewerRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state handed to every handler.
pub struct AppState {
    pub ranking: Arc<RankingService>,
    pub trending: Arc<TrendingService>,
    pub recorder: ViewRecorder,
    pub viewers: ViewerRegistry,
    pub archival: Arc<ArchivalJob>,
}

/// Knobs for wiring services around already-built adapters.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub view_policy: ViewPolicy,
    pub archival_policy: ArchivalPolicy,
    pub trending_cache_ttl: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            view_policy: ViewPolicy::default(),
            archival_policy: ArchivalPolicy::default(),
            trending_cache_ttl: Duration::from_secs(60),
        }
    }
}

impl From<&Settings> for ServiceOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            view_policy: ViewPolicy {
                cooldown: settings.view_cooldown,
                settle_delay: settings.view_settle_delay,
            },
            archival_policy: ArchivalPolicy {
                retention: settings.archive_retention,
                lease_ttl: settings.archive_lease,
                ..ArchivalPolicy::default()
            },
            trending_cache_ttl: settings.trending_cache_ttl,
        }
    }
}

impl AppState {
    /// Wire the services over the given store, catalog and clock.
    pub fn build<S>(
        store: Arc<S>,
        keys: KeySpace,
        catalog: Arc<dyn ArticleCatalog>,
        clock: Arc<dyn Clock>,
        options: ServiceOptions,
    ) -> Self
    where
        S: RankingStore + DebounceStore + 'static,
    {
        let ranking_store: Arc<dyn RankingStore> = store.clone();
        let debounce_store: Arc<dyn DebounceStore> = store;

        let ranking = Arc::new(RankingService::new(ranking_store, keys));
        let trending = Arc::new(TrendingService::new(
            ranking.clone(),
            catalog,
            options.trending_cache_ttl,
        ));
        let recorder = ViewRecorder::new(
            ranking.clone(),
            debounce_store,
            trending.clone(),
            clock,
            options.view_policy,
        );
        let archival = Arc::new(
            ArchivalJob::new(ranking.clone(), options.archival_policy).with_trending(trending.clone()),
        );

        Self {
            ranking,
            trending,
            recorder,
            viewers: ViewerRegistry::new(),
            archival,
        }
    }

    /// Create `AppState` from configuration settings, connecting the chosen
    /// store backend and loading the article catalog.
    pub async fn from_settings(settings: &Settings) -> Result<Self, TrendingError> {
        let keys = KeySpace::new(settings.redis_key_prefix.clone());

        let catalog: Arc<dyn ArticleCatalog> = match &settings.article_catalog_path {
            Some(path) => Arc::new(MemoryCatalog::from_json_file(path).await?),
            None => Arc::new(MemoryCatalog::new()),
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let options = ServiceOptions::from(settings);

        let state = match settings.store_backend {
            StoreBackend::Redis => {
                let store =
                    RedisStore::connect(&settings.redis_url, keys.clone(), settings.redis_timeout)
                        .await?;
                info!("Connected to Redis ranking store");
                Self::build(Arc::new(store), keys, catalog, clock, options)
            }
            StoreBackend::Memory => {
                info!("Using in-memory ranking store; rankings are not shared or persisted");
                let store = MemoryStore::new(keys.clone());
                Self::build(Arc::new(store), keys, catalog, clock, options)
            }
        };
        Ok(state)
    }

    /// Record a view signal from `viewer`.
    ///
    /// The viewer's context stays registered while the commit is armed, so a
    /// teardown can still cancel it, and is dropped once nothing is pending.
    pub async fn record_view(
        self: &Arc<Self>,
        viewer: &ViewerId,
        raw_article_id: &str,
    ) -> Result<ViewStatus, TrendingError> {
        let context = self.viewers.open(viewer);
        match self.recorder.record_view(raw_article_id, &context).await {
            Ok(ViewTicket::Scheduled(handle)) => {
                let state = Arc::clone(self);
                tokio::spawn(async move {
                    // Commit failures are logged by the recorder.
                    let _ = handle.await;
                    state.viewers.release(&context);
                });
                Ok(ViewStatus::Scheduled)
            }
            Ok(ticket) => {
                self.viewers.release(&context);
                Ok(ticket.status())
            }
            Err(e) => {
                self.viewers.release(&context);
                Err(e)
            }
        }
    }
}
