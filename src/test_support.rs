//! Shared test support utilities
//!
//! Provides a settable [`ManualClock`], a [`FailingStore`] that injects store
//! outages by key, and [`memory_app_state`] for wiring the whole service over
//! the in-memory backend.

use crate::adapter::catalog::MemoryCatalog;
use crate::adapter::memory::MemoryStore;
use crate::app::{AppState, ServiceOptions};
use crate::domain::{ArticleId, KeySpace, ViewerId};
use crate::error::TrendingError;
use crate::port::{Clock, DebounceStore, RankingStore, RenameOutcome, StoreFuture};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 2026-01-01T00:00:00Z
    pub fn at_epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Wraps a [`MemoryStore`] and fails selected operations with
/// [`TrendingError::StoreUnavailable`].
///
/// Ranking operations fail when [`fail_all`](Self::fail_all) is set or when a
/// touched key contains the configured substring. Debounce operations fail
/// only under `fail_all`.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_all: AtomicBool,
    fail_keys_containing: Mutex<Option<String>>,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_all: AtomicBool::new(false),
            fail_keys_containing: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_keys_containing(&self, pattern: Option<&str>) {
        *self.fail_keys_containing.lock() = pattern.map(str::to_string);
    }

    fn check(&self, keys: &[&str]) -> Result<(), TrendingError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(TrendingError::StoreUnavailable(
                "injected store outage".to_string(),
            ));
        }
        if let Some(pattern) = self.fail_keys_containing.lock().as_deref() {
            if let Some(key) = keys.iter().find(|k| k.contains(pattern)) {
                return Err(TrendingError::StoreUnavailable(format!(
                    "injected failure on {key}"
                )));
            }
        }
        Ok(())
    }
}

impl RankingStore for FailingStore {
    fn increment_score<'a>(
        &'a self,
        key: &'a str,
        member: &'a str,
        delta: f64,
    ) -> StoreFuture<'a, f64> {
        Box::pin(async move {
            self.check(&[key])?;
            self.inner.increment_score(key, member, delta).await
        })
    }

    fn increment_scores<'a>(
        &'a self,
        keys: &'a [String],
        member: &'a str,
        delta: f64,
    ) -> StoreFuture<'a, Vec<f64>> {
        Box::pin(async move {
            let names: Vec<&str> = keys.iter().map(String::as_str).collect();
            self.check(&names)?;
            self.inner.increment_scores(keys, member, delta).await
        })
    }

    fn range_desc_with_scores<'a>(
        &'a self,
        key: &'a str,
        start: isize,
        stop: isize,
    ) -> StoreFuture<'a, Vec<(String, f64)>> {
        Box::pin(async move {
            self.check(&[key])?;
            self.inner.range_desc_with_scores(key, start, stop).await
        })
    }

    fn rename_key<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, RenameOutcome> {
        Box::pin(async move {
            self.check(&[from, to])?;
            self.inner.rename_key(from, to).await
        })
    }

    fn list_keys_by_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check(&[prefix])?;
            self.inner.list_keys_by_prefix(prefix).await
        })
    }

    fn delete_keys<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let names: Vec<&str> = keys.iter().map(String::as_str).collect();
            self.check(&names)?;
            self.inner.delete_keys(keys).await
        })
    }

    fn try_acquire_lease<'a>(
        &'a self,
        name: &'a str,
        owner: &'a str,
        ttl: Duration,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.check(&[name])?;
            self.inner.try_acquire_lease(name, owner, ttl).await
        })
    }

    fn release_lease<'a>(&'a self, name: &'a str, owner: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check(&[name])?;
            self.inner.release_lease(name, owner).await
        })
    }
}

impl DebounceStore for FailingStore {
    fn last_view<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
    ) -> StoreFuture<'a, Option<DateTime<Utc>>> {
        Box::pin(async move {
            self.check(&[])?;
            self.inner.last_view(viewer, article).await
        })
    }

    fn mark_viewed<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check(&[])?;
            self.inner.mark_viewed(viewer, article, at, ttl).await
        })
    }
}

/// Everything a test needs to drive and inspect the wired service.
pub struct TestHarness {
    pub state: Arc<AppState>,
    pub store: Arc<FailingStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub clock: Arc<ManualClock>,
    pub keys: KeySpace,
}

/// Wire an [`AppState`] over an in-memory store that can be told to fail.
pub fn memory_app_state(options: ServiceOptions) -> TestHarness {
    let keys = KeySpace::default();
    let store = Arc::new(FailingStore::new(MemoryStore::new(keys.clone())));
    let catalog = Arc::new(MemoryCatalog::new());
    let clock = Arc::new(ManualClock::at_epoch());
    let state = AppState::build(
        store.clone(),
        keys.clone(),
        catalog.clone(),
        clock.clone(),
        options,
    );
    TestHarness {
        state: Arc::new(state),
        store,
        catalog,
        clock,
        keys,
    }
}
