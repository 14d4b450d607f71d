//! In-process sorted-set store.
//!
//! Mirrors the subset of Redis semantics the ranking subsystem relies on:
//! `ZINCRBY` (also in a `MULTI` block), `ZREVRANGE ... WITHSCORES` (ties ordered
//! by member, descending), `RENAMENX`, prefix `SCAN`, `DEL`, `SET NX PX` leases and `SET EX` markers.

use crate::domain::{ArticleId, KeySpace, ViewerId};
use crate::error::TrendingError;
use crate::port::{DebounceStore, RankingStore, RenameOutcome, StoreFuture};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Value {
    data: String,
    expires_at: Option<Instant>,
}

impl Value {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    sets: HashMap<String, HashMap<String, f64>>,
    values: HashMap<String, Value>,
}

impl Inner {
    fn evict_expired(&mut self) {
        let now = Instant::now();
        self.values.retain(|_, v| v.is_live(now));
    }

    fn remove(&mut self, key: &str) -> bool {
        let set = self.sets.remove(key).is_some();
        let value = self.values.remove(key).is_some();
        set || value
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    keys: KeySpace,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(keys: KeySpace) -> Self {
        Self {
            keys,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of members currently stored under `key`.
    #[must_use]
    pub fn cardinality(&self, key: &str) -> usize {
        self.inner.lock().sets.get(key).map_or(0, HashMap::len)
    }

    fn increment(&self, keys: &[String], member: &str, delta: f64) -> Result<Vec<f64>, TrendingError> {
        let mut inner = self.inner.lock();
        inner.evict_expired();
        if let Some(key) = keys.iter().find(|k| inner.values.contains_key(k.as_str())) {
            return Err(TrendingError::StoreUnavailable(format!(
                "WRONGTYPE {key} does not hold a sorted set"
            )));
        }
        let scores = keys
            .iter()
            .map(|key| {
                let score = inner
                    .sets
                    .entry(key.clone())
                    .or_default()
                    .entry(member.to_string())
                    .or_insert(0.0);
                *score += delta;
                *score
            })
            .collect();
        Ok(scores)
    }

    fn range_desc(&self, key: &str, start: isize, stop: isize) -> Vec<(String, f64)> {
        let inner = self.inner.lock();
        let Some(set) = inner.sets.get(key) else {
            return Vec::new();
        };

        let mut members: Vec<(String, f64)> =
            set.iter().map(|(m, s)| (m.clone(), *s)).collect();
        members.sort_by(|(ma, sa), (mb, sb)| sb.total_cmp(sa).then_with(|| mb.cmp(ma)));

        match resolve_range(members.len(), start, stop) {
            Some((from, to)) => members.drain(from..=to).collect(),
            None => Vec::new(),
        }
    }

    fn rename(&self, from: &str, to: &str) -> RenameOutcome {
        let mut inner = self.inner.lock();
        inner.evict_expired();
        if !inner.sets.contains_key(from) && !inner.values.contains_key(from) {
            return RenameOutcome::SourceMissing;
        }
        if inner.sets.contains_key(to) || inner.values.contains_key(to) {
            return RenameOutcome::TargetExists;
        }
        if let Some(set) = inner.sets.remove(from) {
            inner.sets.insert(to.to_string(), set);
        } else if let Some(value) = inner.values.remove(from) {
            inner.values.insert(to.to_string(), value);
        }
        RenameOutcome::Renamed
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut inner = self.inner.lock();
        inner.evict_expired();
        inner
            .sets
            .keys()
            .chain(inner.values.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn delete(&self, keys: &[String]) -> usize {
        let mut inner = self.inner.lock();
        inner.evict_expired();
        keys.iter().filter(|k| inner.remove(k)).count()
    }

    fn set_value(&self, key: &str, data: String, ttl: Duration, only_if_absent: bool) -> bool {
        let mut inner = self.inner.lock();
        inner.evict_expired();
        if only_if_absent && (inner.values.contains_key(key) || inner.sets.contains_key(key)) {
            return false;
        }
        inner.sets.remove(key);
        inner.values.insert(
            key.to_string(),
            Value {
                data,
                // An expiry past the clock's range never fires.
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        true
    }

    fn get_value(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        inner.evict_expired();
        inner.values.get(key).map(|v| v.data.clone())
    }

    fn delete_if_equal(&self, key: &str, expected: &str) {
        let mut inner = self.inner.lock();
        if inner.values.get(key).is_some_and(|v| v.data == expected) {
            inner.values.remove(key);
        }
    }
}

/// Resolve Redis-style inclusive `start..=stop` indices against `len`.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

impl RankingStore for MemoryStore {
    fn increment_score<'a>(
        &'a self,
        key: &'a str,
        member: &'a str,
        delta: f64,
    ) -> StoreFuture<'a, f64> {
        Box::pin(async move {
            let scores = self.increment(&[key.to_string()], member, delta)?;
            Ok(scores.first().copied().unwrap_or(delta))
        })
    }

    fn increment_scores<'a>(
        &'a self,
        keys: &'a [String],
        member: &'a str,
        delta: f64,
    ) -> StoreFuture<'a, Vec<f64>> {
        Box::pin(async move { self.increment(keys, member, delta) })
    }

    fn range_desc_with_scores<'a>(
        &'a self,
        key: &'a str,
        start: isize,
        stop: isize,
    ) -> StoreFuture<'a, Vec<(String, f64)>> {
        Box::pin(async move { Ok(self.range_desc(key, start, stop)) })
    }

    fn rename_key<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, RenameOutcome> {
        Box::pin(async move { Ok(self.rename(from, to)) })
    }

    fn list_keys_by_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move { Ok(self.keys_with_prefix(prefix)) })
    }

    fn delete_keys<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
        Box::pin(async move { Ok(self.delete(keys)) })
    }

    fn try_acquire_lease<'a>(
        &'a self,
        name: &'a str,
        owner: &'a str,
        ttl: Duration,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.set_value(name, owner.to_string(), ttl, true)) })
    }

    fn release_lease<'a>(&'a self, name: &'a str, owner: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.delete_if_equal(name, owner);
            Ok(())
        })
    }
}

impl DebounceStore for MemoryStore {
    fn last_view<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
    ) -> StoreFuture<'a, Option<DateTime<Utc>>> {
        Box::pin(async move {
            let key = self.keys.debounce(viewer.as_str(), article);
            Ok(self
                .get_value(&key)
                .and_then(|raw| raw.parse::<i64>().ok())
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()))
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
            let key = self.keys.debounce(viewer.as_str(), article);
            self.set_value(&key, at.timestamp_millis().to_string(), ttl, false);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_creates_and_accumulates() {
        let store = MemoryStore::default();
        assert_eq!(store.increment_score("w", "1", 1.0).await.unwrap(), 1.0);
        assert_eq!(store.increment_score("w", "1", 2.0).await.unwrap(), 3.0);
        assert_eq!(store.cardinality("w"), 1);
    }

    #[tokio::test]
    async fn range_orders_by_score_then_member_descending() {
        let store = MemoryStore::default();
        store.increment_score("w", "10", 2.0).await.unwrap();
        store.increment_score("w", "11", 5.0).await.unwrap();
        store.increment_score("w", "12", 2.0).await.unwrap();

        let all = store.range_desc_with_scores("w", 0, -1).await.unwrap();
        assert_eq!(
            all,
            vec![
                ("11".to_string(), 5.0),
                ("12".to_string(), 2.0),
                ("10".to_string(), 2.0),
            ]
        );

        let top = store.range_desc_with_scores("w", 0, 0).await.unwrap();
        assert_eq!(top, vec![("11".to_string(), 5.0)]);
    }

    #[test]
    fn resolve_range_follows_redis_index_rules() {
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(3, 0, -1), Some((0, 2)));
        assert_eq!(resolve_range(3, 0, 10), Some((0, 2)));
        assert_eq!(resolve_range(3, -2, -1), Some((1, 2)));
        assert_eq!(resolve_range(3, -10, 0), Some((0, 0)));
        assert_eq!(resolve_range(3, 2, 1), None);
        assert_eq!(resolve_range(3, 5, 9), None);
        assert_eq!(resolve_range(3, 0, -4), None);
    }

    #[tokio::test]
    async fn range_of_absent_key_is_empty() {
        let store = MemoryStore::default();
        assert!(store.range_desc_with_scores("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_moves_and_reports_missing() {
        let store = MemoryStore::default();
        store.increment_score("live", "1", 1.0).await.unwrap();

        assert_eq!(store.rename_key("live", "live:1").await.unwrap(), RenameOutcome::Renamed);
        assert!(store.range_desc_with_scores("live", 0, -1).await.unwrap().is_empty());
        assert_eq!(store.cardinality("live:1"), 1);
        assert_eq!(
            store.rename_key("live", "live:2").await.unwrap(),
            RenameOutcome::SourceMissing
        );
    }

    #[tokio::test]
    async fn rename_never_overwrites_existing_target() {
        let store = MemoryStore::default();
        store.increment_score("live", "1", 1.0).await.unwrap();
        store.increment_score("live:1", "2", 7.0).await.unwrap();

        assert_eq!(
            store.rename_key("live", "live:1").await.unwrap(),
            RenameOutcome::TargetExists
        );
        assert_eq!(store.cardinality("live"), 1);
        assert_eq!(
            store.range_desc_with_scores("live:1", 0, -1).await.unwrap(),
            vec![("2".to_string(), 7.0)]
        );
    }

    #[tokio::test]
    async fn multi_key_increment_is_all_or_nothing() {
        let store = MemoryStore::default();
        let keys = vec!["d".to_string(), "w".to_string()];
        assert_eq!(store.increment_scores(&keys, "1", 2.0).await.unwrap(), vec![2.0, 2.0]);

        store
            .try_acquire_lease("m", "owner", Duration::from_secs(60))
            .await
            .unwrap();
        let mixed = vec!["d".to_string(), "m".to_string()];
        assert!(store.increment_scores(&mixed, "1", 1.0).await.is_err());
        assert_eq!(
            store.range_desc_with_scores("d", 0, -1).await.unwrap(),
            vec![("1".to_string(), 2.0)]
        );
    }

    #[tokio::test]
    async fn huge_ttl_does_not_overflow() {
        let store = MemoryStore::default();
        assert!(store.try_acquire_lease("lock", "a", Duration::MAX).await.unwrap());
        assert!(!store.try_acquire_lease("lock", "b", Duration::from_secs(1)).await.unwrap());

        let viewer: ViewerId = "v1".parse().unwrap();
        let article = ArticleId::try_from(1_i64).unwrap();
        store
            .mark_viewed(&viewer, article, Utc::now(), Duration::MAX)
            .await
            .unwrap();
        assert!(store.last_view(&viewer, article).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn prefix_listing_and_batch_delete() {
        let store = MemoryStore::default();
        for key in ["a:1", "a:2", "b:1"] {
            store.increment_score(key, "1", 1.0).await.unwrap();
        }
        let mut listed = store.list_keys_by_prefix("a:").await.unwrap();
        listed.sort();
        assert_eq!(listed, vec!["a:1".to_string(), "a:2".to_string()]);

        let deleted = store
            .delete_keys(&["a:1".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_is_exclusive_until_released_or_expired() {
        let store = MemoryStore::default();
        let ttl = Duration::from_secs(10);
        assert!(store.try_acquire_lease("lock", "a", ttl).await.unwrap());
        assert!(!store.try_acquire_lease("lock", "b", ttl).await.unwrap());

        store.release_lease("lock", "b").await.unwrap();
        assert!(!store.try_acquire_lease("lock", "b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.try_acquire_lease("lock", "b", ttl).await.unwrap());

        store.release_lease("lock", "b").await.unwrap();
        assert!(store.try_acquire_lease("lock", "c", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_marker_expires_after_ttl() {
        let store = MemoryStore::default();
        let viewer: ViewerId = "v1".parse().unwrap();
        let article = ArticleId::try_from(42_i64).unwrap();
        let at = Utc.timestamp_millis_opt(1_000).single().unwrap();

        assert_eq!(store.last_view(&viewer, article).await.unwrap(), None);
        store
            .mark_viewed(&viewer, article, at, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.last_view(&viewer, article).await.unwrap(), Some(at));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.last_view(&viewer, article).await.unwrap(), None);
    }
}
