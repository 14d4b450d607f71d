//! Window-level operations over the shared ranking store.

use crate::domain::{ArchiveKey, ArticleId, ArticleScore, KeySpace, RankingWindow};
use crate::error::TrendingError;
use crate::port::{RankingStore, RenameOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RankingService {
    store: Arc<dyn RankingStore>,
    keys: KeySpace,
}

impl RankingService {
    pub fn new(store: Arc<dyn RankingStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    #[must_use]
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RankingStore> {
        &self.store
    }

    pub async fn increment(
        &self,
        window: RankingWindow,
        article: ArticleId,
        delta: f64,
    ) -> Result<f64, TrendingError> {
        let member = article.to_string();
        self.store
            .increment_score(&self.keys.live(window), &member, delta)
            .await
    }

    /// Add `delta` to `article` in every active window as one atomic unit; a
    /// store failure leaves every window untouched.
    pub async fn increment_all(
        &self,
        article: ArticleId,
        delta: f64,
    ) -> Result<Vec<(RankingWindow, f64)>, TrendingError> {
        let keys: Vec<String> = RankingWindow::ALL.iter().map(|w| self.keys.live(*w)).collect();
        let member = article.to_string();
        let scores = self.store.increment_scores(&keys, &member, delta).await?;
        Ok(RankingWindow::ALL.into_iter().zip(scores).collect())
    }

    /// Up to `n` entries of `window`, highest score first. Ties keep the
    /// store's native order. An absent window reads as empty.
    pub async fn top_n(
        &self,
        window: RankingWindow,
        n: usize,
    ) -> Result<Vec<ArticleScore>, TrendingError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(n).map_or(-1, |n| n - 1);
        let raw = self
            .store
            .range_desc_with_scores(&self.keys.live(window), 0, stop)
            .await?;
        Ok(parse_members(window, raw))
    }

    /// Full contents of the live window.
    pub async fn snapshot(&self, window: RankingWindow) -> Result<Vec<ArticleScore>, TrendingError> {
        let raw = self
            .store
            .range_desc_with_scores(&self.keys.live(window), 0, -1)
            .await?;
        Ok(parse_members(window, raw))
    }

    /// Move the live window under a timestamped archive name, leaving it absent.
    ///
    /// Empty or already-absent windows produce no archive. Increments landing
    /// after the rename recreate the live window from zero.
    pub async fn rotate(
        &self,
        window: RankingWindow,
        now: DateTime<Utc>,
    ) -> Result<Option<ArchiveKey>, TrendingError> {
        let live = self.keys.live(window);
        let contents = self.store.range_desc_with_scores(&live, 0, -1).await?;
        if contents.is_empty() {
            debug!(%window, "window empty, nothing to archive");
            return Ok(None);
        }

        let archive = ArchiveKey::new(window, now);
        let name = self.keys.archive(&archive);
        match self.store.rename_key(&live, &name).await? {
            RenameOutcome::Renamed => Ok(Some(archive)),
            RenameOutcome::SourceMissing => Ok(None),
            RenameOutcome::TargetExists => Err(TrendingError::PartialRotationFailure {
                window: window.to_string(),
                reason: format!("archive {name} already exists"),
            }),
        }
    }

    /// Archives of `window`, oldest first by embedded timestamp.
    pub async fn archives(&self, window: RankingWindow) -> Result<Vec<ArchiveKey>, TrendingError> {
        let names = self
            .store
            .list_keys_by_prefix(&self.keys.archive_prefix(window))
            .await?;
        let mut archives: Vec<ArchiveKey> = names
            .iter()
            .filter_map(|name| {
                let parsed = self.keys.parse_archive(window, name);
                if parsed.is_none() {
                    warn!(%window, key = %name, "ignoring unrecognised archive key");
                }
                parsed
            })
            .collect();
        archives.sort();
        Ok(archives)
    }

    /// Delete the oldest archives of `window` beyond `keep`, in one batch.
    /// Returns how many were removed.
    pub async fn prune_archives(
        &self,
        window: RankingWindow,
        keep: usize,
    ) -> Result<usize, TrendingError> {
        let archives = self.archives(window).await?;
        if archives.len() <= keep {
            return Ok(0);
        }

        let excess: Vec<String> = archives[..archives.len() - keep]
            .iter()
            .map(|key| self.keys.archive(key))
            .collect();
        self.store.delete_keys(&excess).await
    }
}

fn parse_members(window: RankingWindow, raw: Vec<(String, f64)>) -> Vec<ArticleScore> {
    raw.into_iter()
        .filter_map(|(member, score)| match member.parse::<ArticleId>() {
            Ok(article_id) => Some(ArticleScore { article_id, score }),
            Err(_) => {
                warn!(%window, %member, "skipping non-article member in ranking window");
                None
            }
        })
        .collect()
}
