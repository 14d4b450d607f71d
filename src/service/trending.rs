//! Read side of the ranking: cached top lists resolved to article summaries.

use crate::domain::{ArticleId, ArticleScore, ArticleSummary, RankingWindow};
use crate::error::TrendingError;
use crate::port::ArticleCatalog;
use crate::service::ranking::RankingService;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Largest list the presentation layer may ask for; also the cached depth.
pub const MAX_TRENDING_LIMIT: usize = 50;

#[derive(Debug, Clone)]
struct CachedRanking {
    entries: Vec<ArticleScore>,
    fetched_at: Instant,
    invalidated: bool,
}

pub struct TrendingService {
    ranking: Arc<RankingService>,
    catalog: Arc<dyn ArticleCatalog>,
    ttl: Duration,
    cache: RwLock<HashMap<RankingWindow, CachedRanking>>,
}

impl TrendingService {
    pub fn new(ranking: Arc<RankingService>, catalog: Arc<dyn ArticleCatalog>, ttl: Duration) -> Self {
        Self {
            ranking,
            catalog,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Mark every cached list stale so the next read goes to the store.
    /// Stale lists are kept as a fallback for store outages.
    pub fn invalidate(&self) {
        for cached in self.cache.write().values_mut() {
            cached.invalidated = true;
        }
    }

    /// Top `limit` articles of `period`, highest score first.
    ///
    /// `limit` is capped at [`MAX_TRENDING_LIMIT`]. A window that was just
    /// rotated reads as empty. When the store is unreachable the last cached
    /// list is served instead; with nothing cached the error propagates.
    pub async fn trending_articles(
        &self,
        period: RankingWindow,
        limit: usize,
    ) -> Result<Vec<ArticleSummary>, TrendingError> {
        let limit = limit.min(MAX_TRENDING_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut ranked = self.ranked(period).await?;
        ranked.truncate(limit);

        let ids: Vec<ArticleId> = ranked.iter().map(|r| r.article_id).collect();
        let records = match self.catalog.lookup(&ids).await {
            Ok(records) => records,
            Err(e) => {
                warn!(%period, error = %e, "catalog lookup failed, serving bare rankings");
                HashMap::new()
            }
        };

        Ok(ranked
            .into_iter()
            .map(|r| ArticleSummary::new(r, records.get(&r.article_id)))
            .collect())
    }

    async fn ranked(&self, period: RankingWindow) -> Result<Vec<ArticleScore>, TrendingError> {
        if let Some(cached) = self.fresh(period) {
            return Ok(cached);
        }

        match self.ranking.top_n(period, MAX_TRENDING_LIMIT).await {
            Ok(entries) => {
                self.cache.write().insert(
                    period,
                    CachedRanking {
                        entries: entries.clone(),
                        fetched_at: Instant::now(),
                        invalidated: false,
                    },
                );
                Ok(entries)
            }
            Err(e) => match self.cache.read().get(&period) {
                Some(stale) => {
                    warn!(%period, error = %e, "ranking store unavailable, serving stale list");
                    Ok(stale.entries.clone())
                }
                None => Err(e),
            },
        }
    }

    fn fresh(&self, period: RankingWindow) -> Option<Vec<ArticleScore>> {
        let cache = self.cache.read();
        let cached = cache.get(&period)?;
        if cached.invalidated || cached.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        Some(cached.entries.clone())
    }
}
