//! Article catalog held in memory, optionally seeded from a JSON export.
//!
//! The export is a JSON array of `ArticleRecord` objects, as produced by the
//! CMS sitemap job.

use crate::domain::{ArticleId, ArticleRecord};
use crate::error::TrendingError;
use crate::port::{ArticleCatalog, StoreFuture};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: RwLock<HashMap<ArticleId, ArticleRecord>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TrendingError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            TrendingError::Config(format!("failed to read catalog {}: {e}", path.display()))
        })?;
        let records: Vec<ArticleRecord> = serde_json::from_str(&raw).map_err(|e| {
            TrendingError::Config(format!("invalid catalog {}: {e}", path.display()))
        })?;

        let catalog = Self::new();
        let count = records.len();
        for record in records {
            catalog.upsert(record);
        }
        info!("Loaded {count} catalog records from {}", path.display());
        Ok(catalog)
    }

    pub fn upsert(&self, record: ArticleRecord) {
        self.records.write().insert(record.id, record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ArticleCatalog for MemoryCatalog {
    fn lookup<'a>(
        &'a self,
        ids: &'a [ArticleId],
    ) -> StoreFuture<'a, HashMap<ArticleId, ArticleRecord>> {
        Box::pin(async move {
            let records = self.records.read();
            Ok(ids
                .iter()
                .filter_map(|id| records.get(id).map(|r| (*id, r.clone())))
                .collect())
        })
    }
}
