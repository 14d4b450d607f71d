//! Article identity and the shapes handed to the presentation layer.

use crate::error::TrendingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

/// Validated, strictly positive article identifier.
///
/// The only ways in are [`FromStr`] (ASCII digits only, no sign, no whitespace)
/// and the [`TryFrom`] conversions from integers; anything looser is rejected as `InvalidArgument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ArticleId(NonZeroU64);

impl ArticleId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl FromStr for ArticleId {
    type Err = TrendingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TrendingError::InvalidArgument(format!(
                "article id must be a positive integer, got {raw:?}"
            )));
        }

        let value: u64 = raw.parse().map_err(|_| {
            TrendingError::InvalidArgument(format!("article id out of range: {raw:?}"))
        })?;

        NonZeroU64::new(value).map(Self).ok_or_else(|| {
            TrendingError::InvalidArgument("article id must be greater than zero".to_string())
        })
    }
}

impl TryFrom<i64> for ArticleId {
    type Error = TrendingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .ok()
            .and_then(NonZeroU64::new)
            .map(Self)
            .ok_or_else(|| {
                TrendingError::InvalidArgument(format!(
                    "article id must be a positive integer, got {value}"
                ))
            })
    }
}

impl TryFrom<u64> for ArticleId {
    type Error = TrendingError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        NonZeroU64::new(value).map(Self).ok_or_else(|| {
            TrendingError::InvalidArgument("article id must be greater than zero".to_string())
        })
    }
}

impl From<ArticleId> for u64 {
    fn from(id: ArticleId) -> Self {
        id.get()
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `(article, score)` pair read back from a ranking window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArticleScore {
    pub article_id: ArticleId,
    pub score: f64,
}

/// Catalog metadata for an article, as published by the CMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: ArticleId,
    pub title: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Trending entry returned to the presentation layer.
///
/// Catalog fields are absent when the ranked id is not known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSummary {
    pub article_id: ArticleId,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl ArticleSummary {
    #[must_use]
    pub fn new(ranked: ArticleScore, record: Option<&ArticleRecord>) -> Self {
        Self {
            article_id: ranked.article_id,
            score: ranked.score,
            title: record.map(|r| r.title.clone()),
            slug: record.map(|r| r.slug.clone()),
            category: record.and_then(|r| r.category.clone()),
            published_at: record.and_then(|r| r.published_at),
        }
    }
}
