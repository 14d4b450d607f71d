use crate::domain::{ArticleId, ViewerId};
use crate::port::StoreFuture;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Shared per-viewer, per-article "last counted" markers.
pub trait DebounceStore: Send + Sync {
    /// When `viewer` was last counted for `article`, if the marker is still alive.
    fn last_view<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
    ) -> StoreFuture<'a, Option<DateTime<Utc>>>;

    /// Write or refresh the marker; it expires on its own after `ttl`.
    fn mark_viewed<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreFuture<'a, ()>;
}
