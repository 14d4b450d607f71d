use crate::domain::{ArticleId, ArticleRecord};
use crate::port::StoreFuture;
use std::collections::HashMap;

/// Resolves ranked ids to the metadata the presentation layer renders.
pub trait ArticleCatalog: Send + Sync {
    /// Records for the ids the catalog knows; unknown ids are simply absent.
    fn lookup<'a>(&'a self, ids: &'a [ArticleId])
    -> StoreFuture<'a, HashMap<ArticleId, ArticleRecord>>;
}
