//! RankingStore trait: the sorted-set capability set the ranking subsystem
//! consumes.
//!
//! Atomicity of every mutation is the store's contract; callers never
//! read-modify-write.

use crate::error::TrendingError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by store ports, keeping the traits dyn-compatible.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TrendingError>> + Send + 'a>>;

/// Result of a rename that never overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    /// The source key does not exist.
    SourceMissing,
    /// The target name is already taken; nothing was moved.
    TargetExists,
}

pub trait RankingStore: Send + Sync {
    /// Atomically add `delta` to `member` in the sorted set `key`, creating
    /// both if absent. Returns the new score.
    fn increment_score<'a>(&'a self, key: &'a str, member: &'a str, delta: f64)
    -> StoreFuture<'a, f64>;

    /// Add `delta` to `member` in every set of `keys` as one atomic unit:
    /// either all sets change or none do. Returns the new scores in key order.
    fn increment_scores<'a>(
        &'a self,
        keys: &'a [String],
        member: &'a str,
        delta: f64,
    ) -> StoreFuture<'a, Vec<f64>>;

    /// Members of `key` from rank `start` to `stop` (inclusive, negative
    /// indices count from the end) in descending score order. An absent key
    /// yields an empty list.
    fn range_desc_with_scores<'a>(
        &'a self,
        key: &'a str,
        start: isize,
        stop: isize,
    ) -> StoreFuture<'a, Vec<(String, f64)>>;

    /// Atomically rename `from` to `to` unless `to` already exists.
    fn rename_key<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, RenameOutcome>;

    /// All key names starting with `prefix`, in no particular order.
    fn list_keys_by_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;

    /// Delete `keys` in one batch, returning how many existed.
    fn delete_keys<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize>;

    /// Take the lease `name` for `owner` if nobody holds it. Expires after `ttl`.
    fn try_acquire_lease<'a>(
        &'a self,
        name: &'a str,
        owner: &'a str,
        ttl: Duration,
    ) -> StoreFuture<'a, bool>;

    /// Drop the lease `name` only if `owner` still holds it.
    fn release_lease<'a>(&'a self, name: &'a str, owner: &'a str) -> StoreFuture<'a, ()>;
}
