//! Redis sorted-set backend.
//!
//! One sorted set per live window (`ZINCRBY` / `ZREVRANGE`), a view lands in
//! every window through one `MULTI` block, archives are created with
//! `RENAMENX`, leases and debounce markers are plain string keys with expiry.
//! Timeouts and reconnects are the connection manager's; every failure
//! surfaces as `StoreUnavailable`.

use crate::domain::{ArticleId, KeySpace, ViewerId};
use crate::error::TrendingError;
use crate::port::{DebounceStore, RankingStore, RenameOutcome, StoreFuture};
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, RedisError, Script};
use std::future::Future;
use std::time::Duration;

/// Keys fetched per `SCAN` round trip.
const SCAN_COUNT: usize = 200;

/// Deletes the lease only if it still carries the caller's owner token.
const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    keys: KeySpace,
}

impl RedisStore {
    /// Connect and build a store. Fails fast if Redis is unreachable.
    ///
    /// `response_timeout` bounds how long the client waits for a reply and for
    /// a connection attempt.
    pub async fn connect(
        redis_url: &str,
        keys: KeySpace,
        response_timeout: Duration,
    ) -> Result<Self, TrendingError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(response_timeout)
            .set_response_timeout(response_timeout);

        let client = Client::open(redis_url).map_err(TrendingError::store)?;
        let connection = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(TrendingError::store)?;

        Ok(Self { connection, keys })
    }

    async fn call<T, Fut>(&self, op: &'static str, fut: Fut) -> Result<T, TrendingError>
    where
        Fut: Future<Output = Result<T, RedisError>>,
    {
        fut.await
            .map_err(|e| TrendingError::StoreUnavailable(format!("{op}: {e}")))
    }
}

fn is_missing_key(err: &RedisError) -> bool {
    err.to_string().to_ascii_lowercase().contains("no such key")
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

impl RankingStore for RedisStore {
    fn increment_score<'a>(
        &'a self,
        key: &'a str,
        member: &'a str,
        delta: f64,
    ) -> StoreFuture<'a, f64> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            self.call("ZINCRBY", async move {
                redis::cmd("ZINCRBY")
                    .arg(key)
                    .arg(delta)
                    .arg(member)
                    .query_async::<f64>(&mut conn)
                    .await
            })
            .await
        })
    }

    fn increment_scores<'a>(
        &'a self,
        keys: &'a [String],
        member: &'a str,
        delta: f64,
    ) -> StoreFuture<'a, Vec<f64>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = self.connection.clone();
            self.call("MULTI ZINCRBY", async move {
                let mut pipe = redis::pipe();
                pipe.atomic();
                for key in keys {
                    pipe.cmd("ZINCRBY").arg(key).arg(delta).arg(member);
                }
                pipe.query_async::<Vec<f64>>(&mut conn).await
            })
            .await
        })
    }

    fn range_desc_with_scores<'a>(
        &'a self,
        key: &'a str,
        start: isize,
        stop: isize,
    ) -> StoreFuture<'a, Vec<(String, f64)>> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            self.call("ZREVRANGE", async move {
                redis::cmd("ZREVRANGE")
                    .arg(key)
                    .arg(start)
                    .arg(stop)
                    .arg("WITHSCORES")
                    .query_async::<Vec<(String, f64)>>(&mut conn)
                    .await
            })
            .await
        })
    }

    fn rename_key<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, RenameOutcome> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            let result = redis::cmd("RENAMENX")
                .arg(from)
                .arg(to)
                .query_async::<i64>(&mut conn)
                .await;

            match result {
                Ok(1) => Ok(RenameOutcome::Renamed),
                Ok(_) => Ok(RenameOutcome::TargetExists),
                Err(e) if is_missing_key(&e) => Ok(RenameOutcome::SourceMissing),
                Err(e) => Err(TrendingError::StoreUnavailable(format!("RENAMENX: {e}"))),
            }
        })
    }

    fn list_keys_by_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let pattern = scan_pattern(prefix);
            let mut found = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let mut conn = self.connection.clone();
                let pattern = pattern.as_str();
                let (next, batch) = self
                    .call("SCAN", async move {
                        redis::cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(pattern)
                            .arg("COUNT")
                            .arg(SCAN_COUNT)
                            .query_async::<(u64, Vec<String>)>(&mut conn)
                            .await
                    })
                    .await?;
                found.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            // SCAN may return a key more than once.
            found.sort();
            found.dedup();
            Ok(found)
        })
    }

    fn delete_keys<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(0);
            }
            let mut conn = self.connection.clone();
            self.call("DEL", async move {
                redis::cmd("DEL").arg(keys).query_async::<usize>(&mut conn).await
            })
            .await
        })
    }

    fn try_acquire_lease<'a>(
        &'a self,
        name: &'a str,
        owner: &'a str,
        ttl: Duration,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            let reply = self
                .call("SET NX", async move {
                    redis::cmd("SET")
                        .arg(name)
                        .arg(owner)
                        .arg("NX")
                        .arg("PX")
                        .arg(ttl_ms)
                        .query_async::<Option<String>>(&mut conn)
                        .await
                })
                .await?;
            Ok(reply.is_some())
        })
    }

    fn release_lease<'a>(&'a self, name: &'a str, owner: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            let _released: i64 = self
                .call("release lease", async move {
                    Script::new(RELEASE_LEASE_SCRIPT)
                        .key(name)
                        .arg(owner)
                        .invoke_async(&mut conn)
                        .await
                })
                .await?;
            Ok(())
        })
    }
}

impl DebounceStore for RedisStore {
    fn last_view<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
    ) -> StoreFuture<'a, Option<DateTime<Utc>>> {
        Box::pin(async move {
            let key = self.keys.debounce(viewer.as_str(), article);
            let mut conn = self.connection.clone();
            let millis = self
                .call("GET", async move {
                    redis::cmd("GET")
                        .arg(&key)
                        .query_async::<Option<i64>>(&mut conn)
                        .await
                })
                .await?;
            Ok(millis.and_then(|m| Utc.timestamp_millis_opt(m).single()))
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
            let mut conn = self.connection.clone();
            self.call("SET EX", async move {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(at.timestamp_millis())
                    .arg("EX")
                    .arg(ttl.as_secs().max(1))
                    .query_async::<()>(&mut conn)
                    .await
            })
            .await
        })
    }
}
