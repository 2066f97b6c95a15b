//! Read-through cache for query results, keyed by query fingerprint.

use crate::case::slugify;
use crate::config::InvalidationScope;
use crate::error::AppError;
use crate::resource::Operation;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

const KEY_PREFIX: &str = "query-";

/// Cache key for a rendered query: slug of `operation-sql-page.bindings` plus a short digest
/// of the same text, since slugging folds operators and punctuation together.
pub fn fingerprint(op: Operation, sql: &str, page: u32, params: &[Value]) -> String {
    let bindings = params
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("_");
    let raw = format!("{}-{}-{}.{}", op.slug(), sql, page, bindings);
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    format!("{}{}-{}", KEY_PREFIX, slugify(&raw), &digest[..16])
}

#[derive(Clone)]
struct CachedEntry {
    /// Tables the cached query read.
    tables: Arc<[String]>,
    value: Arc<Value>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CachedEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct CacheLayer {
    cache: Cache<String, CachedEntry>,
    scope: InvalidationScope,
}

impl CacheLayer {
    pub fn new(capacity: u64, scope: InvalidationScope) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .support_invalidation_closures()
            .build();
        CacheLayer { cache, scope }
    }

    /// Serve `fingerprint` from the cache or run `compute` and store its result for `ttl`,
    /// tagged with the `tables` it reads. A zero `ttl` bypasses the cache; errors are
    /// returned and never stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        tables: &[&str],
        fingerprint: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Value, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AppError>>,
    {
        if ttl.is_zero() {
            return compute().await;
        }
        if let Some(hit) = self.cache.get(fingerprint).await {
            tracing::debug!(key = %fingerprint, "cache hit");
            return Ok(hit.value.as_ref().clone());
        }
        let value = compute().await?;
        self.cache
            .insert(
                fingerprint.to_string(),
                CachedEntry {
                    tables: tables.iter().map(|t| t.to_string()).collect(),
                    value: Arc::new(value.clone()),
                    ttl,
                },
            )
            .await;
        Ok(value)
    }

    /// Drop cached reads after a write to `table`. Scoped invalidation also drops entries
    /// that read `table` through a relation.
    pub fn invalidate(&self, table: &str) {
        match self.scope {
            InvalidationScope::All => self.invalidate_all(),
            InvalidationScope::Resource => {
                let target = table.to_string();
                if let Err(e) = self
                    .cache
                    .invalidate_entries_if(move |_k, entry| entry.tables.iter().any(|t| *t == target))
                {
                    tracing::warn!(error = %e, table = %table, "scoped invalidation failed, flushing all");
                    self.invalidate_all();
                }
            }
        }
    }

    pub fn invalidate_all(&self) {
        tracing::debug!("flushing query cache");
        self.cache.invalidate_all();
    }

    /// Entries currently held, after pending maintenance has run.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn cached(cache: &CacheLayer, tables: &[&str], key: &str, ttl: u64, calls: &AtomicUsize) -> Value {
        cache
            .get_or_compute(tables, key, Duration::from_secs(ttl), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"n": calls.load(Ordering::SeqCst)}))
            })
            .await
            .unwrap()
    }

    #[test]
    fn fingerprint_is_deterministic_and_distinguishes_operators() {
        let sql = "SELECT * FROM \"a\" WHERE \"a\".\"x\" > $1";
        let a = fingerprint(Operation::Index, sql, 1, &[json!(3)]);
        let b = fingerprint(Operation::Index, "SELECT * FROM \"a\" WHERE \"a\".\"x\" < $1", 1, &[json!(3)]);
        assert_eq!(a, fingerprint(Operation::Index, sql, 1, &[json!(3)]));
        assert_ne!(a, b);
        assert_ne!(a, fingerprint(Operation::Index, sql, 2, &[json!(3)]));
        assert!(a.starts_with("query-index-select-from-a-where-a-x-1-1-3-"));
    }

    #[test]
    fn list_and_show_of_same_query_never_share_a_key() {
        let sql = "SELECT \"a\".\"id\" FROM \"a\" WHERE \"a\".\"id\" = $1";
        assert_ne!(
            fingerprint(Operation::Index, sql, 1, &[json!(1)]),
            fingerprint(Operation::Show, sql, 1, &[json!(1)])
        );
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let cache = CacheLayer::new(100, InvalidationScope::All);
        let calls = AtomicUsize::new(0);
        let first = cached(&cache, &["articles"], "k", 60, &calls).await;
        let second = cached(&cache, &["articles"], "k", 60, &calls).await;
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_bypasses() {
        let cache = CacheLayer::new(100, InvalidationScope::All);
        let calls = AtomicUsize::new(0);
        cached(&cache, &["articles"], "k", 0, &calls).await;
        cached(&cache, &["articles"], "k", 0, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn errors_are_not_stored() {
        let cache = CacheLayer::new(100, InvalidationScope::All);
        let err = cache
            .get_or_compute(&["articles"], "k", Duration::from_secs(60), || async {
                Err(AppError::NotFound("missing".into()))
            })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn write_flushes_every_resource_by_default() {
        let cache = CacheLayer::new(100, InvalidationScope::All);
        let calls = AtomicUsize::new(0);
        cached(&cache, &["articles"], "a", 60, &calls).await;
        cached(&cache, &["widgets"], "w", 60, &calls).await;
        cache.invalidate("articles");
        cached(&cache, &["widgets"], "w", 60, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn resource_scope_keeps_other_resources() {
        let cache = CacheLayer::new(100, InvalidationScope::Resource);
        let calls = AtomicUsize::new(0);
        cached(&cache, &["articles"], "a", 60, &calls).await;
        cached(&cache, &["widgets"], "w", 60, &calls).await;
        cache.invalidate("articles");
        cached(&cache, &["widgets"], "w", 60, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        cached(&cache, &["articles"], "a", 60, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn scoped_invalidation_reaches_entries_reading_a_relation() {
        let cache = CacheLayer::new(100, InvalidationScope::Resource);
        let calls = AtomicUsize::new(0);
        cached(&cache, &["articles", "comments"], "with-comments", 60, &calls).await;
        cached(&cache, &["articles"], "plain", 60, &calls).await;
        cache.invalidate("comments");
        cached(&cache, &["articles"], "plain", 60, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        cached(&cache, &["articles", "comments"], "with-comments", 60, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
