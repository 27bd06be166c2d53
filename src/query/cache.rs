//! Plan cache (spec §4.9): caches the winning physical plan for a
//! `(predicateSignature, sortSignature, projectionSignature)` key, grounded
//! on the teacher's `query::cache::QueryCache` — same `lru::LruCache` +
//! hit/miss counters shape — generalized with a TTL and an explicit
//! version-stamp invalidation hook (schema changes and statistics refreshes
//! both bump the stamp).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::query::ast::Query;
use crate::query::plan::PhysicalPlan;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    predicate_signature: String,
    sort_signature: String,
    projection_signature: &'static str,
    version: u64,
}

struct Entry {
    plan: PhysicalPlan,
    cached_at: Instant,
}

pub struct PlanCache {
    cache: Mutex<LruCache<PlanKey, Entry>>,
    ttl: Duration,
    version: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl PlanCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        PlanCache {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
            version: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key_for(&self, query: &Query) -> PlanKey {
        let (predicate_signature, sort_signature, projection_signature) = query.cache_signature();
        PlanKey { predicate_signature, sort_signature, projection_signature, version: self.version.load(Ordering::Acquire) }
    }

    pub fn get(&self, query: &Query) -> Option<PhysicalPlan> {
        let key = self.key_for(query);
        let mut cache = self.cache.lock();
        match cache.get(&key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.plan.clone())
            }
            Some(_) => {
                cache.pop(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, query: &Query, plan: PhysicalPlan) {
        let key = self.key_for(query);
        self.cache.lock().put(key, Entry { plan, cached_at: Instant::now() });
    }

    /// Invalidates every cached plan (schema evolution, index rebuild,
    /// statistics refresh) without needing to enumerate keys.
    pub fn invalidate_all(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: cache.len(),
            capacity: cache.cap().get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Predicate;

    fn sample_query() -> Query {
        Query::new("widget", Predicate::Eq { field: "sku".into(), value: crate::core::types::FieldValue::Text("A1".into()) })
    }

    #[test]
    fn put_then_get_is_a_hit() {
        let cache = PlanCache::new(16, Duration::from_secs(60));
        let query = sample_query();
        assert!(cache.get(&query).is_none());
        cache.put(&query, PhysicalPlan::SeqScan { item_type: "widget".into() });
        assert!(cache.get(&query).is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn invalidate_all_clears_future_lookups() {
        let cache = PlanCache::new(16, Duration::from_secs(60));
        let query = sample_query();
        cache.put(&query, PhysicalPlan::SeqScan { item_type: "widget".into() });
        cache.invalidate_all();
        assert!(cache.get(&query).is_none());
    }
}
