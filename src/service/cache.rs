//! Plan-aware result cache with LRU eviction and TTL expiry.
//!
//! An entry written by one plan tier is only visible to readers of the same
//! or a higher tier. Every operation is infallible from the caller's point
//! of view: a poisoned lock degrades to a miss (reads) or a no-op (writes).

use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;
use tokio::time::Instant;

use crate::domain::models::{CacheKey, PlanTier};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    Capacity,
    Expired,
    Stale,
    Cleared,
}

/// Callback fired for every evicted entry.
pub type DisposeHook = Arc<dyn Fn(&CacheKey, EvictionReason) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub approx_memory: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry<V> {
    data: V,
    written_at: Instant,
    writer_plan: PlanTier,
    weight: usize,
}

pub struct CacheStore<V> {
    entries: Mutex<LruCache<CacheKey, CacheEntry<V>>>,
    capacity: usize,
    ttl: Duration,
    weigher: fn(&V) -> usize,
    on_dispose: Option<DisposeHook>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn default_weight<V>(_: &V) -> usize {
    std::mem::size_of::<V>()
}

impl<V: Clone> CacheStore<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).map_or(1, NonZeroUsize::get);
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            capacity,
            ttl,
            weigher: default_weight::<V>,
            on_dispose: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Measure entries with `weigher` for `stats().approx_memory`.
    pub fn with_weigher(mut self, weigher: fn(&V) -> usize) -> Self {
        self.weigher = weigher;
        self
    }

    pub fn with_dispose_hook(mut self, hook: DisposeHook) -> Self {
        self.on_dispose = Some(hook);
        self
    }

    /// Look up `key` on behalf of a reader on `reader_plan`.
    ///
    /// Entries written by a higher plan are reported as absent and keep
    /// their recency untouched.
    pub fn get(&self, key: &CacheKey, reader_plan: PlanTier) -> Option<V> {
        self.lookup(key, |writer| reader_plan.can_read(writer))
    }

    /// Look up `key` regardless of the writer's plan. TTL still applies.
    pub fn get_any(&self, key: &CacheKey) -> Option<V> {
        self.lookup(key, |_| true)
    }

    /// Like `get`, but leaves recency, counters and expired entries alone.
    pub fn peek(&self, key: &CacheKey, reader_plan: PlanTier) -> Option<V> {
        self.with_entries(|entries| {
            entries
                .peek(key)
                .filter(|entry| entry.written_at.elapsed() <= self.ttl)
                .filter(|entry| reader_plan.can_read(entry.writer_plan))
                .map(|entry| entry.data.clone())
        })
        .flatten()
    }

    fn lookup(&self, key: &CacheKey, visible: impl FnOnce(PlanTier) -> bool) -> Option<V> {
        let mut expired = false;
        let found = self
            .with_entries(|entries| {
                let (is_expired, is_visible) = match entries.peek(key) {
                    Some(entry) => (
                        entry.written_at.elapsed() > self.ttl,
                        visible(entry.writer_plan),
                    ),
                    None => return None,
                };

                if is_expired {
                    entries.pop(key);
                    expired = true;
                    return None;
                }
                if !is_visible {
                    return None;
                }
                entries.get(key).map(|entry| entry.data.clone())
            })
            .flatten();

        if expired {
            tracing::debug!("Cache entry {} expired", key);
            self.dispose(vec![(key.clone(), EvictionReason::Expired)]);
        }

        match found {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite `key`, stamping it with the current time.
    pub fn set(&self, key: CacheKey, data: V, writer_plan: PlanTier) {
        let weight = (self.weigher)(&data);
        let entry = CacheEntry {
            data,
            written_at: Instant::now(),
            writer_plan,
            weight,
        };

        let evicted = self
            .with_entries(|entries| {
                entries.put(key, entry);
                let mut evicted = Vec::new();
                while entries.len() > self.capacity {
                    match entries.pop_lru() {
                        Some((lru_key, _)) => evicted.push((lru_key, EvictionReason::Capacity)),
                        None => break,
                    }
                }
                evicted
            })
            .unwrap_or_default();

        self.dispose(evicted);
    }

    /// Remove every entry older than `max_age`. Returns how many were removed.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let evicted = self
            .with_entries(|entries| {
                let stale: Vec<CacheKey> = entries
                    .iter()
                    .filter(|(_, entry)| entry.written_at.elapsed() > max_age)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &stale {
                    entries.pop(key);
                }
                stale
                    .into_iter()
                    .map(|key| (key, EvictionReason::Stale))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let removed = evicted.len();
        if removed > 0 {
            tracing::info!("Swept {} stale cache entries", removed);
        }
        self.dispose(evicted);
        removed
    }

    pub fn clear(&self) {
        let evicted = self
            .with_entries(|entries| {
                let mut evicted = Vec::with_capacity(entries.len());
                while let Some((key, _)) = entries.pop_lru() {
                    evicted.push((key, EvictionReason::Cleared));
                }
                evicted
            })
            .unwrap_or_default();
        self.dispose(evicted);
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (size, approx_memory) = self
            .with_entries(|entries| {
                let memory: usize = entries.iter().map(|(_, entry)| entry.weight).sum();
                (entries.len(), memory)
            })
            .unwrap_or((0, 0));

        CacheStats {
            size,
            capacity: self.capacity,
            approx_memory,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut LruCache<CacheKey, CacheEntry<V>>) -> R,
    ) -> Option<R> {
        match self.entries.lock() {
            Ok(mut entries) => Some(f(&mut entries)),
            Err(e) => {
                tracing::warn!("Cache unavailable, treating as miss: {}", e);
                None
            }
        }
    }

    // Runs outside the lock so a hook may call back into the cache.
    fn dispose(&self, evicted: Vec<(CacheKey, EvictionReason)>) {
        if evicted.is_empty() {
            return;
        }
        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);

        let Some(hook) = &self.on_dispose else {
            return;
        };
        for (key, reason) in evicted {
            if catch_unwind(AssertUnwindSafe(|| hook(&key, reason))).is_err() {
                tracing::warn!("Cache dispose hook panicked for {} ({:?})", key, reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey(name.to_string())
    }

    fn recording_hook() -> (DisposeHook, Arc<Mutex<Vec<(String, EvictionReason)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook: DisposeHook = Arc::new(move |key: &CacheKey, reason: EvictionReason| {
            sink.lock().unwrap().push((key.to_string(), reason));
        });
        (hook, seen)
    }

    #[test]
    fn lower_plan_writes_are_visible_to_higher_readers() {
        let cache = CacheStore::new(10, Duration::from_secs(60));
        cache.set(key("k"), "report".to_string(), PlanTier::Starter);

        assert_eq!(cache.get(&key("k"), PlanTier::Free), None);
        assert_eq!(cache.get(&key("k"), PlanTier::Starter).as_deref(), Some("report"));
        assert_eq!(cache.get(&key("k"), PlanTier::Enterprise).as_deref(), Some("report"));
    }

    #[test]
    fn higher_plan_writes_never_reach_lower_readers() {
        let cache = CacheStore::new(10, Duration::from_secs(60));
        cache.set(key("k"), "deep".to_string(), PlanTier::Enterprise);

        for reader in [PlanTier::Free, PlanTier::Starter, PlanTier::Agency] {
            assert_eq!(cache.get(&key("k"), reader), None, "{} must not read", reader);
        }
        assert_eq!(cache.get(&key("k"), PlanTier::Admin).as_deref(), Some("deep"));
        assert_eq!(cache.get_any(&key("k")).as_deref(), Some("deep"));
    }

    #[test]
    fn evicts_least_recently_accessed() {
        let (hook, seen) = recording_hook();
        let cache = CacheStore::new(2, Duration::from_secs(60)).with_dispose_hook(hook);

        cache.set(key("a"), "a".to_string(), PlanTier::Free);
        cache.set(key("b"), "b".to_string(), PlanTier::Free);
        // touch "a" so "b" becomes the eviction candidate
        assert!(cache.get(&key("a"), PlanTier::Free).is_some());
        cache.set(key("c"), "c".to_string(), PlanTier::Free);

        assert_eq!(cache.stats().size, 2);
        assert!(cache.get(&key("b"), PlanTier::Free).is_none());
        assert!(cache.get(&key("a"), PlanTier::Free).is_some());
        assert!(cache.get(&key("c"), PlanTier::Free).is_some());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("b".to_string(), EvictionReason::Capacity)]
        );
    }

    #[test]
    fn plan_gated_miss_does_not_refresh_recency() {
        let cache = CacheStore::new(2, Duration::from_secs(60));
        cache.set(key("a"), "a".to_string(), PlanTier::Agency);
        cache.set(key("b"), "b".to_string(), PlanTier::Free);

        assert!(cache.get(&key("a"), PlanTier::Free).is_none());
        cache.set(key("c"), "c".to_string(), PlanTier::Free);

        assert!(cache.get_any(&key("a")).is_none());
        assert!(cache.get_any(&key("b")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_miss_under_capacity() {
        let (hook, seen) = recording_hook();
        let cache = CacheStore::new(10, Duration::from_secs(60)).with_dispose_hook(hook);
        cache.set(key("k"), "v".to_string(), PlanTier::Free);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get(&key("k"), PlanTier::Free).is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.get(&key("k"), PlanTier::Free).is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("k".to_string(), EvictionReason::Expired)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_old_entries() {
        let cache = CacheStore::new(10, Duration::from_secs(3600));
        cache.set(key("old"), "old".to_string(), PlanTier::Free);
        tokio::time::advance(Duration::from_secs(120)).await;
        cache.set(key("new"), "new".to_string(), PlanTier::Free);

        assert_eq!(cache.sweep_stale(Duration::from_secs(60)), 1);
        assert!(cache.get(&key("old"), PlanTier::Free).is_none());
        assert!(cache.get(&key("new"), PlanTier::Free).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn peek_is_plan_gated_and_uncounted() {
        let cache = CacheStore::new(2, Duration::from_secs(60));
        cache.set(key("a"), "a".to_string(), PlanTier::Agency);
        cache.set(key("b"), "b".to_string(), PlanTier::Free);

        assert_eq!(cache.peek(&key("a"), PlanTier::Free), None);
        assert_eq!(cache.peek(&key("a"), PlanTier::Agency).as_deref(), Some("a"));
        // peeking "a" leaves it the eviction candidate
        cache.set(key("c"), "c".to_string(), PlanTier::Free);
        assert_eq!(cache.peek(&key("a"), PlanTier::Admin), None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.peek(&key("b"), PlanTier::Free), None);
        assert_eq!(cache.len(), 2);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn panicking_hook_is_contained() {
        let hook: DisposeHook = Arc::new(|_: &CacheKey, _: EvictionReason| panic!("bookkeeping failed"));
        let cache = CacheStore::new(1, Duration::from_secs(60)).with_dispose_hook(hook);

        cache.set(key("a"), "a".to_string(), PlanTier::Free);
        cache.set(key("b"), "b".to_string(), PlanTier::Free);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn clear_disposes_everything() {
        let (hook, seen) = recording_hook();
        let cache = CacheStore::new(5, Duration::from_secs(60)).with_dispose_hook(hook);
        cache.set(key("a"), "a".to_string(), PlanTier::Free);
        cache.set(key("b"), "b".to_string(), PlanTier::Free);

        cache.clear();

        assert!(cache.is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, reason)| *reason == EvictionReason::Cleared));
    }

    #[test]
    fn stats_track_weight_and_counters() {
        let cache = CacheStore::new(5, Duration::from_secs(60)).with_weigher(|v: &String| v.len());
        cache.set(key("a"), "abcd".to_string(), PlanTier::Free);
        cache.set(key("b"), "xy".to_string(), PlanTier::Free);
        cache.get(&key("a"), PlanTier::Free);
        cache.get(&key("missing"), PlanTier::Free);

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, 5);
        assert_eq!(stats.approx_memory, 6);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
