//! Content-addressed render pipeline cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::RenderPipelineCacheKey;

/// Diagnostics counters for the render pipeline cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderPipelineCacheDiagnostics {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_pipeline_count: u64,
}

impl RenderPipelineCacheDiagnostics {
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups > 0 {
            self.cache_hits as f64 / self.total_lookups as f64
        } else {
            0.0
        }
    }
}

/// Thread-safe pipeline cache keyed by [`RenderPipelineCacheKey`].
///
/// Same double-checked locking discipline as the layout cache, with atomic
/// lookup/hit/miss counters on top. The factory is invoked only under the
/// exclusive lock and only when the key is absent, so a contended key is
/// built exactly once; losers of the race observe the winner's entry.
pub struct RenderPipelineCache<T: Clone> {
    cache: RwLock<HashMap<RenderPipelineCacheKey, T>>,
    total_lookups: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl<T: Clone> Default for RenderPipelineCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> RenderPipelineCache<T> {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            total_lookups: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Looks up `key`; on miss builds the pipeline with `factory` and caches
    /// it. `out_cache_hit` reports which path was taken.
    pub fn find_or_insert(
        &self,
        key: &RenderPipelineCacheKey,
        factory: impl FnOnce(&RenderPipelineCacheKey) -> T,
        out_cache_hit: &mut bool,
    ) -> T {
        self.total_lookups.fetch_add(1, Ordering::Relaxed);

        {
            let cache = self.cache.read().unwrap();
            if let Some(pipeline) = cache.get(key) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                *out_cache_hit = true;
                return pipeline.clone();
            }
        }

        let mut cache = self.cache.write().unwrap();
        if let Some(pipeline) = cache.get(key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            *out_cache_hit = true;
            return pipeline.clone();
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        *out_cache_hit = false;
        let pipeline = factory(key);
        cache.insert(key.clone(), pipeline.clone());
        pipeline
    }

    pub fn diagnostics(&self) -> RenderPipelineCacheDiagnostics {
        let cache = self.cache.read().unwrap();
        RenderPipelineCacheDiagnostics {
            total_lookups: self.total_lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cached_pipeline_count: cache.len() as u64,
        }
    }

    pub fn clear(&self) {
        let mut cache = self.cache.write().unwrap();
        cache.clear();
        self.total_lookups.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn hit_and_miss_counters() {
        let cache: RenderPipelineCache<u32> = RenderPipelineCache::new();
        let key = RenderPipelineCacheKey::default();

        let mut hit = true;
        assert_eq!(cache.find_or_insert(&key, |_| 1, &mut hit), 1);
        assert!(!hit);
        assert_eq!(cache.find_or_insert(&key, |_| 2, &mut hit), 1);
        assert!(hit);

        let diagnostics = cache.diagnostics();
        assert_eq!(diagnostics.total_lookups, 2);
        assert_eq!(diagnostics.cache_hits, 1);
        assert_eq!(diagnostics.cache_misses, 1);
        assert_eq!(diagnostics.cached_pipeline_count, 1);
        assert_eq!(diagnostics.hit_rate(), 0.5);
    }

    #[test]
    fn factory_runs_once_under_contention() {
        let cache: Arc<RenderPipelineCache<u64>> = Arc::new(RenderPipelineCache::new());
        let builds = Arc::new(AtomicU32::new(0));

        let mut threads = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let builds = Arc::clone(&builds);
            threads.push(std::thread::spawn(move || {
                let key = RenderPipelineCacheKey::default();
                let mut hit = false;
                cache.find_or_insert(
                    &key,
                    |_| {
                        builds.fetch_add(1, Ordering::Relaxed);
                        // Widen the race window.
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        42
                    },
                    &mut hit,
                )
            }));
        }
        for thread in threads {
            assert_eq!(thread.join().unwrap(), 42);
        }
        assert_eq!(builds.load(Ordering::Relaxed), 1);
        assert_eq!(cache.diagnostics().cached_pipeline_count, 1);
    }

    #[test]
    fn clear_resets_counters() {
        let cache: RenderPipelineCache<u32> = RenderPipelineCache::new();
        let key = RenderPipelineCacheKey::default();
        let mut hit = false;
        cache.find_or_insert(&key, |_| 1, &mut hit);
        cache.clear();
        assert_eq!(cache.diagnostics(), RenderPipelineCacheDiagnostics::default());
    }
}
