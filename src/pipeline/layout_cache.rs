//! Device pipeline layout memoization.

use std::collections::HashMap;
use std::sync::RwLock;

use super::PipelineLayoutCacheKey;

/// Thread-safe layout cache with double-checked locking: shared-mode probe,
/// then exclusive re-probe and insert. The factory runs under the exclusive
/// lock, so at most one layout is created per distinct key.
pub struct PipelineLayoutCache<T: Clone> {
    cache: RwLock<HashMap<PipelineLayoutCacheKey, T>>,
}

impl<T: Clone> Default for PipelineLayoutCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> PipelineLayoutCache<T> {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn find_or_insert(
        &self,
        key: &PipelineLayoutCacheKey,
        factory: impl FnOnce(&PipelineLayoutCacheKey) -> T,
    ) -> T {
        // Fast path: shared lock for concurrent reads.
        {
            let cache = self.cache.read().unwrap();
            if let Some(layout) = cache.get(key) {
                return layout.clone();
            }
        }

        // Slow path: exclusive lock, re-probe, then create.
        let mut cache = self.cache.write().unwrap();
        if let Some(layout) = cache.get(key) {
            // Another thread inserted between our shared unlock and
            // exclusive lock.
            return layout.clone();
        }
        let layout = factory(key);
        cache.insert(key.clone(), layout.clone());
        layout
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        build_pipeline_layout_cache_key, PipelineLayoutKeyEntry, PipelineLayoutKeyGroup,
    };
    use super::*;
    use crate::shader::BindGroupLayoutEntryType;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn key(set: u32) -> PipelineLayoutCacheKey {
        PipelineLayoutCacheKey {
            groups: vec![PipelineLayoutKeyGroup {
                set,
                entries: vec![PipelineLayoutKeyEntry {
                    binding: 0,
                    ty: BindGroupLayoutEntryType::UniformBuffer,
                    count: 1,
                    writable: false,
                }],
            }],
        }
    }

    #[test]
    fn factory_runs_once_per_key() {
        let cache: PipelineLayoutCache<u32> = PipelineLayoutCache::new();
        let calls = AtomicU32::new(0);

        let a = cache.find_or_insert(&key(0), |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            7
        });
        let b = cache.find_or_insert(&key(0), |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            8
        });
        assert_eq!(a, 7);
        assert_eq!(b, 7);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(cache.len(), 1);

        cache.find_or_insert(&key(1), |_| 9);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn empty_layout_key_is_a_valid_key() {
        let cache: PipelineLayoutCache<u32> = PipelineLayoutCache::new();
        let empty = build_pipeline_layout_cache_key(&[]);
        assert_eq!(cache.find_or_insert(&empty, |_| 1), 1);
        assert_eq!(cache.find_or_insert(&empty, |_| 2), 1);
    }
}
