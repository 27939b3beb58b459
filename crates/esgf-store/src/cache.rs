//! Bounded in-memory dataset cache.

use std::collections::HashMap;

use parking_lot::Mutex;

use esgf_core::Dataset;

/// Least-recently-used cache of datasets keyed by instance id.
///
/// Every mutation bumps a generation counter. A reader that loaded a value
/// from the database hands back the generation it saw before the load via
/// [`fill`](Self::fill), which drops the value if anything changed meanwhile.
#[derive(Debug)]
pub struct DatasetCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    capacity: usize,
    tick: u64,
    generation: u64,
    entries: HashMap<String, Entry>,
}

#[derive(Debug)]
struct Entry {
    dataset: Dataset,
    last_used: u64,
}

impl DatasetCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity,
                tick: 0,
                generation: 0,
                entries: HashMap::new(),
            }),
        }
    }

    pub fn get(&self, instance_id: &str) -> Option<Dataset> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.get_mut(instance_id).map(|entry| {
            entry.last_used = tick;
            entry.dataset.clone()
        })
    }

    pub fn insert(&self, dataset: Dataset) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.insert(dataset);
    }

    /// Current generation, read before a database load.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Insert a value loaded from the database, unless the cache was
    /// mutated after `generation` was read. Returns whether it was cached.
    pub fn fill(&self, dataset: Dataset, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.insert(dataset)
    }

    /// Drop one entry, returning whether it was cached.
    pub fn evict(&self, instance_id: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.entries.remove(instance_id).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.entries.clear();
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.inner.lock().entries.contains_key(instance_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInner {
    fn insert(&mut self, dataset: Dataset) -> bool {
        if self.capacity == 0 {
            return false;
        }
        self.tick += 1;
        let tick = self.tick;
        let key = dataset.instance_id().to_string();
        self.entries.insert(
            key,
            Entry {
                dataset,
                last_used: tick,
            },
        );

        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let cache = DatasetCache::new(2);
        cache.insert(Dataset::new("a"));
        cache.insert(Dataset::new("b"));
        assert!(cache.get("a").is_some());

        cache.insert(Dataset::new("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn replacing_keeps_one_entry() {
        let cache = DatasetCache::new(4);
        cache.insert(Dataset::new("a"));
        cache.insert(Dataset::new("a"));
        assert_eq!(cache.len(), 1);
        assert!(cache.evict("a"));
        assert!(!cache.evict("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn fill_after_evict_is_dropped() {
        let cache = DatasetCache::new(4);
        let generation = cache.generation();
        cache.evict("a");
        assert!(!cache.fill(Dataset::new("a"), generation));
        assert!(!cache.contains("a"));

        let generation = cache.generation();
        assert!(cache.fill(Dataset::new("a"), generation));
        assert!(cache.contains("a"));
    }

    #[test]
    fn fill_does_not_overwrite_newer_insert() {
        let cache = DatasetCache::new(4);
        let generation = cache.generation();
        let mut newer = Dataset::new("a");
        newer.set_record(
            esgf_core::Record::new()
                .with(esgf_core::Metadata::Title, esgf_core::FieldValue::Text("v2".into())),
        );
        cache.insert(newer.clone());

        assert!(!cache.fill(Dataset::new("a"), generation));
        assert_eq!(cache.get("a"), Some(newer));
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let cache = DatasetCache::new(0);
        cache.insert(Dataset::new("a"));
        assert!(cache.get("a").is_none());
    }
}
