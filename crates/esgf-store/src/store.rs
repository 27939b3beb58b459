//! Cache-fronted dataset store.

use std::path::Path;

use tracing::{debug, instrument, trace};

use esgf_core::{Dataset, DatasetRepository, Result, RunRepository, RunSnapshot};

use crate::cache::DatasetCache;
use crate::database::Database;

/// Read-through, write-through dataset store.
///
/// Reads check the cache first and populate it from the database on a miss,
/// unless a write or removal landed while the load was in flight. Writes
/// commit to the database before touching the cache, so the cache never
/// holds a value the database does not.
#[derive(Debug)]
pub struct DatasetStore {
    cache: DatasetCache,
    database: Database,
}

impl DatasetStore {
    pub fn new(database: Database, cache_capacity: usize) -> Self {
        Self {
            cache: DatasetCache::new(cache_capacity),
            database,
        }
    }

    /// Open the database at `path` with a cache of `cache_capacity` entries.
    pub fn open(path: impl AsRef<Path>, cache_capacity: usize) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, cache_capacity))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    /// Drop a dataset from the cache only.
    pub fn evict(&self, instance_id: &str) -> bool {
        self.cache.evict(instance_id)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl DatasetRepository for DatasetStore {
    #[instrument(skip(self))]
    fn get(&self, instance_id: &str) -> Result<Option<Dataset>> {
        if let Some(dataset) = self.cache.get(instance_id) {
            trace!("cache hit");
            return Ok(Some(dataset));
        }

        let generation = self.cache.generation();
        let loaded = self.database.load_dataset(instance_id)?;
        if let Some(dataset) = &loaded {
            debug!("loaded from database");
            if !self.cache.fill(dataset.clone(), generation) {
                trace!("cache changed during load, not caching");
            }
        }
        Ok(loaded)
    }

    #[instrument(skip(self, dataset), fields(instance_id = dataset.instance_id()))]
    fn put(&self, dataset: &Dataset) -> Result<()> {
        self.database.save_dataset(dataset)?;
        self.cache.insert(dataset.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, instance_id: &str) -> Result<Option<Dataset>> {
        let removed = self.database.delete_dataset(instance_id)?;
        self.cache.evict(instance_id);
        Ok(removed)
    }
}

impl RunRepository for DatasetStore {
    fn save_run(&self, snapshot: &RunSnapshot) -> Result<()> {
        self.database.save_run(snapshot)
    }

    fn load_run(&self, run_id: &str) -> Result<Option<RunSnapshot>> {
        self.database.load_run(run_id)
    }
}
