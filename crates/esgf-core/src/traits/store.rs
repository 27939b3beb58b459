//! Persistence traits.

use crate::Result;
use crate::harvest::RunSnapshot;
use crate::types::Dataset;

/// Durable storage for harvested datasets, keyed by instance id.
pub trait DatasetRepository: Send + Sync {
    /// Fetch a dataset.
    fn get(&self, instance_id: &str) -> Result<Option<Dataset>>;

    /// Insert or replace a dataset.
    fn put(&self, dataset: &Dataset) -> Result<()>;

    /// Delete a dataset, returning what was removed.
    fn remove(&self, instance_id: &str) -> Result<Option<Dataset>>;
}

/// Durable storage for harvest run snapshots.
pub trait RunRepository: Send + Sync {
    fn save_run(&self, snapshot: &RunSnapshot) -> Result<()>;

    fn load_run(&self, run_id: &str) -> Result<Option<RunSnapshot>>;
}
