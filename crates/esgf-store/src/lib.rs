//! esgf-store - Cached, transactional persistence for harvested datasets.
//!
//! [`Database`] keeps datasets and harvest run snapshots in SQLite, one
//! transaction per mutation. [`DatasetStore`] fronts it with a bounded
//! [`DatasetCache`] and implements the core repository traits.

mod cache;
mod database;
mod store;

pub use cache::DatasetCache;
pub use database::Database;
pub use store::DatasetStore;
