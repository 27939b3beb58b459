//! esgf-core - Core types and traits for the ESGF harvesting engine.
//!
//! This crate holds the data model shared by every engine component: the
//! closed search vocabulary, records and datasets, query snapshots, harvest
//! state, the error taxonomy and the traits placed at component seams.

pub mod config;
pub mod error;
pub mod harvest;
pub mod query;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use error::Error;
pub use harvest::{HarvestKind, HarvestStatus, RunSnapshot};
pub use query::{BoundingBox, RecordType, SearchQuery, SearchQueryBuilder};
pub use traits::{DatasetRepository, RunRepository, SearchService};
pub use types::{
    Dataset, DatasetFile, FacetCount, FacetCounts, FieldKind, FieldValue, Metadata, NodeUrl,
    Record, Service, ServiceEndpoint,
};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
