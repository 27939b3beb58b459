//! Search service trait.

use async_trait::async_trait;

use crate::Result;
use crate::query::SearchQuery;
use crate::types::{FacetCounts, Metadata, Record};

/// Executes search queries against the federation.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Execute a query and return every matching record, de-duplicated by id.
    async fn execute(&self, query: &SearchQuery) -> Result<Vec<Record>>;

    /// Number of records matching a query.
    ///
    /// When `include_replicas` is false only master copies are counted.
    async fn count(&self, query: &SearchQuery, include_replicas: bool) -> Result<u64>;

    /// Value counts for the given facet categories (all when empty).
    async fn facets(&self, query: &SearchQuery, facets: &[Metadata]) -> Result<FacetCounts>;
}
