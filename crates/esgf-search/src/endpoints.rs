//! Index node endpoint names and wire response types.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

// ============================================================================
// Endpoint Names
// ============================================================================

/// Search service, relative to the node URL.
pub const SEARCH: &str = "search";

/// wget script service, relative to the node URL.
pub const WGET: &str = "wget";

// ============================================================================
// Response Types
// ============================================================================

/// Top-level Solr JSON document returned by `search`.
#[derive(Debug, Deserialize)]
pub struct SearchEnvelope {
    pub response: SearchResult,
    #[serde(default)]
    pub facet_counts: Option<FacetCountsBody>,
}

/// The `response` object.
#[derive(Debug, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub docs: Vec<Map<String, Value>>,
}

/// The `facet_counts` object.
#[derive(Debug, Default, Deserialize)]
pub struct FacetCountsBody {
    /// `[value, count, value, count, ...]` per facet name.
    #[serde(default)]
    pub facet_fields: BTreeMap<String, Vec<Value>>,
}
