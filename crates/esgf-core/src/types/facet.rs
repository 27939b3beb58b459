//! Facet value counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

/// A facet value and the number of matching records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

/// Value counts per requested facet category, in server order.
pub type FacetCounts = BTreeMap<Metadata, Vec<FacetCount>>;
