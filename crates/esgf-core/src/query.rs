//! Search query snapshots.
//!
//! A [`SearchQuery`] is an immutable snapshot of search parameters. Callers
//! edit a [`SearchQueryBuilder`] and hand the built snapshot to the engine;
//! every execution derives its own variants (`with_limit`, `with_offset`,
//! `with_node`, ...) so an in-flight execution never observes later edits.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Metadata, NodeUrl};

/// Response format requested from index nodes.
pub const FORMAT_JSON: &str = "application/solr+json";

/// Kind of record a query targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    #[default]
    Dataset,
    File,
    Aggregation,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Dataset => "Dataset",
            RecordType::File => "File",
            RecordType::Aggregation => "Aggregation",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geospatial constraint in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// An immutable set of search parameters bound to one index node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    node: NodeUrl,
    record_type: RecordType,
    text: Option<String>,
    constraints: BTreeMap<Metadata, BTreeSet<String>>,
    replica: Option<bool>,
    latest: Option<bool>,
    distrib: bool,
    fields: Vec<Metadata>,
    facets: Vec<Metadata>,
    all_facets: bool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    bbox: Option<BoundingBox>,
    offset: u64,
    limit: Option<u64>,
}

impl SearchQuery {
    /// Start building a query against a node.
    pub fn builder(node: NodeUrl) -> SearchQueryBuilder {
        SearchQueryBuilder::new(node)
    }

    /// Copy this snapshot into a builder for further editing.
    pub fn to_builder(&self) -> SearchQueryBuilder {
        SearchQueryBuilder {
            query: self.clone(),
        }
    }

    pub fn node(&self) -> &NodeUrl {
        &self.node
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Facet constraints; values of one key are OR-ed, keys are AND-ed.
    pub fn constraints(&self) -> &BTreeMap<Metadata, BTreeSet<String>> {
        &self.constraints
    }

    pub fn replica(&self) -> Option<bool> {
        self.replica
    }

    pub fn latest(&self) -> Option<bool> {
        self.latest
    }

    pub fn distrib(&self) -> bool {
        self.distrib
    }

    pub fn fields(&self) -> &[Metadata] {
        &self.fields
    }

    pub fn facets(&self) -> &[Metadata] {
        &self.facets
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Same query against another node.
    pub fn with_node(&self, node: NodeUrl) -> Self {
        Self {
            node,
            ..self.clone()
        }
    }

    pub fn with_offset(&self, offset: u64) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }

    pub fn with_limit(&self, limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }

    /// Same query restricted (`Some(false)`) or not to replicas.
    pub fn with_replica(&self, replica: Option<bool>) -> Self {
        Self {
            replica,
            ..self.clone()
        }
    }

    pub fn with_record_type(&self, record_type: RecordType) -> Self {
        Self {
            record_type,
            ..self.clone()
        }
    }

    pub fn with_fields(&self, fields: Vec<Metadata>) -> Self {
        Self {
            fields,
            ..self.clone()
        }
    }

    /// Same query with `key` constrained to exactly `value`.
    pub fn with_constraint(&self, key: Metadata, value: impl Into<String>) -> Self {
        let mut query = self.clone();
        query
            .constraints
            .insert(key, BTreeSet::from([value.into()]));
        query
    }

    /// Zero-result variant requesting the given facets (all when empty).
    pub fn facet_query(&self, facets: &[Metadata]) -> Self {
        Self {
            facets: facets.to_vec(),
            all_facets: facets.is_empty(),
            limit: Some(0),
            offset: 0,
            ..self.clone()
        }
    }

    /// Render the wire query string parameters in a stable order.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = vec![
            ("type".into(), self.record_type.as_str().into()),
            ("format".into(), FORMAT_JSON.into()),
        ];

        if let Some(text) = &self.text {
            params.push(("query".into(), text.clone()));
        }

        for (key, values) in &self.constraints {
            for value in values {
                params.push((key.wire_name().into(), value.clone()));
            }
        }

        if let Some(replica) = self.replica {
            params.push(("replica".into(), replica.to_string()));
        }
        if let Some(latest) = self.latest {
            params.push(("latest".into(), latest.to_string()));
        }
        params.push(("distrib".into(), self.distrib.to_string()));

        if !self.fields.is_empty() {
            params.push(("fields".into(), join(&self.fields)));
        }

        if self.all_facets {
            params.push(("facets".into(), "*".into()));
        } else if !self.facets.is_empty() {
            params.push(("facets".into(), join(&self.facets)));
        }

        if let Some(start) = self.start {
            params.push((
                "start".into(),
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(end) = self.end {
            params.push(("end".into(), end.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(bbox) = self.bbox {
            params.push((
                "bbox".into(),
                format!("[{},{},{},{}]", bbox.west, bbox.south, bbox.east, bbox.north),
            ));
        }

        params.push(("offset".into(), self.offset.to_string()));
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }

        params
    }
}

fn join(keys: &[Metadata]) -> String {
    keys.iter()
        .map(|k| k.wire_name())
        .collect::<Vec<_>>()
        .join(",")
}

/// Mutable builder for [`SearchQuery`] snapshots.
///
/// # Example
///
/// ```
/// use esgf_core::{Metadata, NodeUrl, SearchQuery};
///
/// let node = NodeUrl::new("https://esgf-node.llnl.gov/esg-search").unwrap();
/// let query = SearchQuery::builder(node)
///     .constraint(Metadata::Project, "CMIP6")
///     .constraint(Metadata::Variable, "tas")
///     .latest(true)
///     .build();
/// assert!(query.to_params().contains(&("project".into(), "CMIP6".into())));
/// ```
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    query: SearchQuery,
}

impl SearchQueryBuilder {
    pub fn new(node: NodeUrl) -> Self {
        Self {
            query: SearchQuery {
                node,
                record_type: RecordType::Dataset,
                text: None,
                constraints: BTreeMap::new(),
                replica: None,
                latest: None,
                distrib: true,
                fields: Vec::new(),
                facets: Vec::new(),
                all_facets: false,
                start: None,
                end: None,
                bbox: None,
                offset: 0,
                limit: None,
            },
        }
    }

    pub fn node(mut self, node: NodeUrl) -> Self {
        self.query.node = node;
        self
    }

    pub fn record_type(mut self, record_type: RecordType) -> Self {
        self.query.record_type = record_type;
        self
    }

    /// Free-text query.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.query.text = Some(text.into());
        self
    }

    /// Add an allowed value for a facet.
    pub fn constraint(mut self, key: Metadata, value: impl Into<String>) -> Self {
        self.query
            .constraints
            .entry(key)
            .or_default()
            .insert(value.into());
        self
    }

    /// Drop all values for a facet.
    pub fn clear_constraint(mut self, key: Metadata) -> Self {
        self.query.constraints.remove(&key);
        self
    }

    pub fn replica(mut self, replica: bool) -> Self {
        self.query.replica = Some(replica);
        self
    }

    pub fn latest(mut self, latest: bool) -> Self {
        self.query.latest = Some(latest);
        self
    }

    /// Whether the node should fan the query out across the federation.
    pub fn distrib(mut self, distrib: bool) -> Self {
        self.query.distrib = distrib;
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Metadata>) -> Self {
        self.query.fields = fields.into_iter().collect();
        self
    }

    pub fn facets(mut self, facets: impl IntoIterator<Item = Metadata>) -> Self {
        self.query.facets = facets.into_iter().collect();
        self
    }

    pub fn temporal(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.query.start = Some(start);
        self.query.end = Some(end);
        self
    }

    pub fn bbox(mut self, bbox: BoundingBox) -> Self {
        self.query.bbox = Some(bbox);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Produce an immutable snapshot.
    pub fn build(&self) -> SearchQuery {
        self.query.clone()
    }
}
