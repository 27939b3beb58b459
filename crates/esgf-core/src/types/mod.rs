//! Core data model types.
//!
//! Identifier-carrying types enforce their invariants at construction time;
//! records themselves stay schema-light and typed by the field table.

mod dataset;
mod facet;
mod metadata;
mod node_url;
mod record;
mod service;

pub use dataset::{Dataset, DatasetFile};
pub use facet::{FacetCount, FacetCounts};
pub use metadata::{FIELDS, FieldDescriptor, FieldKind, FieldValue, Metadata, parse_timestamp};
pub use node_url::NodeUrl;
pub use record::Record;
pub use service::{Service, ServiceEndpoint};
