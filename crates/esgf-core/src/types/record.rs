//! Heterogeneous attribute records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::{FieldValue, Metadata};
use super::service::ServiceEndpoint;

/// An ordered attribute bag keyed by [`Metadata`].
///
/// Records hold only the fields a response actually carried; accessors
/// return `None` for anything absent or of a different kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<Metadata, FieldValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, key: Metadata, value: FieldValue) {
        self.values.insert(key, value);
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, key: Metadata, value: FieldValue) -> Self {
        self.set(key, value);
        self
    }

    /// Remove a field.
    pub fn remove(&mut self, key: Metadata) -> Option<FieldValue> {
        self.values.remove(&key)
    }

    pub fn get(&self, key: Metadata) -> Option<&FieldValue> {
        self.values.get(&key)
    }

    pub fn contains(&self, key: Metadata) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate fields in vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = (Metadata, &FieldValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Returns a text field, or the first element of a list field.
    pub fn text(&self, key: Metadata) -> Option<&str> {
        match self.get(key)? {
            FieldValue::Text(s) => Some(s),
            FieldValue::TextList(items) => items.first().map(String::as_str),
            _ => None,
        }
    }

    /// Returns every string of a list field (or the single text value).
    pub fn texts(&self, key: Metadata) -> Vec<&str> {
        match self.get(key) {
            Some(FieldValue::TextList(items)) => items.iter().map(String::as_str).collect(),
            Some(FieldValue::Text(s)) => vec![s.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn integer(&self, key: Metadata) -> Option<i64> {
        match self.get(key)? {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn float(&self, key: Metadata) -> Option<f64> {
        match self.get(key)? {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn boolean(&self, key: Metadata) -> Option<bool> {
        match self.get(key)? {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn timestamp(&self, key: Metadata) -> Option<DateTime<Utc>> {
        match self.get(key)? {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the access endpoints of a services field.
    pub fn services(&self, key: Metadata) -> &[ServiceEndpoint] {
        match self.get(key) {
            Some(FieldValue::Services(endpoints)) => endpoints,
            _ => &[],
        }
    }

    /// Globally unique id of this (version, replica, node).
    pub fn id(&self) -> Option<&str> {
        self.text(Metadata::Id)
    }

    /// Id stable across replicas of one version.
    pub fn instance_id(&self) -> Option<&str> {
        self.text(Metadata::InstanceId)
    }

    /// Id stable across all replicas and versions.
    pub fn master_id(&self) -> Option<&str> {
        self.text(Metadata::MasterId)
    }

    /// Parent dataset id of a file record.
    pub fn dataset_id(&self) -> Option<&str> {
        self.text(Metadata::DatasetId)
    }

    /// Size in bytes.
    pub fn size(&self) -> Option<i64> {
        self.integer(Metadata::Size)
    }
}
