//! The closed search vocabulary and its field table.
//!
//! Each [`Metadata`] key has a fixed wire name and a [`FieldKind`] describing
//! its cardinality and scalar type. Response parsing iterates [`FIELDS`] once
//! and converts each present value with [`FieldKind::convert`]; nothing else
//! in the engine needs to know how a given field is encoded.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, InvalidInputError, ResponseFormatError};

use super::service::ServiceEndpoint;

/// A key in the federation's search vocabulary.
///
/// Wire names are a fixed, versioned external contract and must not be
/// renamed. Serialization always uses the wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metadata {
    Id,
    InstanceId,
    MasterId,
    DatasetId,
    Title,
    Description,
    Size,
    Timestamp,
    IndexTimestamp,
    DatetimeStart,
    DatetimeStop,
    NorthDegrees,
    SouthDegrees,
    EastDegrees,
    WestDegrees,
    Project,
    Institute,
    Model,
    Experiment,
    ExperimentFamily,
    TimeFrequency,
    Product,
    Realm,
    CmorTable,
    Ensemble,
    Variable,
    VariableLongName,
    CfStandardName,
    DataNode,
    IndexNode,
    Replica,
    Latest,
    Version,
    NumberOfFiles,
    NumberOfAggregations,
    Url,
    Access,
    Checksum,
    ChecksumType,
    TrackingId,
    Format,
    Type,
    DrsId,
    Xlink,
    Score,
}

/// Cardinality and scalar type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Single string.
    Text,
    /// Single signed integer.
    Integer,
    /// Single floating point number.
    Float,
    /// Single boolean.
    Boolean,
    /// Single UTC timestamp.
    Timestamp,
    /// List of strings.
    TextList,
    /// List of `url|mime|service` access descriptors.
    Services,
}

/// Describes how one vocabulary key is encoded on the wire.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub key: Metadata,
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(key: Metadata, name: &'static str, kind: FieldKind) -> FieldDescriptor {
    FieldDescriptor { key, name, kind }
}

/// The field table, in [`Metadata`] declaration order.
pub const FIELDS: &[FieldDescriptor] = &[
    field(Metadata::Id, "id", FieldKind::Text),
    field(Metadata::InstanceId, "instance_id", FieldKind::Text),
    field(Metadata::MasterId, "master_id", FieldKind::Text),
    field(Metadata::DatasetId, "dataset_id", FieldKind::Text),
    field(Metadata::Title, "title", FieldKind::Text),
    field(Metadata::Description, "description", FieldKind::TextList),
    field(Metadata::Size, "size", FieldKind::Integer),
    field(Metadata::Timestamp, "timestamp", FieldKind::Timestamp),
    field(Metadata::IndexTimestamp, "_timestamp", FieldKind::Timestamp),
    field(Metadata::DatetimeStart, "datetime_start", FieldKind::Timestamp),
    field(Metadata::DatetimeStop, "datetime_stop", FieldKind::Timestamp),
    field(Metadata::NorthDegrees, "north_degrees", FieldKind::Float),
    field(Metadata::SouthDegrees, "south_degrees", FieldKind::Float),
    field(Metadata::EastDegrees, "east_degrees", FieldKind::Float),
    field(Metadata::WestDegrees, "west_degrees", FieldKind::Float),
    field(Metadata::Project, "project", FieldKind::TextList),
    field(Metadata::Institute, "institute", FieldKind::TextList),
    field(Metadata::Model, "model", FieldKind::TextList),
    field(Metadata::Experiment, "experiment", FieldKind::TextList),
    field(Metadata::ExperimentFamily, "experiment_family", FieldKind::TextList),
    field(Metadata::TimeFrequency, "time_frequency", FieldKind::TextList),
    field(Metadata::Product, "product", FieldKind::TextList),
    field(Metadata::Realm, "realm", FieldKind::TextList),
    field(Metadata::CmorTable, "cmor_table", FieldKind::TextList),
    field(Metadata::Ensemble, "ensemble", FieldKind::TextList),
    field(Metadata::Variable, "variable", FieldKind::TextList),
    field(Metadata::VariableLongName, "variable_long_name", FieldKind::TextList),
    field(Metadata::CfStandardName, "cf_standard_name", FieldKind::TextList),
    field(Metadata::DataNode, "data_node", FieldKind::Text),
    field(Metadata::IndexNode, "index_node", FieldKind::Text),
    field(Metadata::Replica, "replica", FieldKind::Boolean),
    field(Metadata::Latest, "latest", FieldKind::Boolean),
    field(Metadata::Version, "version", FieldKind::Text),
    field(Metadata::NumberOfFiles, "number_of_files", FieldKind::Integer),
    field(
        Metadata::NumberOfAggregations,
        "number_of_aggregations",
        FieldKind::Integer,
    ),
    field(Metadata::Url, "url", FieldKind::Services),
    field(Metadata::Access, "access", FieldKind::TextList),
    field(Metadata::Checksum, "checksum", FieldKind::TextList),
    field(Metadata::ChecksumType, "checksum_type", FieldKind::TextList),
    field(Metadata::TrackingId, "tracking_id", FieldKind::TextList),
    field(Metadata::Format, "format", FieldKind::TextList),
    field(Metadata::Type, "type", FieldKind::Text),
    field(Metadata::DrsId, "drs_id", FieldKind::TextList),
    field(Metadata::Xlink, "xlink", FieldKind::TextList),
    field(Metadata::Score, "score", FieldKind::Float),
];

impl Metadata {
    /// Returns this key's descriptor.
    pub fn descriptor(self) -> &'static FieldDescriptor {
        &FIELDS[self as usize]
    }

    /// Returns the wire name.
    pub fn wire_name(self) -> &'static str {
        self.descriptor().name
    }

    /// Returns the field kind.
    pub fn kind(self) -> FieldKind {
        self.descriptor().kind
    }

    /// Look up a key by wire name.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        FIELDS.iter().find(|f| f.name == name).map(|f| f.key)
    }

    /// Iterate every key in declaration order.
    pub fn all() -> impl Iterator<Item = Metadata> {
        FIELDS.iter().map(|f| f.key)
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Metadata {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metadata::from_wire_name(s).ok_or_else(|| {
            InvalidInputError::Other {
                message: format!("unknown metadata field '{}'", s),
            }
            .into()
        })
    }
}

impl Serialize for Metadata {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Metadata::from_wire_name(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown metadata field '{}'", s)))
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    TextList(Vec<String>),
    Services(Vec<ServiceEndpoint>),
}

impl FieldKind {
    /// Convert a raw JSON value to this kind.
    ///
    /// Returns `Ok(None)` for `null` and empty arrays so absent values are
    /// omitted rather than defaulted. Multi-valued JSON for a scalar kind
    /// yields its first element; a scalar for a list kind yields a
    /// one-element list.
    pub fn convert(
        self,
        name: &str,
        raw: &Value,
    ) -> Result<Option<FieldValue>, ResponseFormatError> {
        match self {
            FieldKind::TextList => {
                let items = elements(raw)
                    .into_iter()
                    .map(|v| scalar_text(name, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((!items.is_empty()).then_some(FieldValue::TextList(items)))
            }
            FieldKind::Services => {
                let endpoints = elements(raw)
                    .into_iter()
                    .map(|v| -> Result<ServiceEndpoint, ResponseFormatError> {
                        let text = scalar_text(name, v)?;
                        text.parse::<ServiceEndpoint>()
                            .map_err(|_| invalid(name, v, "url|mime|service"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((!endpoints.is_empty()).then_some(FieldValue::Services(endpoints)))
            }
            scalar => {
                let Some(first) = elements(raw).into_iter().next() else {
                    return Ok(None);
                };
                scalar.convert_scalar(name, first).map(Some)
            }
        }
    }

    fn convert_scalar(self, name: &str, v: &Value) -> Result<FieldValue, ResponseFormatError> {
        match self {
            FieldKind::Text => scalar_text(name, v).map(FieldValue::Text),
            FieldKind::Integer => match v {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(FieldValue::Integer)
                    .ok_or_else(|| invalid(name, v, "an integer")),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(FieldValue::Integer)
                    .map_err(|_| invalid(name, v, "an integer")),
                _ => Err(invalid(name, v, "an integer")),
            },
            FieldKind::Float => match v {
                Value::Number(n) => n
                    .as_f64()
                    .map(FieldValue::Float)
                    .ok_or_else(|| invalid(name, v, "a number")),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(FieldValue::Float)
                    .map_err(|_| invalid(name, v, "a number")),
                _ => Err(invalid(name, v, "a number")),
            },
            FieldKind::Boolean => match v {
                Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(FieldValue::Boolean(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => {
                    Ok(FieldValue::Boolean(false))
                }
                _ => Err(invalid(name, v, "a boolean")),
            },
            FieldKind::Timestamp => match v {
                Value::String(s) => parse_timestamp(s)
                    .map(FieldValue::Timestamp)
                    .ok_or_else(|| invalid(name, v, "an ISO-8601 timestamp")),
                _ => Err(invalid(name, v, "an ISO-8601 timestamp")),
            },
            FieldKind::TextList | FieldKind::Services => unreachable!("list kinds handled by convert"),
        }
    }
}

/// Parse the timestamp layouts index nodes emit.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn elements(raw: &Value) -> Vec<&Value> {
    match raw {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        other => vec![other],
    }
}

fn scalar_text(name: &str, v: &Value) -> Result<String, ResponseFormatError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(name, v, "a string")),
    }
}

fn invalid(name: &str, v: &Value, expected: &'static str) -> ResponseFormatError {
    ResponseFormatError::InvalidValue {
        field: name.to_string(),
        value: v.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_order_matches_enum_order() {
        for (index, descriptor) in FIELDS.iter().enumerate() {
            assert_eq!(descriptor.key as usize, index, "{}", descriptor.name);
        }
    }

    #[test]
    fn wire_names_are_unique_and_resolvable() {
        for key in Metadata::all() {
            assert_eq!(Metadata::from_wire_name(key.wire_name()), Some(key));
        }
        assert_eq!(Metadata::from_wire_name("no_such_field"), None);
        assert_eq!(Metadata::IndexTimestamp.wire_name(), "_timestamp");
    }

    #[test]
    fn serializes_as_wire_name() {
        let json = serde_json::to_string(&Metadata::NumberOfFiles).unwrap();
        assert_eq!(json, "\"number_of_files\"");
        let back: Metadata = serde_json::from_str("\"cf_standard_name\"").unwrap();
        assert_eq!(back, Metadata::CfStandardName);
    }

    #[test]
    fn scalar_kind_takes_first_array_element() {
        let value = FieldKind::Text.convert("title", &json!(["a", "b"])).unwrap();
        assert_eq!(value, Some(FieldValue::Text("a".into())));
    }

    #[test]
    fn list_kind_wraps_scalar() {
        let value = FieldKind::TextList.convert("project", &json!("CMIP6")).unwrap();
        assert_eq!(value, Some(FieldValue::TextList(vec!["CMIP6".into()])));
    }

    #[test]
    fn null_and_empty_are_omitted() {
        assert_eq!(FieldKind::Integer.convert("size", &Value::Null).unwrap(), None);
        assert_eq!(FieldKind::TextList.convert("model", &json!([])).unwrap(), None);
    }

    #[test]
    fn numbers_accept_strings() {
        assert_eq!(
            FieldKind::Integer.convert("size", &json!("1024")).unwrap(),
            Some(FieldValue::Integer(1024))
        );
        assert_eq!(
            FieldKind::Float.convert("north_degrees", &json!("90.0")).unwrap(),
            Some(FieldValue::Float(90.0))
        );
    }

    #[test]
    fn booleans_accept_strings() {
        assert_eq!(
            FieldKind::Boolean.convert("replica", &json!("false")).unwrap(),
            Some(FieldValue::Boolean(false))
        );
        assert!(FieldKind::Boolean.convert("replica", &json!(3)).is_err());
    }

    #[test]
    fn timestamp_layouts() {
        assert!(parse_timestamp("2012-03-15T12:00:00Z").is_some());
        assert!(parse_timestamp("2012-03-15T12:00:00.123Z").is_some());
        assert!(parse_timestamp("1850-01-01T00:00:00").is_some());
        assert!(parse_timestamp("2001-12-31").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn invalid_value_reports_field() {
        let err = FieldKind::Integer
            .convert("size", &json!("huge"))
            .unwrap_err();
        assert!(err.to_string().contains("size"));
    }

    #[test]
    fn services_parse_descriptors() {
        let value = FieldKind::Services
            .convert(
                "url",
                &json!(["http://dn/thredds/fileServer/a.nc|application/netcdf|HTTPServer"]),
            )
            .unwrap();
        match value {
            Some(FieldValue::Services(endpoints)) => {
                assert_eq!(endpoints.len(), 1);
                assert_eq!(endpoints[0].url, "http://dn/thredds/fileServer/a.nc");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
