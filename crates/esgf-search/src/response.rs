//! Typed decoding of search responses.

use serde_json::{Map, Value};

use esgf_core::error::ResponseFormatError;
use esgf_core::types::FIELDS;
use esgf_core::{FacetCount, FacetCounts, Metadata, Record, Result};

use crate::endpoints::{FacetCountsBody, SearchEnvelope};

/// One decoded page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total matches on the node, independent of paging.
    pub num_found: u64,
    /// Offset of the first record in this page.
    pub start: u64,
    pub records: Vec<Record>,
    pub facets: FacetCounts,
}

/// Decode a raw `search` response body.
pub fn parse_search_response(body: &str) -> Result<SearchPage> {
    let envelope: SearchEnvelope =
        serde_json::from_str(body).map_err(ResponseFormatError::from)?;

    let records = envelope
        .response
        .docs
        .iter()
        .map(parse_document)
        .collect::<Result<Vec<_>>>()?;

    let facets = match &envelope.facet_counts {
        Some(body) => parse_facets(body)?,
        None => FacetCounts::new(),
    };

    Ok(SearchPage {
        num_found: envelope.response.num_found,
        start: envelope.response.start,
        records,
        facets,
    })
}

/// Convert one result object into a [`Record`].
///
/// Walks the field table once; fields outside the vocabulary are ignored and
/// absent fields are left out.
pub fn parse_document(doc: &Map<String, Value>) -> Result<Record> {
    let mut record = Record::new();
    for field in FIELDS {
        let Some(raw) = doc.get(field.name) else {
            continue;
        };
        if let Some(value) = field.kind.convert(field.name, raw)? {
            record.set(field.key, value);
        }
    }
    Ok(record)
}

fn parse_facets(body: &FacetCountsBody) -> Result<FacetCounts> {
    let mut facets = FacetCounts::new();
    for (name, pairs) in &body.facet_fields {
        let Some(key) = Metadata::from_wire_name(name) else {
            continue;
        };
        facets.insert(key, parse_pairs(name, pairs)?);
    }
    Ok(facets)
}

fn parse_pairs(name: &str, pairs: &[Value]) -> Result<Vec<FacetCount>> {
    if pairs.len() % 2 != 0 {
        return Err(ResponseFormatError::InvalidValue {
            field: name.to_string(),
            value: format!("{} elements", pairs.len()),
            expected: "value/count pairs",
        }
        .into());
    }

    pairs
        .chunks_exact(2)
        .map(|pair| -> Result<FacetCount> {
            let value = match &pair[0] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let count = pair[1]
                .as_u64()
                .ok_or_else(|| ResponseFormatError::InvalidValue {
                    field: name.to_string(),
                    value: pair[1].to_string(),
                    expected: "a non-negative count",
                })?;
            Ok(FacetCount { value, count })
        })
        .collect()
}
