//! Output formatting helpers.

use anyhow::Result;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use serde_json::{Map, Value};

use esgf_core::{FieldValue, HarvestStatus, Record};

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message.
pub fn warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print a labeled field.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

/// A harvest status, coloured by outcome.
pub fn status(status: HarvestStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        HarvestStatus::Completed => text.green(),
        HarvestStatus::Failed => text.red(),
        HarvestStatus::Paused => text.yellow(),
        HarvestStatus::Harvesting => text.cyan(),
        HarvestStatus::Created => text.normal(),
    }
}

/// Print a value as compact JSON.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a value as pretty-printed JSON.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// A record as a flat JSON object keyed by wire name.
pub fn record_json(record: &Record) -> Value {
    let fields: Map<String, Value> = record
        .iter()
        .map(|(key, value)| (key.wire_name().to_string(), field_json(value)))
        .collect();
    Value::Object(fields)
}

fn field_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::from(s.as_str()),
        FieldValue::Integer(n) => Value::from(*n),
        FieldValue::Float(x) => Value::from(*x),
        FieldValue::Boolean(b) => Value::from(*b),
        FieldValue::Timestamp(t) => Value::from(t.to_rfc3339()),
        FieldValue::TextList(items) => Value::from(items.clone()),
        FieldValue::Services(endpoints) => endpoints
            .iter()
            .map(|e| Value::from(format!("{}|{}|{}", e.url, e.mime_type, e.service)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esgf_core::{Metadata, Service, ServiceEndpoint};
    use serde_json::json;

    #[test]
    fn record_json_is_flat() {
        let record = Record::new()
            .with(Metadata::InstanceId, FieldValue::Text("cmip6.ds.v1".into()))
            .with(Metadata::Size, FieldValue::Integer(42))
            .with(Metadata::Variable, FieldValue::TextList(vec!["tas".into()]))
            .with(
                Metadata::Url,
                FieldValue::Services(vec![ServiceEndpoint {
                    url: "https://node/f.nc".into(),
                    mime_type: "application/netcdf".into(),
                    service: Service::HttpServer,
                }]),
            );

        assert_eq!(
            record_json(&record),
            json!({
                "instance_id": "cmip6.ds.v1",
                "size": 42,
                "variable": ["tas"],
                "url": ["https://node/f.nc|application/netcdf|HTTPServer"],
            })
        );
    }
}
