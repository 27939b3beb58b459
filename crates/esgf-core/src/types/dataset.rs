//! Harvested datasets and their files.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ResponseFormatError};

use super::metadata::Metadata;
use super::record::Record;
use super::service::Service;

/// A file belonging to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    dataset_id: String,
    record: Record,
}

impl DatasetFile {
    /// Wrap a `type=File` record. The record must carry `id` and `dataset_id`.
    pub fn from_record(record: Record) -> Result<Self, Error> {
        if record.id().is_none() {
            return Err(missing(Metadata::Id));
        }
        let dataset_id = record
            .dataset_id()
            .ok_or_else(|| missing(Metadata::DatasetId))?
            .to_string();
        Ok(Self { dataset_id, record })
    }

    /// The id of this file record.
    pub fn id(&self) -> &str {
        self.record.id().unwrap_or_default()
    }

    /// Back-reference to the owning dataset's `id`.
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

/// A dataset and the files harvested for it.
///
/// A dataset starts empty, keyed only by its instance id, and is filled in by
/// the single collector that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    instance_id: String,
    record: Record,
    files: BTreeMap<String, DatasetFile>,
    services: BTreeSet<Service>,
}

impl Dataset {
    /// Create an empty dataset for an instance id.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            record: Record::new(),
            files: BTreeMap::new(),
            services: BTreeSet::new(),
        }
    }

    /// Build a dataset from a `type=Dataset` record carrying `instance_id`.
    pub fn from_record(record: Record) -> Result<Self, Error> {
        let instance_id = record
            .instance_id()
            .ok_or_else(|| missing(Metadata::InstanceId))?
            .to_string();
        let mut dataset = Self::new(instance_id);
        dataset.set_record(record);
        Ok(dataset)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The dataset's own metadata.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Replace the dataset's own metadata.
    pub fn set_record(&mut self, record: Record) {
        self.record = record;
        self.refresh_services();
    }

    /// Add (or replace) a file, keyed by file id.
    pub fn add_file(&mut self, file: DatasetFile) {
        self.services.extend(endpoint_services(file.record()));
        self.files.insert(file.id().to_string(), file);
    }

    pub fn files(&self) -> impl Iterator<Item = &DatasetFile> {
        self.files.values()
    }

    pub fn file(&self, id: &str) -> Option<&DatasetFile> {
        self.files.get(id)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Access services offered by the dataset or any of its files.
    pub fn services(&self) -> &BTreeSet<Service> {
        &self.services
    }

    /// Sum of file sizes, falling back to the dataset's declared size.
    pub fn total_size(&self) -> i64 {
        if self.files.is_empty() {
            return self.record.size().unwrap_or(0);
        }
        self.files.values().filter_map(|f| f.record().size()).sum()
    }

    fn refresh_services(&mut self) {
        let mut services: BTreeSet<Service> = self
            .record
            .texts(Metadata::Access)
            .into_iter()
            .map(Service::from_name)
            .collect();
        services.extend(endpoint_services(&self.record));
        for file in self.files.values() {
            services.extend(endpoint_services(file.record()));
        }
        self.services = services;
    }
}

fn endpoint_services(record: &Record) -> impl Iterator<Item = Service> + '_ {
    record
        .services(Metadata::Url)
        .iter()
        .map(|ep| ep.service.clone())
}

fn missing(key: Metadata) -> Error {
    ResponseFormatError::MissingField {
        field: key.wire_name().to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::metadata::FieldValue;
    use crate::types::service::ServiceEndpoint;

    fn file(id: &str, size: i64, service: &str) -> DatasetFile {
        let endpoint: ServiceEndpoint = format!("http://dn/{}|application/netcdf|{}", id, service)
            .parse()
            .unwrap();
        DatasetFile::from_record(
            Record::new()
                .with(Metadata::Id, FieldValue::Text(id.into()))
                .with(Metadata::DatasetId, FieldValue::Text("ds.v1|dn".into()))
                .with(Metadata::Size, FieldValue::Integer(size))
                .with(Metadata::Url, FieldValue::Services(vec![endpoint])),
        )
        .unwrap()
    }

    #[test]
    fn dataset_requires_instance_id() {
        assert!(Dataset::from_record(Record::new()).is_err());
    }

    #[test]
    fn file_requires_dataset_id() {
        let record = Record::new().with(Metadata::Id, FieldValue::Text("f1".into()));
        assert!(DatasetFile::from_record(record).is_err());
    }

    #[test]
    fn services_are_union_of_dataset_and_files() {
        let record = Record::new()
            .with(Metadata::InstanceId, FieldValue::Text("ds.v1".into()))
            .with(Metadata::Access, FieldValue::TextList(vec!["LAS".into()]));
        let mut dataset = Dataset::from_record(record).unwrap();
        dataset.add_file(file("f1", 10, "HTTPServer"));
        dataset.add_file(file("f2", 32, "GridFTP"));

        let services: Vec<_> = dataset.services().iter().cloned().collect();
        assert_eq!(
            services,
            vec![Service::HttpServer, Service::GridFtp, Service::Las]
        );
        assert_eq!(dataset.file_count(), 2);
        assert_eq!(dataset.total_size(), 42);
        assert_eq!(dataset.file("f1").unwrap().dataset_id(), "ds.v1|dn");
    }

    #[test]
    fn replacing_record_keeps_file_services() {
        let mut dataset = Dataset::new("ds.v1");
        dataset.add_file(file("f1", 1, "OPENDAP"));
        dataset.set_record(Record::new().with(Metadata::InstanceId, FieldValue::Text("ds.v1".into())));
        assert!(dataset.services().contains(&Service::OpenDap));
    }

    #[test]
    fn serde_round_trip() {
        let mut dataset = Dataset::new("ds.v1");
        dataset.add_file(file("f1", 5, "HTTPServer"));
        let json = serde_json::to_string(&dataset).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dataset);
    }
}
