//! Per-dataset collection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use esgf_auth::CredentialProvider;
use esgf_core::error::ResponseFormatError;
use esgf_core::{
    Dataset, DatasetFile, HarvestKind, Metadata, RecordType, Result, SearchQuery, SearchService,
    Service,
};

/// Gathers the full metadata of one dataset.
///
/// The harvester drops the returned future when the collection is cancelled,
/// so every `.await` inside an implementation is a cancellation point.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Collect the dataset `instance_id` matched by `query`.
    async fn collect(&self, query: &SearchQuery, instance_id: &str, kind: HarvestKind)
    -> Result<Dataset>;
}

/// Checks that a data URL can actually be opened.
#[async_trait]
pub trait AccessProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<()>;
}

#[async_trait]
impl AccessProbe for CredentialProvider {
    async fn probe(&self, url: &str) -> Result<()> {
        self.authenticated_connection(url).await.map(|_| ())
    }
}

/// Collects datasets through the federated search service.
pub struct SearchCollector {
    search: Arc<dyn SearchService>,
    probe: Option<Arc<dyn AccessProbe>>,
}

impl SearchCollector {
    pub fn new(search: Arc<dyn SearchService>) -> Self {
        Self {
            search,
            probe: None,
        }
    }

    /// Probe each collected dataset's first HTTP endpoint.
    pub fn with_probe(mut self, probe: Arc<dyn AccessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    async fn fetch_files(&self, query: &SearchQuery, dataset: &mut Dataset) -> Result<()> {
        let dataset_id = dataset
            .record()
            .id()
            .ok_or_else(|| ResponseFormatError::MissingField {
                field: Metadata::Id.wire_name().to_string(),
            })?
            .to_string();

        let files_query = SearchQuery::builder(query.node().clone())
            .record_type(RecordType::File)
            .distrib(query.distrib())
            .constraint(Metadata::DatasetId, dataset_id)
            .build();
        let records = self.search.execute(&files_query).await?;
        debug!(files = records.len(), "fetched file list");

        for record in records {
            dataset.add_file(DatasetFile::from_record(record)?);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SearchCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCollector")
            .field("probe", &self.probe.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Collector for SearchCollector {
    #[instrument(skip(self, query), fields(node = %query.node()))]
    async fn collect(
        &self,
        query: &SearchQuery,
        instance_id: &str,
        kind: HarvestKind,
    ) -> Result<Dataset> {
        let dataset_query = SearchQuery::builder(query.node().clone())
            .record_type(RecordType::Dataset)
            .distrib(query.distrib())
            .constraint(Metadata::InstanceId, instance_id)
            .build();
        let record = self
            .search
            .execute(&dataset_query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResponseFormatError::MissingField {
                field: format!("{} '{}'", Metadata::InstanceId.wire_name(), instance_id),
            })?;

        let mut dataset = Dataset::from_record(record)?;
        if kind == HarvestKind::Files {
            self.fetch_files(query, &mut dataset).await?;
        }

        if let Some(probe) = &self.probe {
            if let Some(url) = http_endpoint(&dataset) {
                debug!(%url, "probing access");
                probe.probe(&url).await?;
            }
        }
        Ok(dataset)
    }
}

/// First HTTP download URL among the dataset's files, then its own record.
fn http_endpoint(dataset: &Dataset) -> Option<String> {
    dataset
        .files()
        .flat_map(|file| file.record().services(Metadata::Url).iter())
        .chain(dataset.record().services(Metadata::Url).iter())
        .find(|endpoint| endpoint.service == Service::HttpServer)
        .map(|endpoint| endpoint.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esgf_core::{FieldValue, Record, ServiceEndpoint};

    fn endpoint(url: &str, service: Service) -> ServiceEndpoint {
        ServiceEndpoint {
            url: url.into(),
            mime_type: "application/netcdf".into(),
            service,
        }
    }

    #[test]
    fn http_endpoint_prefers_files() {
        let record = Record::new()
            .with(Metadata::InstanceId, FieldValue::Text("ds".into()))
            .with(
                Metadata::Url,
                FieldValue::Services(vec![endpoint("https://node/ds.html", Service::HttpServer)]),
            );
        let mut dataset = Dataset::from_record(record).unwrap();
        assert_eq!(http_endpoint(&dataset).as_deref(), Some("https://node/ds.html"));

        let file = Record::new()
            .with(Metadata::Id, FieldValue::Text("ds.f1".into()))
            .with(Metadata::DatasetId, FieldValue::Text("ds|node".into()))
            .with(
                Metadata::Url,
                FieldValue::Services(vec![
                    endpoint("gsiftp://node/f1.nc", Service::GridFtp),
                    endpoint("https://node/f1.nc", Service::HttpServer),
                ]),
            );
        dataset.add_file(DatasetFile::from_record(file).unwrap());
        assert_eq!(http_endpoint(&dataset).as_deref(), Some("https://node/f1.nc"));
    }

    #[test]
    fn no_http_endpoint() {
        let record = Record::new().with(Metadata::InstanceId, FieldValue::Text("ds".into()));
        let dataset = Dataset::from_record(record).unwrap();
        assert_eq!(http_endpoint(&dataset), None);
    }
}
