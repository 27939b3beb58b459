//! Dataset discovery.

use std::collections::HashSet;

use tracing::{debug, instrument};

use esgf_core::{Metadata, RecordType, Result, SearchQuery, SearchService};

/// Instance ids of every dataset matched by `query`, in server order.
///
/// Replicas share an instance id, so each id is reported once.
#[instrument(skip_all, fields(node = %query.node()))]
pub async fn discover_instances(
    search: &dyn SearchService,
    query: &SearchQuery,
) -> Result<Vec<String>> {
    let query = query
        .with_record_type(RecordType::Dataset)
        .with_fields(vec![Metadata::Id, Metadata::InstanceId]);
    let records = search.execute(&query).await?;

    let mut seen = HashSet::new();
    let ids: Vec<String> = records
        .iter()
        .filter_map(|record| record.instance_id())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect();
    debug!(records = records.len(), datasets = ids.len(), "discovery finished");
    Ok(ids)
}
