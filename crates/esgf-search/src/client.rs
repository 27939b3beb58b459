//! Single-node search client.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use esgf_core::error::{InvalidInputError, TransportError};
use esgf_core::{
    EngineConfig, Error, FacetCounts, Metadata, Record, Result, SearchQuery, SearchService,
};

use crate::endpoints::{SEARCH, WGET};
use crate::paging::collect_pages;
use crate::response::{SearchPage, parse_search_response};

/// HTTP client for one index node's `search` and `wget` services.
///
/// The target node is taken from each query, so one client serves any
/// number of nodes.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    page_ceiling: u64,
}

impl SearchClient {
    /// Create a client from engine configuration.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(transport)?;
        Ok(Self::with_http(http, config.page_ceiling))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, page_ceiling: u64) -> Self {
        Self {
            http,
            page_ceiling: page_ceiling.max(1),
        }
    }

    /// Largest page this client requests.
    pub fn page_ceiling(&self) -> u64 {
        self.page_ceiling
    }

    /// Issue one `search` request exactly as described by `query`.
    #[instrument(skip(self, query), fields(node = %query.node(), offset = query.offset()))]
    pub async fn fetch_page(&self, query: &SearchQuery) -> Result<SearchPage> {
        let body = self.get(SEARCH, query).await?;
        parse_search_response(&body)
    }

    /// Fetch the script that downloads every file matching `query`.
    #[instrument(skip(self, query), fields(node = %query.node()))]
    pub async fn wget_script(&self, query: &SearchQuery) -> Result<String> {
        self.get(WGET, query).await
    }

    async fn get(&self, service: &str, query: &SearchQuery) -> Result<String> {
        let url = query.node().endpoint(service);
        let params = query.to_params();
        debug!(%url, "index request");
        trace!(?params, "query parameters");

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        trace!(status = %status, "index response");
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            }
            .into());
        }

        response.text().await.map_err(transport)
    }
}

#[async_trait]
impl SearchService for SearchClient {
    #[instrument(skip(self, query), fields(node = %query.node()))]
    async fn execute(&self, query: &SearchQuery) -> Result<Vec<Record>> {
        let snapshot = query.clone();
        let total = self.count(&snapshot, true).await?;

        let start = snapshot.offset();
        let end = match snapshot.limit() {
            Some(limit) => total.min(start.saturating_add(limit)),
            None => total,
        };
        debug!(total, start, end, "executing query");
        if start >= end {
            return Ok(Vec::new());
        }

        let records = collect_pages(start, end, self.page_ceiling, |offset, limit| {
            let page = snapshot.with_offset(offset).with_limit(limit);
            async move { Ok(self.fetch_page(&page).await?.records) }
        })
        .await?;

        Ok(dedup_by_id(records))
    }

    #[instrument(skip(self, query), fields(node = %query.node()))]
    async fn count(&self, query: &SearchQuery, include_replicas: bool) -> Result<u64> {
        let mut probe = query.with_offset(0).with_limit(0);
        if !include_replicas {
            probe = probe.with_replica(Some(false));
        }
        let page = self.fetch_page(&probe).await?;
        debug!(num_found = page.num_found, "count");
        Ok(page.num_found)
    }

    #[instrument(skip(self, query), fields(node = %query.node()))]
    async fn facets(&self, query: &SearchQuery, facets: &[Metadata]) -> Result<FacetCounts> {
        let page = self.fetch_page(&query.facet_query(facets)).await?;
        Ok(page.facets)
    }
}

/// Map a reqwest failure into the engine's transport taxonomy.
pub fn transport(err: reqwest::Error) -> Error {
    let err = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else if err.is_builder() {
        return InvalidInputError::Other {
            message: err.to_string(),
        }
        .into();
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    err.into()
}

/// Keep the first record for each id; records without an id are kept.
fn dedup_by_id(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match record.id() {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        })
        .collect()
}
