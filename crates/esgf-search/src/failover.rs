//! Federation-wide failover.
//!
//! [`SearchClient`] recovers from oversized responses by shrinking pages.
//! When a node is down that does not help, so [`FederatedSearch`] re-issues
//! the same logical query against each known node in list order.

use std::future::Future;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use esgf_core::error::TransportError;
use esgf_core::{FacetCounts, Metadata, NodeUrl, Record, Result, SearchQuery, SearchService};

use crate::client::SearchClient;
use crate::nodes::NodeList;

/// Search service that falls back to sibling nodes on transport failure.
#[derive(Debug, Clone)]
pub struct FederatedSearch {
    client: SearchClient,
    nodes: NodeList,
}

impl FederatedSearch {
    pub fn new(client: SearchClient, nodes: NodeList) -> Self {
        Self { client, nodes }
    }

    pub fn client(&self) -> &SearchClient {
        &self.client
    }

    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    /// Candidate nodes for a query: its own node first, then the list.
    fn candidates<'a>(&'a self, primary: &'a NodeUrl) -> impl Iterator<Item = &'a NodeUrl> {
        std::iter::once(primary).chain(self.nodes.iter().filter(move |node| *node != primary))
    }

    /// Run `op` against each candidate until one succeeds.
    ///
    /// Only transport errors move on to the next node; anything else is the
    /// same on every node and is returned immediately.
    async fn with_failover<T, F, Fut>(&self, query: &SearchQuery, mut op: F) -> Result<T>
    where
        F: FnMut(SearchQuery) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempted = 0;
        let mut last = String::new();

        for node in self.candidates(query.node()) {
            attempted += 1;
            match op(query.with_node(node.clone())).await {
                Ok(value) => {
                    if attempted > 1 {
                        info!(%node, attempted, "query answered by fallback node");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    warn!(%node, error = %err, "node failed, trying next");
                    last = err.to_string();
                }
                Err(err) => return Err(err),
            }
        }

        Err(TransportError::AllNodesFailed { attempted, last }.into())
    }
}

#[async_trait]
impl SearchService for FederatedSearch {
    #[instrument(skip(self, query), fields(node = %query.node()))]
    async fn execute(&self, query: &SearchQuery) -> Result<Vec<Record>> {
        self.with_failover(query, |q| async move { self.client.execute(&q).await })
            .await
    }

    #[instrument(skip(self, query), fields(node = %query.node()))]
    async fn count(&self, query: &SearchQuery, include_replicas: bool) -> Result<u64> {
        self.with_failover(query, |q| async move {
            self.client.count(&q, include_replicas).await
        })
        .await
    }

    #[instrument(skip(self, query, facets), fields(node = %query.node()))]
    async fn facets(&self, query: &SearchQuery, facets: &[Metadata]) -> Result<FacetCounts> {
        self.with_failover(query, |q| async move { self.client.facets(&q, facets).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_is_tried_first_and_not_repeated() {
        let a = NodeUrl::new("https://a.example/esg-search").unwrap();
        let b = NodeUrl::new("https://b.example/esg-search").unwrap();
        let c = NodeUrl::new("https://c.example/esg-search").unwrap();
        let federated = FederatedSearch::new(
            SearchClient::with_http(reqwest::Client::new(), 10),
            NodeList::new([a.clone(), b.clone(), c.clone()]).unwrap(),
        );

        let order: Vec<_> = federated.candidates(&b).cloned().collect();
        assert_eq!(order, vec![b, a, c]);
    }
}
