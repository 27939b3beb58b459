//! Mock index node tests for the search client.
//!
//! These tests use wiremock to simulate ESGF index nodes and exercise paging,
//! page shrinking and failover without network access.

use esgf_core::error::TransportError;
use esgf_core::{Error, Metadata, NodeUrl, SearchQuery, SearchService};
use esgf_search::{FederatedSearch, NodeList, SearchClient};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves `total` synthetic datasets, honouring `offset` and `limit`.
///
/// Page requests asking for more than `max_page` records fail with HTTP 500,
/// the way an overloaded node does.
struct IndexResponder {
    total: u64,
    max_page: u64,
}

impl IndexResponder {
    fn new(total: u64) -> Self {
        Self {
            total,
            max_page: u64::MAX,
        }
    }
}

impl Respond for IndexResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let offset = param(request, "offset").unwrap_or(0);
        let limit = param(request, "limit").unwrap_or(10);
        if limit > self.max_page {
            return ResponseTemplate::new(500);
        }

        let end = self.total.min(offset + limit);
        let docs: Vec<_> = (offset..end)
            .map(|i| {
                json!({
                    "id": format!("cmip6.ds{}.v1|node.example", i),
                    "instance_id": format!("cmip6.ds{}.v1", i),
                    "master_id": format!("cmip6.ds{}", i),
                    "project": ["CMIP6"],
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "response": {"numFound": self.total, "start": offset, "docs": docs}
        }))
    }
}

fn param(request: &Request, name: &str) -> Option<u64> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .and_then(|(_, v)| v.parse().ok())
}

fn node_url(server: &MockServer) -> NodeUrl {
    NodeUrl::new(format!("{}/esg-search", server.uri())).unwrap()
}

fn client(page_ceiling: u64) -> SearchClient {
    SearchClient::with_http(reqwest::Client::new(), page_ceiling)
}

/// `(offset, limit)` of every non-count request a server received.
async fn page_requests(server: &MockServer) -> Vec<(u64, u64)> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| (param(r, "offset").unwrap(), param(r, "limit").unwrap()))
        .filter(|(_, limit)| *limit != 0)
        .collect()
}

// ============================================================================
// Paging Tests
// ============================================================================

#[tokio::test]
async fn test_pages_above_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .respond_with(IndexResponder::new(2500))
        .mount(&server)
        .await;

    let query = SearchQuery::builder(node_url(&server)).build();
    let records = client(1000).execute(&query).await.unwrap();

    assert_eq!(records.len(), 2500);
    assert_eq!(
        page_requests(&server).await,
        vec![(0, 1000), (1000, 1000), (2000, 500)]
    );
}

#[tokio::test]
async fn test_count_matches_execute_below_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .respond_with(IndexResponder::new(37))
        .mount(&server)
        .await;

    let client = client(1000);
    let query = SearchQuery::builder(node_url(&server)).build();
    let count = client.count(&query, true).await.unwrap();
    let records = client.execute(&query).await.unwrap();

    assert_eq!(count, 37);
    assert_eq!(records.len() as u64, count);
    assert_eq!(page_requests(&server).await, vec![(0, 37)]);
}

#[tokio::test]
async fn test_limit_and_offset_bound_execution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .respond_with(IndexResponder::new(100))
        .mount(&server)
        .await;

    let query = SearchQuery::builder(node_url(&server))
        .offset(90)
        .limit(25)
        .build();
    let records = client(1000).execute(&query).await.unwrap();

    assert_eq!(records.len(), 10);
    assert_eq!(records[0].instance_id(), Some("cmip6.ds90.v1"));
}

#[tokio::test]
async fn test_page_size_shrinks_under_load() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .respond_with(IndexResponder {
            total: 1000,
            max_page: 300,
        })
        .mount(&server)
        .await;

    let query = SearchQuery::builder(node_url(&server)).build();
    let records = client(1000).execute(&query).await.unwrap();

    assert_eq!(records.len(), 1000);
    let requests = page_requests(&server).await;
    assert_eq!(&requests[..3], &[(0, 1000), (0, 500), (0, 250)]);
    // After shrinking, offsets are contiguous.
    let served: Vec<_> = requests.iter().filter(|(_, l)| *l <= 250).collect();
    for pair in served.windows(2) {
        assert_eq!(pair[0].0 + pair[0].1, pair[1].0);
    }
}

#[tokio::test]
async fn test_count_without_replicas() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .and(query_param("replica", "false"))
        .and(query_param("limit", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"numFound": 12, "start": 0, "docs": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = SearchQuery::builder(node_url(&server)).build();
    assert_eq!(client(1000).count(&query, false).await.unwrap(), 12);
}

#[tokio::test]
async fn test_empty_result_issues_only_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .respond_with(IndexResponder::new(0))
        .expect(1)
        .mount(&server)
        .await;

    let query = SearchQuery::builder(node_url(&server)).build();
    assert!(client(1000).execute(&query).await.unwrap().is_empty());
}

// ============================================================================
// Facets and wget Tests
// ============================================================================

#[tokio::test]
async fn test_facets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .and(query_param("facets", "project,model"))
        .and(query_param("limit", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"numFound": 15, "start": 0, "docs": []},
            "facet_counts": {
                "facet_fields": {
                    "project": ["CMIP5", 10, "CMIP6", 5],
                    "model": ["HadCM3", 15]
                }
            }
        })))
        .mount(&server)
        .await;

    let query = SearchQuery::builder(node_url(&server)).build();
    let facets = client(1000)
        .facets(&query, &[Metadata::Project, Metadata::Model])
        .await
        .unwrap();

    assert_eq!(facets[&Metadata::Project].len(), 2);
    assert_eq!(facets[&Metadata::Project][1].value, "CMIP6");
    assert_eq!(facets[&Metadata::Model][0].count, 15);
}

#[tokio::test]
async fn test_wget_script() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/wget"))
        .and(query_param("variable", "tas"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#!/bin/bash\necho download\n"))
        .mount(&server)
        .await;

    let query = SearchQuery::builder(node_url(&server))
        .constraint(Metadata::Variable, "tas")
        .build();
    let script = client(1000).wget_script(&query).await.unwrap();
    assert!(script.starts_with("#!/bin/bash"));
}

// ============================================================================
// Failover Tests
// ============================================================================

async fn unavailable_node() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_failover_to_first_healthy_node() {
    let down_a = unavailable_node().await;
    let down_b = unavailable_node().await;
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .respond_with(IndexResponder::new(5))
        .mount(&healthy)
        .await;
    let never = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(IndexResponder::new(5))
        .expect(0)
        .mount(&never)
        .await;

    let nodes = NodeList::new([
        node_url(&down_a),
        node_url(&down_b),
        node_url(&healthy),
        node_url(&never),
    ])
    .unwrap();
    let search = FederatedSearch::new(client(1000), nodes);

    let query = SearchQuery::builder(node_url(&down_a)).build();
    let records = search.execute(&query).await.unwrap();

    assert_eq!(records.len(), 5);
    assert!(!down_a.received_requests().await.unwrap().is_empty());
    assert!(!down_b.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_nodes_failed() {
    let a = unavailable_node().await;
    let b = unavailable_node().await;
    let search = FederatedSearch::new(
        client(1000),
        NodeList::new([node_url(&a), node_url(&b)]).unwrap(),
    );

    let query = SearchQuery::builder(node_url(&a)).build();
    let err = search.count(&query, true).await.unwrap_err();

    match err {
        Error::Transport(TransportError::AllNodesFailed { attempted, last }) => {
            assert_eq!(attempted, 2);
            assert!(last.contains("503"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_response_does_not_fail_over() {
    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&broken)
        .await;
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(IndexResponder::new(5))
        .expect(0)
        .mount(&healthy)
        .await;

    let search = FederatedSearch::new(
        client(1000),
        NodeList::new([node_url(&broken), node_url(&healthy)]).unwrap(),
    );
    let query = SearchQuery::builder(node_url(&broken)).build();

    let err = search.execute(&query).await.unwrap_err();
    assert!(matches!(err, Error::ResponseFormat(_)));
}
