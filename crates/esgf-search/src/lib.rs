//! esgf-search - Federated search client for ESGF index nodes.
//!
//! [`SearchClient`] talks to a single index node: it counts first, pages
//! through large result sets with a page size that shrinks when the node
//! refuses large responses, and decodes the typed response. [`FederatedSearch`]
//! wraps it with fallback across an ordered [`NodeList`].
//!
//! # Example
//!
//! ```no_run
//! use esgf_core::{EngineConfig, Metadata, NodeUrl, SearchQuery, SearchService};
//! use esgf_search::{FederatedSearch, NodeList, SearchClient};
//!
//! # async fn example() -> esgf_core::Result<()> {
//! let client = SearchClient::new(&EngineConfig::default())?;
//! let nodes = NodeList::parse(
//!     "https://esgf-node.llnl.gov/esg-search\nhttps://esgf-data.dkrz.de/esg-search",
//! )?;
//! let search = FederatedSearch::new(client, nodes.clone());
//!
//! let query = SearchQuery::builder(nodes.first().clone())
//!     .constraint(Metadata::Project, "CMIP6")
//!     .constraint(Metadata::Variable, "tas")
//!     .build();
//! let total = search.count(&query, false).await?;
//! println!("{} master datasets", total);
//! # Ok(())
//! # }
//! ```

mod client;
mod endpoints;
mod failover;
mod nodes;
mod paging;
mod response;

pub use client::{SearchClient, transport};
pub use failover::FederatedSearch;
pub use nodes::NodeList;
pub use paging::{collect_pages, page_count};
pub use response::{SearchPage, parse_document, parse_search_response};
