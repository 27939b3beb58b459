//! esgf-harvest - Resumable, parallel harvesting of ESGF dataset metadata.
//!
//! A [`Harvester`] discovers every dataset matched by a query and drives one
//! [`Collector`] task per dataset on a bounded worker pool, tracking each
//! dataset through `CREATED -> HARVESTING -> {COMPLETED | FAILED}`. Runs can
//! be paused, resumed, reset as a whole or per dataset, and restored from a
//! persisted [`RunSnapshot`](esgf_core::RunSnapshot).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use esgf_core::{EngineConfig, HarvestKind, Metadata, SearchQuery};
//! use esgf_harvest::{HarvestServices, Harvester, SearchCollector};
//! use esgf_search::{FederatedSearch, NodeList, SearchClient};
//! use esgf_store::DatasetStore;
//!
//! # async fn example() -> esgf_core::Result<()> {
//! let config = EngineConfig::default();
//! let nodes = NodeList::parse("https://esgf-node.llnl.gov/esg-search")?;
//! let search = Arc::new(FederatedSearch::new(SearchClient::new(&config)?, nodes.clone()));
//! let store = Arc::new(DatasetStore::open("esgf.db", config.cache_capacity)?);
//!
//! let services = HarvestServices::new(
//!     search.clone(),
//!     Arc::new(SearchCollector::new(search)),
//!     store.clone(),
//!     &config,
//! )
//! .with_runs(store);
//!
//! let query = SearchQuery::builder(nodes.first().clone())
//!     .constraint(Metadata::Project, "CMIP6")
//!     .build();
//! let harvester = Harvester::new(query, services);
//! harvester.start(HarvestKind::Files)?;
//! let snapshot = harvester.wait().await;
//! println!("{} of {} datasets harvested", snapshot.processed, snapshot.total);
//! # Ok(())
//! # }
//! ```

mod collector;
mod discovery;
mod harvester;
mod observer;

pub use collector::{AccessProbe, Collector, SearchCollector};
pub use discovery::discover_instances;
pub use harvester::{HarvestServices, Harvester};
pub use observer::{HarvestObserver, Progress};
