//! Engine tuning knobs.

use serde::{Deserialize, Serialize};
use url::Url;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_CEILING: u64 = 1000;

/// Default validity requested for delegated certificates.
pub const DEFAULT_CERTIFICATE_LIFETIME_HOURS: u32 = 72;

/// PEM bundle of the CAs trusted across the federation.
pub const DEFAULT_TRUST_ROOTS_URL: &str =
    "https://raw.githubusercontent.com/ESGF/esgf-dist/master/installer/certs/esgf-ca-bundle.crt";

/// Engine configuration.
///
/// Every field has a default, so a partial JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest page requested from an index node.
    pub page_ceiling: u64,
    /// Size of the collector worker pool.
    pub workers: usize,
    /// Requested lifetime of delegated certificates.
    pub certificate_lifetime_hours: u32,
    /// Where delegation fetches the federation trust roots. `None` uses only
    /// the bundle already in the credential store.
    pub trust_roots_url: Option<Url>,
    /// Entries kept in the dataset store's fronting cache.
    pub cache_capacity: usize,
    /// Whether resuming a paused run re-enqueues failed datasets.
    pub retry_failed_on_resume: bool,
    /// User agent sent on every request.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_ceiling: DEFAULT_PAGE_CEILING,
            workers: 8,
            certificate_lifetime_hours: DEFAULT_CERTIFICATE_LIFETIME_HOURS,
            trust_roots_url: Url::parse(DEFAULT_TRUST_ROOTS_URL).ok(),
            cache_capacity: 512,
            retry_failed_on_resume: false,
            user_agent: concat!("esgf-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
