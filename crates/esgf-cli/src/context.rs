//! Engine components built from the CLI configuration.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing::debug;
use url::Url;

use esgf_auth::{CredentialProvider, CredentialStore, ProviderSettings};
use esgf_core::{EngineConfig, NodeUrl};
use esgf_search::{FederatedSearch, NodeList, SearchClient};
use esgf_store::DatasetStore;

use crate::cli::GlobalArgs;
use crate::config::{self, CliConfig};

/// Database file name inside the data directory.
const DATABASE_FILE: &str = "esgf.db";

/// Credential directory inside the data directory.
const CREDENTIALS_DIR: &str = "credentials";

/// Resolved configuration shared by every command.
#[derive(Debug)]
pub struct Context {
    config: CliConfig,
    data_dir: PathBuf,
}

impl Context {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => config::default_config_path()?,
        };
        let config = CliConfig::load(&path)?.merge(args);
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => config::default_data_dir()?,
        };
        debug!(
            config = %path.display(),
            data_dir = %data_dir.display(),
            node = config.index_node(),
            "configuration loaded"
        );
        Ok(Self { config, data_dir })
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.config.engine
    }

    /// The configured primary index node.
    pub fn node(&self) -> Result<NodeUrl> {
        NodeUrl::new(self.config.index_node()).context("Invalid index node URL")
    }

    /// The primary node followed by the fallback list, if any.
    pub async fn nodes(&self) -> Result<NodeList> {
        let primary = self.node()?;
        let Some(path) = &self.config.nodes_file else {
            return Ok(NodeList::new([primary])?);
        };
        let fallback = NodeList::load(path)
            .await
            .with_context(|| format!("Failed to load node list {}", path.display()))?;
        Ok(NodeList::new(
            std::iter::once(primary).chain(fallback.iter().cloned()),
        )?)
    }

    pub async fn search(&self) -> Result<FederatedSearch> {
        let client = SearchClient::new(self.engine()).context("Failed to build HTTP client")?;
        Ok(FederatedSearch::new(client, self.nodes().await?))
    }

    pub fn store(&self) -> Result<DatasetStore> {
        fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        DatasetStore::open(
            self.data_dir.join(DATABASE_FILE),
            self.engine().cache_capacity,
        )
        .context("Failed to open dataset database")
    }

    pub fn provider(&self) -> Result<CredentialProvider> {
        let mut settings = ProviderSettings::from_engine(self.engine());
        if let Some(url) = &self.config.trust_roots_url {
            settings = settings
                .with_trust_roots_url(Url::parse(url).context("Invalid trust roots URL")?);
        }
        let store = CredentialStore::new(self.data_dir.join(CREDENTIALS_DIR));
        CredentialProvider::myproxy(store, settings).context("Failed to build credential provider")
    }
}
