//! Config file handling.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use esgf_core::EngineConfig;

use crate::cli::GlobalArgs;

/// Index node used when nothing else is configured.
pub const DEFAULT_INDEX_NODE: &str = "https://esgf-node.llnl.gov/esg-search";

/// Contents of `config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub index_node: Option<String>,
    pub nodes_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub trust_roots_url: Option<String>,
}

impl CliConfig {
    /// Read a config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply command-line and environment overrides.
    pub fn merge(mut self, args: &GlobalArgs) -> Self {
        if let Some(node) = &args.node {
            self.index_node = Some(node.clone());
        }
        if let Some(path) = &args.nodes_file {
            self.nodes_file = Some(path.clone());
        }
        if let Some(dir) = &args.data_dir {
            self.data_dir = Some(dir.clone());
        }
        if let Some(url) = &args.trust_roots_url {
            self.trust_roots_url = Some(url.clone());
        }
        self
    }

    pub fn index_node(&self) -> &str {
        self.index_node.as_deref().unwrap_or(DEFAULT_INDEX_NODE)
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "esgf").context("Could not determine home directory")
}

/// Default location of `config.json`.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

/// Default directory for the database and credentials.
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
