//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser};

use crate::commands::Command;

/// ESGF federated search, harvesting and credential tool.
#[derive(Parser, Debug)]
#[command(name = "esgf")]
#[command(author, version, long_version = env!("ESGF_LONG_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase engine log detail (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings that override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "ESGF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Index node to query
    #[arg(long, global = true, env = "ESGF_INDEX_NODE")]
    pub node: Option<String>,

    /// File listing fallback index nodes, one URL per line
    #[arg(long, global = true, env = "ESGF_NODES_FILE")]
    pub nodes_file: Option<PathBuf>,

    /// Directory for the dataset database and credentials
    #[arg(long, global = true, env = "ESGF_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// URL of the federation trust root bundle (PEM)
    #[arg(long, global = true, env = "ESGF_TRUST_ROOTS_URL")]
    pub trust_roots_url: Option<String>,
}
