//! Subcommand implementations.

mod cert_info;
mod count;
mod dataset;
mod facets;
mod harvest;
mod login;
mod probe;
mod query;
mod runs;
mod search;
mod wget;

use anyhow::Result;
use clap::Subcommand;

use crate::context::Context;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search an index node and print matching records
    Search(search::SearchArgs),

    /// Count records matching a query
    Count(count::CountArgs),

    /// Show value counts for facets
    Facets(facets::FacetsArgs),

    /// Download the wget script for a query
    Wget(wget::WgetArgs),

    /// Harvest every dataset matched by a query into the local store
    Harvest(harvest::HarvestArgs),

    /// List stored harvest runs
    Runs(runs::RunsArgs),

    /// Show a harvested dataset from the local store
    Dataset(dataset::DatasetArgs),

    /// Obtain a delegated certificate for an OpenID
    Login(login::LoginArgs),

    /// Show the stored certificate
    CertInfo(cert_info::CertInfoArgs),

    /// Fetch a data URL presenting the stored certificate
    Probe(probe::ProbeArgs),
}

pub async fn handle(command: Command, context: &Context) -> Result<()> {
    match command {
        Command::Search(args) => search::run(args, context).await,
        Command::Count(args) => count::run(args, context).await,
        Command::Facets(args) => facets::run(args, context).await,
        Command::Wget(args) => wget::run(args, context).await,
        Command::Harvest(args) => harvest::run(args, context).await,
        Command::Runs(args) => runs::run(args, context),
        Command::Dataset(args) => dataset::run(args, context),
        Command::Login(args) => login::run(args, context).await,
        Command::CertInfo(args) => cert_info::run(args, context).await,
        Command::Probe(args) => probe::run(args, context).await,
    }
}
