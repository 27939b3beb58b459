//! Search command implementation.

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;

use esgf_core::SearchService;

use super::query::QueryArgs;
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

pub async fn run(args: SearchArgs, context: &Context) -> Result<()> {
    let query = args.query.to_query(context.node()?)?;
    let search = context.search().await?;

    let records = search.execute(&query).await.context("Search failed")?;
    if records.is_empty() {
        eprintln!("{}", "No records found.".dimmed());
        return Ok(());
    }

    for record in &records {
        let json = output::record_json(record);
        if args.pretty {
            output::json_pretty(&json)?;
        } else {
            output::json(&json)?;
        }
    }
    eprintln!("{}", format!("{} records", records.len()).dimmed());
    Ok(())
}
