//! Count command implementation.

use anyhow::{Context as _, Result};
use clap::Args;

use esgf_core::SearchService;

use super::query::QueryArgs;
use crate::context::Context;

#[derive(Args, Debug)]
pub struct CountArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Count replicas as well as master copies
    #[arg(long)]
    pub include_replicas: bool,
}

pub async fn run(args: CountArgs, context: &Context) -> Result<()> {
    let query = args.query.to_query(context.node()?)?;
    let search = context.search().await?;

    let count = search
        .count(&query, args.include_replicas)
        .await
        .context("Count failed")?;
    println!("{}", count);
    Ok(())
}
