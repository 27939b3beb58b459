//! Facets command implementation.

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;

use esgf_core::SearchService;

use super::query::{QueryArgs, parse_facets};
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct FacetsArgs {
    /// Facets to count (all when omitted)
    pub facets: Vec<String>,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Print the counts as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: FacetsArgs, context: &Context) -> Result<()> {
    let facets = parse_facets(&args.facets)?;
    let query = args.query.to_query(context.node()?)?;
    let search = context.search().await?;

    let counts = search
        .facets(&query, &facets)
        .await
        .context("Facet query failed")?;

    if args.json {
        return output::json_pretty(&counts);
    }
    for (facet, values) in &counts {
        println!("{}", facet.wire_name().bold());
        for value in values {
            println!("  {:<40} {}", value.value, value.count.to_string().dimmed());
        }
    }
    Ok(())
}
