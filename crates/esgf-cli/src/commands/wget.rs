//! Wget command implementation.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use super::query::QueryArgs;
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct WgetArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Write the script to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run(args: WgetArgs, context: &Context) -> Result<()> {
    let query = args.query.to_query(context.node()?)?;
    let search = context.search().await?;

    let script = search
        .client()
        .wget_script(&query)
        .await
        .context("Failed to fetch wget script")?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &script)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output::success(&format!("Wrote {}", path.display()));
        }
        None => print!("{}", script),
    }
    Ok(())
}
