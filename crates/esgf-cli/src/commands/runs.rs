//! Runs command implementation.

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;

use esgf_core::RunRepository;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct RunsArgs {
    /// Print full run snapshots as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: RunsArgs, context: &Context) -> Result<()> {
    let store = context.store()?;
    let run_ids = store.database().list_runs().context("Failed to list runs")?;
    if run_ids.is_empty() {
        eprintln!("{}", "No stored runs.".dimmed());
        return Ok(());
    }

    for run_id in run_ids {
        let Some(snapshot) = store.load_run(&run_id)? else {
            continue;
        };
        if args.json {
            output::json(&snapshot)?;
            continue;
        }
        let started = snapshot
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {:<10} {:<8} {:>6}/{:<6} {}",
            snapshot.run_id,
            output::status(snapshot.status).to_string(),
            snapshot.kind.to_string(),
            snapshot.processed,
            snapshot.total,
            started.dimmed()
        );
    }
    Ok(())
}
