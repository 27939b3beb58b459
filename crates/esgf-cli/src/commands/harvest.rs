//! Harvest command implementation.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{Args, ValueEnum};
use colored::Colorize;

use esgf_core::{Error, HarvestKind, HarvestStatus, RunRepository, RunSnapshot};
use esgf_harvest::{HarvestObserver, HarvestServices, Harvester, Progress, SearchCollector};

use super::query::QueryArgs;
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct HarvestArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// What to collect for each dataset (defaults to the resumed run's kind)
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Resume a stored run instead of starting a new one
    #[arg(long, value_name = "RUN_ID")]
    pub resume: Option<String>,

    /// Check each dataset's HTTP access with the stored certificate
    #[arg(long)]
    pub probe: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Datasets,
    Files,
}

impl From<KindArg> for HarvestKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Datasets => HarvestKind::Datasets,
            KindArg::Files => HarvestKind::Files,
        }
    }
}

/// Prints one line per finished dataset.
struct ProgressPrinter;

impl HarvestObserver for ProgressPrinter {
    fn on_progress(&self, progress: &Progress) {
        if progress.status.is_terminal() {
            eprintln!(
                "{} {} {}",
                format!("[{}/{}]", progress.processed, progress.total).dimmed(),
                output::status(progress.status),
                progress.instance_id
            );
        }
    }

    fn on_error(&self, _snapshot: &RunSnapshot, error: &Error) {
        eprintln!("{} {}", "✗".red(), error);
    }
}

pub async fn run(args: HarvestArgs, context: &Context) -> Result<()> {
    let search = Arc::new(context.search().await?);
    let store = Arc::new(context.store()?);

    let mut collector = SearchCollector::new(search.clone());
    if args.probe {
        let provider = context.provider()?;
        let valid = provider
            .initialize_from_local_store()
            .await
            .context("Failed to load certificate")?;
        if !valid {
            bail!("No valid certificate. Run 'esgf login' first.");
        }
        collector = collector.with_probe(Arc::new(provider));
    }

    let services = HarvestServices::new(search, Arc::new(collector), store.clone(), context.engine())
        .with_runs(store.clone());

    let (harvester, default_kind) = match &args.resume {
        Some(run_id) => {
            let snapshot = store
                .load_run(run_id)
                .context("Failed to load run")?
                .with_context(|| format!("No stored run '{}'", run_id))?;
            let kind = snapshot.kind;
            (Harvester::restore(snapshot, services), kind)
        }
        None => {
            let query = args.query.to_query(context.node()?)?;
            (Harvester::new(query, services), HarvestKind::Datasets)
        }
    };
    harvester.add_observer(Arc::new(ProgressPrinter));

    let kind = args.kind.map(HarvestKind::from).unwrap_or(default_kind);
    harvester.start(kind).context("Failed to start harvest")?;
    output::field("Run", harvester.run_id());

    let snapshot = tokio::select! {
        snapshot = harvester.wait() => snapshot,
        _ = tokio::signal::ctrl_c() => {
            harvester.pause().context("Failed to pause harvest")?;
            output::warning(&format!(
                "Paused. Resume with 'esgf harvest --resume {}'",
                harvester.run_id()
            ));
            harvester.snapshot()
        }
    };

    println!();
    output::field("Status", &output::status(snapshot.status).to_string());
    output::field("Datasets", &snapshot.total.to_string());
    output::field(
        "Completed",
        &snapshot.count(HarvestStatus::Completed).to_string(),
    );
    output::field("Failed", &snapshot.count(HarvestStatus::Failed).to_string());

    if snapshot.status == HarvestStatus::Failed {
        bail!("Harvest failed");
    }
    Ok(())
}
