//! Dataset command implementation.

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::{Value, json};

use esgf_core::DatasetRepository;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// Instance id of the dataset
    pub instance_id: String,

    /// Include the dataset's file records
    #[arg(long)]
    pub files: bool,
}

pub fn run(args: DatasetArgs, context: &Context) -> Result<()> {
    let store = context.store()?;
    let dataset = store
        .get(&args.instance_id)
        .context("Failed to read dataset")?
        .with_context(|| format!("Dataset '{}' has not been harvested", args.instance_id))?;

    let services: Vec<String> = dataset.services().iter().map(|s| s.to_string()).collect();
    let mut value = json!({
        "instance_id": dataset.instance_id(),
        "record": output::record_json(dataset.record()),
        "file_count": dataset.file_count(),
        "total_size": dataset.total_size(),
        "services": services,
    });
    if args.files {
        let files: Vec<Value> = dataset
            .files()
            .map(|file| output::record_json(file.record()))
            .collect();
        value["files"] = Value::from(files);
    }
    output::json_pretty(&value)
}
