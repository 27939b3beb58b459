//! Probe command implementation.

use anyhow::{Context as _, Result, bail};
use clap::Args;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Data URL to fetch
    pub url: String,
}

pub async fn run(args: ProbeArgs, context: &Context) -> Result<()> {
    let provider = context.provider()?;
    let loaded = provider
        .initialize_from_local_store()
        .await
        .context("Failed to load certificate")?;
    if !loaded && provider.certificate_info().await.is_none() {
        bail!("No stored certificate. Run 'esgf login' first.");
    }

    let response = provider
        .authenticated_connection(&args.url)
        .await
        .context("Authenticated request failed")?;

    output::success(&format!("{}", response.status()));
    output::field("URL", response.url().as_str());
    if let Some(length) = response.content_length() {
        output::field("Length", &length.to_string());
    }
    if let Some(content_type) = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
    {
        output::field("Content-Type", content_type);
    }
    Ok(())
}
