//! Certificate info command implementation.

use anyhow::{Context as _, Result, bail};
use chrono::Duration;
use clap::Args;
use colored::Colorize;

use esgf_auth::CertificateInfo;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct CertInfoArgs {}

pub async fn run(_args: CertInfoArgs, context: &Context) -> Result<()> {
    let provider = context.provider()?;
    provider
        .initialize_from_local_store()
        .await
        .context("Failed to load certificate")?;

    let Some(info) = provider.certificate_info().await else {
        bail!("No stored certificate. Run 'esgf login' first.");
    };
    print_certificate(&info, provider.remaining_validity().await);
    Ok(())
}

pub fn print_certificate(info: &CertificateInfo, remaining: Duration) {
    output::field("Subject", &info.subject);
    output::field("Valid from", &info.not_before.to_rfc3339());
    output::field("Valid until", &info.not_after.to_rfc3339());
    let state = if info.valid {
        format!(
            "valid for {}h {}m",
            remaining.num_hours(),
            remaining.num_minutes() % 60
        )
        .green()
    } else {
        "expired".red()
    };
    output::field("Status", &state.to_string());
}
