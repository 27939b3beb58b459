//! Login command implementation.

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;

use esgf_auth::Credentials;

use super::cert_info::print_certificate;
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// OpenID identity URL
    #[arg(long, env = "ESGF_OPENID")]
    pub openid: String,

    /// Password for the identity
    #[arg(long, env = "ESGF_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn run(args: LoginArgs, context: &Context) -> Result<()> {
    let provider = context.provider()?;
    let credentials = Credentials::new(args.openid, args.password);

    eprintln!("{}", "Requesting certificate...".dimmed());
    provider
        .initialize_from_identity(credentials)
        .await
        .context("Failed to obtain certificate")?;

    output::success("Certificate stored");
    println!();
    output::field("Store", &provider.store().root().display().to_string());
    if let Some(info) = provider.certificate_info().await {
        print_certificate(&info, provider.remaining_validity().await);
    }
    Ok(())
}
