//! esgf - search ESGF index nodes, harvest dataset metadata into a local
//! store, and manage the delegated certificate used for data access.

mod cli;
mod commands;
mod config;
mod context;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use cli::Cli;
use context::Context;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    let outcome = match Context::load(&cli.global) {
        Ok(context) => commands::handle(cli.command, &context).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
