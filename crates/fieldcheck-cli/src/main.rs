//! fieldcheck CLI - operator tooling for offline checklist drafts
//!
//! Reads the same durable store the field app writes, so stuck drafts can be
//! inspected, retried or discarded from a terminal.

mod cli;
mod commands;
mod credentials;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::auth::run_auth;
use crate::commands::common::resolve_config;
use crate::commands::completions::run_completions;
use crate::commands::discard::run_discard;
use crate::commands::pending::run_pending;
use crate::commands::retry::run_retry;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::credentials::KeyringCredentialStore;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "fieldcheck=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|error| CliError::Logging(error.to_string()))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();
    let credentials = KeyringCredentialStore::default();

    match cli.command {
        Commands::Status { json } => {
            let config = resolve_config(cli.data_dir)?;
            run_status(&config, json).await?;
        }
        Commands::Pending { json } => {
            let config = resolve_config(cli.data_dir)?;
            run_pending(&config, json).await?;
        }
        Commands::Sync => {
            let config = resolve_config(cli.data_dir)?;
            run_sync(config, credentials).await?;
        }
        Commands::Retry { key } => {
            let config = resolve_config(cli.data_dir)?;
            run_retry(config, credentials, &key).await?;
        }
        Commands::Discard { key } => {
            let config = resolve_config(cli.data_dir)?;
            run_discard(&config, &key).await?;
        }
        Commands::Auth { command } => run_auth(command, &credentials)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
