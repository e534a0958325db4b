mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

// Re-export from lib for internal use
use tenant_migrator::{config, db, error, hierarchy, migrate, pipeline};

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenant_migrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(&cli)?;

    let found = match &cli.command {
        Commands::Status { format } => {
            cli::show_status(&config, format)?;
            true
        }
        Commands::Migrate { to } => {
            cli::run_migrate(&config, *to)?;
            true
        }
        Commands::Rollback { to } => {
            cli::run_rollback(&config, *to)?;
            true
        }
        Commands::Resolve { path, root, format } => {
            cli::resolve_path(&config, path, *root, format)?
        }
        Commands::PathOf { id } => cli::show_path_of(&config, *id)?,
        Commands::PartitionKey {
            parent_id,
            name,
            depth,
        } => {
            cli::show_partition_key(&config, *parent_id, name, *depth);
            true
        }
    };

    Ok(if found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
