//! Overwatch CLI entry point.

use anyhow::Result;
use clap::Parser;

use overwatch::cli::commands::{config, scopes};
use overwatch::cli::{Cli, Commands, ConfigCommands, ScopesCommands};
use overwatch::infrastructure::config::ConfigLoader;
use overwatch::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli).await {
        overwatch::cli::handle_error(err, cli.json);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&loaded.logging)?;

    match &cli.command {
        Commands::Scopes(ScopesCommands::List {
            kind,
            snapshot,
            limit,
        }) => {
            let path = snapshot
                .as_deref()
                .unwrap_or(&loaded.persistence.snapshot_path);
            scopes::handle_list(path, *kind, *limit, cli.json).await
        }
        Commands::Scopes(ScopesCommands::Show { kind, id, snapshot }) => {
            let path = snapshot
                .as_deref()
                .unwrap_or(&loaded.persistence.snapshot_path);
            scopes::handle_show(path, *kind, id, cli.json).await
        }
        Commands::Config(ConfigCommands::Show) => config::handle_show(loaded, cli.json),
        Commands::Config(ConfigCommands::Validate) => config::handle_validate(&loaded, cli.json),
    }
}
