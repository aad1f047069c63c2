//! CLI module for podconsole
//!
//! Provides commands:
//! - `exec`: attach the local terminal to a container shell
//! - `catalog`: ingest, browse and watch operator catalogs

use clap::{Parser, Subcommand};

use crate::config::AppConfig;

pub mod catalog;
pub mod exec;

/// Podconsole CLI
#[derive(Parser, Debug)]
#[command(name = "podconsole")]
#[command(about = "Cluster console companion: pod terminals and operator catalogs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open an interactive terminal in a container
    Exec(exec::ExecArgs),
    /// Operator catalog commands
    #[command(subcommand)]
    Catalog(catalog::CatalogCommand),
}

impl Cli {
    /// Whether logs must stay off the terminal
    pub fn logs_to_file(&self) -> bool {
        matches!(self.command, Some(Commands::Exec(_)))
    }
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Exec(args)) => exec::run(args, &config).await,
        Some(Commands::Catalog(command)) => catalog::run(command, &config).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
