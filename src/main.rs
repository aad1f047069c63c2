//! Podconsole - cluster console companion
//!
//! CLI entry point: pod exec terminals and the operator catalog.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod loader;

const DEFAULT_LOG_FILTER: &str = "podconsole=info,podconsole_terminal=info,podconsole_catalog=info";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let config = loader::load_config()?;
    let _guard = init_logging(&cli, &config)?;

    if cli.command.is_some() {
        info!("Starting podconsole v{}", env!("CARGO_PKG_VERSION"));
    }

    cli::run(cli, config).await
}

/// Install the global subscriber.
///
/// An attached terminal owns stdout and stderr, so `exec` logs to a daily
/// file instead. The returned guard flushes that file on drop.
fn init_logging(cli: &cli::Cli, config: &config::AppConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if cli.logs_to_file() {
        let directory = config.logging.resolved_directory();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
        let appender = tracing_appender::rolling::daily(directory, "podconsole.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
        return Ok(Some(guard));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(None)
}
