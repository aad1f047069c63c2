//! `podconsole catalog`: operator catalog commands

use anyhow::{Context, Result};
use clap::Subcommand;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use podconsole_catalog::{
    CatalogIngestor, CatalogItem, CatalogSource, CatalogStore, CatalogWatcher,
    DebouncedRefreshTrigger, HttpCatalogFeed, IngestReport,
};

use crate::config::AppConfig;

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Rebuild the local catalog store once
    Ingest {
        /// Catalogs to ingest (default: every serving cluster catalog)
        #[arg(long)]
        catalog: Vec<String>,
    },
    /// List catalog items
    List {
        /// Only items from this catalog
        #[arg(long)]
        catalog: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one catalog item by id (`catalog~package`)
    Show {
        id: String,
    },
    /// Keep the store in sync with the cluster until interrupted
    Watch,
}

pub async fn run(command: CatalogCommand, config: &AppConfig) -> Result<()> {
    match command {
        CatalogCommand::Ingest { catalog } => ingest(config, catalog).await,
        CatalogCommand::List { catalog, json } => list(config, catalog.as_deref(), json).await,
        CatalogCommand::Show { id } => show(config, &id).await,
        CatalogCommand::Watch => watch(config).await,
    }
}

async fn open_store(config: &AppConfig) -> Result<CatalogStore> {
    let path = config.catalog.resolved_db_path();
    CatalogStore::from_path(&path)
        .await
        .with_context(|| format!("Failed to open catalog store {}", path.display()))
}

fn watcher(config: &AppConfig) -> CatalogWatcher {
    CatalogWatcher::new(
        &config.cluster.base_url,
        &config.catalog.cluster_catalogs_path,
        config.catalog.poll_interval(),
    )
    .with_token(config.cluster.endpoint().token)
}

async fn ingestor(config: &AppConfig) -> Result<CatalogIngestor> {
    let feed = HttpCatalogFeed::new(&config.cluster.base_url, &config.catalog.feed_url_template)
        .with_token(config.cluster.endpoint().token)
        .with_max_line_length(config.catalog.line_limit());
    let store = open_store(config).await?;
    Ok(CatalogIngestor::new(store, Arc::new(feed), &config.catalog))
}

// ── Commands ────────────────────────────────────────────────────────

async fn ingest(config: &AppConfig, names: Vec<String>) -> Result<()> {
    let sources: Vec<CatalogSource> = if names.is_empty() {
        let discovered = watcher(config)
            .poll()
            .await
            .context("Failed to list cluster catalogs")?;
        info!(catalogs = discovered.len(), "Discovered serving catalogs");
        discovered
    } else {
        names.into_iter().map(CatalogSource::new).collect()
    };

    let ingestor = ingestor(config).await?;
    let report = ingestor.ingest(&sources).await?;
    print_report(&report);
    Ok(())
}

async fn list(config: &AppConfig, catalog: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let items = store.list_items(catalog).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No catalog items. Run `podconsole catalog ingest` first.");
        return Ok(());
    }
    println!("{:<40} {:<32} {:<14} {}", "ID", "NAME", "VERSION", "PROVIDER");
    for item in &items {
        println!(
            "{:<40} {:<32} {:<14} {}",
            item.id,
            item.display_name,
            item.latest_version.as_deref().unwrap_or("-"),
            item.provider.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn show(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let item = store
        .get_item(id)
        .await?
        .with_context(|| format!("No catalog item with id {id}"))?;
    print_item(&item);
    Ok(())
}

async fn watch(config: &AppConfig) -> Result<()> {
    let ingestor = Arc::new(ingestor(config).await?);
    let trigger: DebouncedRefreshTrigger<Vec<CatalogSource>> =
        DebouncedRefreshTrigger::new(config.catalog.debounce(), ingestor);
    let watcher = watcher(config);
    let cancel = CancellationToken::new();

    info!(
        url = watcher.list_url(),
        interval_secs = config.catalog.poll_interval_secs,
        "Watching cluster catalogs (Ctrl+C to stop)"
    );

    let run = watcher.run(&trigger, cancel.clone());
    tokio::pin!(run);
    tokio::select! {
        () = &mut run => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            cancel.cancel();
            run.await;
        }
    }

    trigger.shutdown();
    info!("Catalog watch stopped");
    Ok(())
}

// ── Output ──────────────────────────────────────────────────────────

fn print_report(report: &IngestReport) {
    for source in &report.sources {
        match &source.error {
            None => println!(
                "  ✓ {:<24} {} records, {} skipped",
                source.source, source.records, source.skipped
            ),
            Some(e) => println!("  ✗ {:<24} {}", source.source, e),
        }
    }
    println!(
        "{} records, {} items, {} packages skipped",
        report.records_written,
        report.items_derived,
        report.packages_skipped.len()
    );
    for (package, reason) in &report.packages_skipped {
        println!("  - {package}: {reason}");
    }
}

fn print_item(item: &CatalogItem) {
    let field = |label: &str, value: Option<&str>| {
        if let Some(value) = value {
            println!("{label:<18} {value}");
        }
    };

    field("ID", Some(&item.id));
    field("Name", Some(&item.display_name));
    field("Package", Some(&item.name));
    field("Catalog", Some(&item.catalog));
    field("Version", item.latest_version.as_deref());
    field("Provider", item.provider.as_deref());
    field("Capabilities", item.capabilities.as_deref());
    field("Repository", item.repository.as_deref());
    field("Image", item.container_image.as_deref());
    field("Support", item.support.as_deref());
    field("Created", item.created_at.as_deref());
    field("Default channel", item.default_channel.as_deref());
    if !item.categories.is_empty() {
        field("Categories", Some(&item.categories.join(", ")));
    }
    if !item.valid_subscription.is_empty() {
        field("Subscriptions", Some(&item.valid_subscription.join(", ")));
    }
    for (channel, entries) in &item.channels {
        println!("{:<18} {} ({} entries)", "Channel", channel, entries.len());
    }
    if let Some(description) = &item.description {
        println!();
        println!("{description}");
    }
}
