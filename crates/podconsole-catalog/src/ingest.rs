//! Catalog ingestion
//!
//! One ingestion pass rebuilds the local store from scratch:
//!
//! 1. Clear every table, so catalogs that disappeared leave nothing behind.
//! 2. Fetch all sources with bounded concurrency and upsert their records in
//!    batched transactions. A failing source contributes nothing and does
//!    not stop the others.
//! 3. Derive one [`CatalogItem`] per stored package from its channels and
//!    its newest bundle.
//!
//! Only store failures abort a pass. Everything else ends up in the
//! returned [`IngestReport`].

use futures::StreamExt;
use semver::Version;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::feed::CatalogFeed;
use crate::schema::{
    property, CatalogItem, CatalogRecord, CatalogSource, IdScheme, Schema, CSV_METADATA_PROPERTY,
    PACKAGE_PROPERTY,
};
use crate::store::CatalogStore;

/// Annotation listing the subscriptions an operator is valid for
pub const VALID_SUBSCRIPTION_ANNOTATION: &str = "operators.openshift.io/valid-subscription";

/// Outcome of one source within a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    /// Catalog name
    pub source: String,
    /// Records stored for this source
    pub records: usize,
    /// Objects skipped (unknown schema, no CSV metadata, invalid)
    pub skipped: usize,
    /// Failure that dropped this source, if any
    pub error: Option<String>,
}

impl SourceOutcome {
    /// Whether the source was ingested
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Per-source outcomes, in completion order
    pub sources: Vec<SourceOutcome>,
    /// Records written across all sources
    pub records_written: usize,
    /// Catalog items derived
    pub items_derived: usize,
    /// Packages without an item, with the reason
    pub packages_skipped: Vec<(String, String)>,
}

impl IngestReport {
    /// Sources that failed
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.sources.iter().filter(|s| !s.is_ok())
    }

    /// Outcome for one source
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceOutcome> {
        self.sources.iter().find(|s| s.source == name)
    }
}

/// Rebuilds the catalog store from a set of sources
pub struct CatalogIngestor {
    store: CatalogStore,
    feed: Arc<dyn CatalogFeed>,
    ids: IdScheme,
    batch_size: usize,
    max_concurrent_sources: usize,
}

impl CatalogIngestor {
    /// Create an ingestor writing to `store`
    #[must_use]
    pub fn new(store: CatalogStore, feed: Arc<dyn CatalogFeed>, config: &CatalogConfig) -> Self {
        Self {
            store,
            feed,
            ids: config.id_scheme.clone(),
            batch_size: config.batch_size.max(1),
            max_concurrent_sources: config.max_concurrent_sources.max(1),
        }
    }

    /// Store this ingestor writes to
    #[must_use]
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Run one full ingestion pass
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn ingest(&self, sources: &[CatalogSource]) -> Result<IngestReport> {
        self.store.clear_all().await?;

        let mut seen = HashSet::new();
        let unique: Vec<&CatalogSource> = sources.iter().filter(|s| seen.insert(&s.name)).collect();

        let pending: Vec<_> = unique
            .into_iter()
            .map(|source| self.ingest_source(source))
            .collect();
        let outcomes: Vec<SourceOutcome> = futures::stream::iter(pending)
            .buffer_unordered(self.max_concurrent_sources)
            .collect()
            .await;

        let mut report = IngestReport {
            records_written: outcomes.iter().map(|o| o.records).sum(),
            sources: outcomes,
            ..IngestReport::default()
        };

        self.derive_items(&mut report).await?;

        info!(
            records = report.records_written,
            items = report.items_derived,
            failed_sources = report.failed_sources().count(),
            skipped_packages = report.packages_skipped.len(),
            "Catalog ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_source(&self, source: &CatalogSource) -> SourceOutcome {
        let mut outcome = SourceOutcome {
            source: source.name.clone(),
            records: 0,
            skipped: 0,
            error: None,
        };

        if let Err(e) = self.load_source(source, &mut outcome).await {
            warn!(catalog = %source.name, code = e.code(), error = %e, "Catalog source failed");
            // partial writes of a failed source are rolled back
            if let Err(e) = self.store.delete_catalog(&source.name).await {
                warn!(catalog = %source.name, error = %e, "Could not remove partial catalog");
            }
            outcome.records = 0;
            outcome.error = Some(e.to_string());
        }
        outcome
    }

    async fn load_source(&self, source: &CatalogSource, outcome: &mut SourceOutcome) -> Result<()> {
        let mut objects = self.feed.open(source).await?;
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(object) = objects.next().await {
            let body = object.map_err(|e| Error::source_failed(&source.name, e))?;
            match CatalogRecord::from_object(&source.name, body, &self.ids) {
                Ok(Ok(record)) => batch.push(record),
                Ok(Err(skip)) => {
                    debug!(catalog = %source.name, ?skip, "Skipping catalog object");
                    outcome.skipped += 1;
                }
                Err(e) => {
                    warn!(catalog = %source.name, error = %e, "Skipping invalid catalog object");
                    outcome.skipped += 1;
                }
            }
            if batch.len() >= self.batch_size {
                outcome.records += self.store.upsert_records(&batch).await?;
                batch.clear();
            }
        }
        outcome.records += self.store.upsert_records(&batch).await?;
        Ok(())
    }

    async fn derive_items(&self, report: &mut IngestReport) -> Result<()> {
        for package in self.store.packages().await? {
            let stored = match self.derive_item(&package).await {
                Ok(item) => self
                    .store
                    .upsert_item(&item)
                    .await
                    .map_err(|e| Error::derivation(&package.id, e)),
                Err(e) => Err(e),
            };
            match stored {
                Ok(()) => report.items_derived += 1,
                Err(e) => {
                    warn!(package = %package.id, error = %e, "Skipping catalog item");
                    report.packages_skipped.push((package.id.clone(), e.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn derive_item(&self, package: &CatalogRecord) -> Result<CatalogItem> {
        let channels = self
            .store
            .records_for_package(Schema::Channel, &package.package)
            .await
            .map_err(|e| Error::derivation(&package.id, e))?;
        let bundles = self
            .store
            .records_for_package(Schema::Bundle, &package.package)
            .await
            .map_err(|e| Error::derivation(&package.id, e))?;
        build_item(package, &channels, &bundles)
    }
}

/// Version of a bundle; missing or unparsable versions count as `0.0.0`
#[must_use]
pub fn bundle_version(bundle: &Value) -> Version {
    property(bundle, PACKAGE_PROPERTY)
        .and_then(|p| p.get("version"))
        .and_then(Value::as_str)
        .and_then(|v| Version::parse(v.trim_start_matches('v')).ok())
        .unwrap_or_else(|| Version::new(0, 0, 0))
}

/// Bundle with the highest version
#[must_use]
pub fn newest_bundle(bundles: &[CatalogRecord]) -> Option<&CatalogRecord> {
    bundles.iter().max_by(|a, b| bundle_version(&a.body).cmp(&bundle_version(&b.body)))
}

/// Build the catalog item for a package from its channels and bundles
pub fn build_item(
    package: &CatalogRecord,
    channels: &[CatalogRecord],
    bundles: &[CatalogRecord],
) -> Result<CatalogItem> {
    let newest = newest_bundle(bundles)
        .ok_or_else(|| Error::derivation(&package.id, "no bundle with CSV metadata"))?;
    let csv = property(&newest.body, CSV_METADATA_PROPERTY)
        .ok_or_else(|| Error::derivation(&package.id, "newest bundle lost its CSV metadata"))?;
    let annotations = csv.get("annotations");
    let annotation = |key: &str| {
        annotations
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let channels: BTreeMap<String, Vec<String>> = channels
        .iter()
        .map(|channel| {
            let entries = channel
                .body
                .get("entries")
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|e| e.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            (channel.name.clone(), entries)
        })
        .collect();

    let latest_version = property(&newest.body, PACKAGE_PROPERTY)
        .and_then(|p| p.get("version"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(CatalogItem {
        id: package.id.clone(),
        catalog: package.catalog.clone(),
        name: package.name.clone(),
        display_name: csv
            .get("displayName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(&package.name)
            .to_string(),
        default_channel: package
            .body
            .get("defaultChannel")
            .and_then(Value::as_str)
            .map(str::to_string),
        channels,
        latest_version,
        description: annotation("description").or_else(|| {
            csv.get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
        }),
        provider: csv
            .get("provider")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        categories: annotation("categories")
            .map(|c| split_list(&c))
            .unwrap_or_default(),
        capabilities: annotation("capabilities"),
        keywords: csv
            .get("keywords")
            .and_then(Value::as_array)
            .map(|k| {
                k.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        icon: icon_data_uri(&package.body),
        repository: annotation("repository"),
        container_image: annotation("containerImage"),
        support: annotation("support"),
        created_at: annotation("createdAt"),
        valid_subscription: annotation(VALID_SUBSCRIPTION_ANNOTATION)
            .map(|v| parse_subscriptions(&v))
            .unwrap_or_default(),
        source: package.catalog.clone(),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The annotation is a JSON array in well-formed catalogs, a plain list otherwise
fn parse_subscriptions(value: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(value).unwrap_or_else(|_| split_list(value))
}

fn icon_data_uri(package: &Value) -> Option<String> {
    let icon = package.get("icon")?;
    let data = icon.get("base64data").and_then(Value::as_str)?;
    let media_type = icon.get("mediatype").and_then(Value::as_str)?;
    if data.is_empty() || media_type.is_empty() {
        return None;
    }
    Some(format!("data:{media_type};base64,{data}"))
}
