//! Catalog pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::schema::IdScheme;

/// Default feed URL; `{base}` and `{catalog}` are substituted per source
pub const DEFAULT_FEED_URL_TEMPLATE: &str = "{base}/api/catalogd/catalogs/{catalog}/api/v1/all";

/// Default cluster catalog list path, relative to the console base URL
pub const DEFAULT_CLUSTER_CATALOGS_PATH: &str = "/apis/olm.operatorframework.io/v1/clustercatalogs";

/// Ingestion, refresh and storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Feed URL template with `{base}` and `{catalog}` placeholders
    #[serde(default = "default_feed_url_template")]
    pub feed_url_template: String,
    /// Path of the cluster catalog list endpoint
    #[serde(default = "default_cluster_catalogs_path")]
    pub cluster_catalogs_path: String,
    /// Quiet period before a refresh pass starts
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Sources fetched concurrently during one pass
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
    /// Records written per transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Longest accepted feed line in bytes (0 disables the limit)
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Seconds between two polls of the cluster catalog list
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// SQLite database path; defaults to the user data directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Composite id rules
    #[serde(default)]
    pub id_scheme: IdScheme,
}

fn default_feed_url_template() -> String {
    DEFAULT_FEED_URL_TEMPLATE.to_string()
}

fn default_cluster_catalogs_path() -> String {
    DEFAULT_CLUSTER_CATALOGS_PATH.to_string()
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_max_concurrent_sources() -> usize {
    4
}

fn default_batch_size() -> usize {
    500
}

fn default_max_line_length() -> usize {
    16 * 1024 * 1024
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            feed_url_template: default_feed_url_template(),
            cluster_catalogs_path: default_cluster_catalogs_path(),
            debounce_secs: default_debounce_secs(),
            max_concurrent_sources: default_max_concurrent_sources(),
            batch_size: default_batch_size(),
            max_line_length: default_max_line_length(),
            poll_interval_secs: default_poll_interval_secs(),
            db_path: None,
            id_scheme: IdScheme::default(),
        }
    }
}

impl CatalogConfig {
    /// Debounce window as a `Duration`
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// Poll interval as a `Duration`
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Line limit, `None` when disabled
    #[must_use]
    pub fn line_limit(&self) -> Option<usize> {
        (self.max_line_length > 0).then_some(self.max_line_length)
    }

    /// Database path, falling back to `<data dir>/podconsole/catalog.db`
    #[must_use]
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("podconsole")
                .join("catalog.db")
        })
    }
}
