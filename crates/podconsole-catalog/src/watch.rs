//! Cluster catalog watcher
//!
//! Polls the cluster catalog list and hands the set of serving catalogs to
//! the refresh trigger whenever it changes.

use serde_json::Value;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::refresh::DebouncedRefreshTrigger;
use crate::schema::CatalogSource;

/// Polls the cluster for serving catalogs
pub struct CatalogWatcher {
    client: reqwest::Client,
    list_url: String,
    token: Option<String>,
    interval: Duration,
    last: Option<Vec<CatalogSource>>,
}

impl CatalogWatcher {
    /// Create a watcher for `{base_url}{path}`
    #[must_use]
    pub fn new(base_url: &str, path: &str, interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            list_url: format!("{}{}", base_url.trim_end_matches('/'), path),
            token: None,
            interval,
            last: None,
        }
    }

    /// Send a bearer token with every poll
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// URL polled for the catalog list
    #[must_use]
    pub fn list_url(&self) -> &str {
        &self.list_url
    }

    /// Fetch the current serving catalogs
    #[instrument(skip(self), fields(url = %self.list_url))]
    pub async fn poll(&self) -> Result<Vec<CatalogSource>> {
        let mut request = self.client.get(&self.list_url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(Error::Http(format!("HTTP {}", resp.status())));
        }
        let list: Value = resp.json().await?;
        Ok(serving_sources(&list))
    }

    /// Remember `sources`; returns them if they differ from the previous poll
    pub fn observe(&mut self, sources: Vec<CatalogSource>) -> Option<Vec<CatalogSource>> {
        if self.last.as_ref() == Some(&sources) {
            return None;
        }
        self.last = Some(sources.clone());
        Some(sources)
    }

    /// Poll until cancelled, notifying `trigger` on every change
    pub async fn run(
        mut self,
        trigger: &DebouncedRefreshTrigger<Vec<CatalogSource>>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Catalog watcher stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.poll().await {
                Ok(sources) => {
                    if let Some(changed) = self.observe(sources) {
                        info!(catalogs = changed.len(), "Serving catalogs changed");
                        trigger.notify(changed);
                    }
                }
                Err(e) => warn!(code = e.code(), error = %e, "Catalog list poll failed"),
            }
        }
    }
}

/// Names of catalogs whose `Serving` condition is true, sorted
#[must_use]
pub fn serving_sources(list: &Value) -> Vec<CatalogSource> {
    let mut sources: Vec<CatalogSource> = list
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| is_serving(item))
                .filter_map(|item| item.pointer("/metadata/name").and_then(Value::as_str))
                .map(CatalogSource::new)
                .collect()
        })
        .unwrap_or_default();
    sources.sort();
    sources.dedup();
    sources
}

fn is_serving(item: &Value) -> bool {
    item.pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some("Serving")
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}
