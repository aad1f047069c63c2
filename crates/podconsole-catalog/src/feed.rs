//! Catalog feeds
//!
//! A feed turns a [`CatalogSource`] into a stream of decoded JSON objects.
//! [`HttpCatalogFeed`] streams the response body through
//! [`JsonLinesDecoder`] without buffering the whole document.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::jsonl::JsonLinesDecoder;
use crate::schema::CatalogSource;

/// Decoded feed objects; an `Err` item ends the feed
pub type ObjectStream = BoxStream<'static, Result<Value>>;

/// Source of catalog objects
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogFeed: Send + Sync {
    /// Open the feed of one catalog
    async fn open(&self, source: &CatalogSource) -> Result<ObjectStream>;
}

/// Feed fetched from the console's catalog proxy over HTTP
#[derive(Debug, Clone)]
pub struct HttpCatalogFeed {
    client: reqwest::Client,
    base_url: String,
    url_template: String,
    token: Option<String>,
    max_line_length: Option<usize>,
}

impl HttpCatalogFeed {
    /// Create a feed; `url_template` may use `{base}` and `{catalog}`
    #[must_use]
    pub fn new(base_url: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            url_template: url_template.into(),
            token: None,
            max_line_length: None,
        }
    }

    /// Send a bearer token with every request
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Discard feed lines longer than `max` bytes
    #[must_use]
    pub fn with_max_line_length(mut self, max: Option<usize>) -> Self {
        self.max_line_length = max;
        self
    }

    /// Feed URL for one catalog
    #[must_use]
    pub fn feed_url(&self, source: &CatalogSource) -> String {
        self.url_template
            .replace("{base}", self.base_url.trim_end_matches('/'))
            .replace("{catalog}", &urlencoding::encode(&source.name))
    }
}

#[async_trait]
impl CatalogFeed for HttpCatalogFeed {
    #[instrument(skip(self), fields(catalog = %source.name))]
    async fn open(&self, source: &CatalogSource) -> Result<ObjectStream> {
        let url = self.feed_url(source);
        debug!(url = %url, "Fetching catalog feed");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| Error::source_failed(&source.name, e))?;
        if !resp.status().is_success() {
            return Err(Error::source_failed(
                &source.name,
                format!("HTTP {}", resp.status()),
            ));
        }

        let body = resp.bytes_stream().map_err(std::io::Error::other);
        let decoder = match self.max_line_length {
            Some(max) => JsonLinesDecoder::with_max_line_length(max),
            None => JsonLinesDecoder::new(),
        };
        Ok(FramedRead::new(StreamReader::new(body), decoder).boxed())
    }
}
