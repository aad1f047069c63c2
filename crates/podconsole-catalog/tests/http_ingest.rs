//! Catalog ingestion over HTTP
//!
//! A local axum server plays the console backend: it serves chunked
//! JSON-Lines catalog feeds and the cluster catalog list.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use podconsole_catalog::config::{DEFAULT_CLUSTER_CATALOGS_PATH, DEFAULT_FEED_URL_TEMPLATE};
use podconsole_catalog::{
    CatalogConfig, CatalogIngestor, CatalogSource, CatalogStore, CatalogWatcher,
    DebouncedRefreshTrigger, HttpCatalogFeed, Schema,
};

const COMMUNITY_FEED: &str = concat!(
    r#"{"schema":"olm.package","name":"etcd","defaultChannel":"stable"}"#,
    "\n",
    r#"{"schema":"olm.channel","name":"stable","package":"etcd","entries":[{"name":"etcdoperator.v0.9.4"}]}"#,
    "\n",
    "this line is not json\n",
    r#"{"schema":"olm.bundle","name":"etcdoperator.v0.9.4","package":"etcd","properties":[{"type":"olm.package","value":{"packageName":"etcd","version":"0.9.4"}},{"type":"olm.csv.metadata","value":{"displayName":"etcd","provider":{"name":"CNCF"}}}]}"#,
    "\n",
);

/// Stream `body` in awkward 7-byte chunks
fn chunked(body: &'static str) -> Body {
    let chunks: Vec<Result<Bytes, Infallible>> = body
        .as_bytes()
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Body::from_stream(futures::stream::iter(chunks))
}

async fn feed(Path(catalog): Path<String>) -> Response {
    match catalog.as_str() {
        "community" => chunked(COMMUNITY_FEED).into_response(),
        _ => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn cluster_catalogs() -> Json<serde_json::Value> {
    Json(json!({
        "items": [
            {
                "metadata": {"name": "community"},
                "status": {"conditions": [{"type": "Serving", "status": "True"}]}
            },
            {
                "metadata": {"name": "unpacking"},
                "status": {"conditions": [{"type": "Serving", "status": "False"}]}
            }
        ]
    }))
}

async fn serve() -> String {
    let app = Router::new()
        .route("/api/catalogd/catalogs/:catalog/api/v1/all", get(feed))
        .route(DEFAULT_CLUSTER_CATALOGS_PATH, get(cluster_catalogs));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn ingestor(base: &str) -> CatalogIngestor {
    let config = CatalogConfig::default();
    let feed = HttpCatalogFeed::new(base, DEFAULT_FEED_URL_TEMPLATE)
        .with_max_line_length(config.line_limit());
    let store = CatalogStore::in_memory().await.unwrap();
    CatalogIngestor::new(store, Arc::new(feed), &config)
}

#[tokio::test]
async fn test_ingest_from_http_feed() {
    let base = serve().await;
    let ingestor = ingestor(&base).await;

    let report = ingestor
        .ingest(&[CatalogSource::new("community"), CatalogSource::new("missing")])
        .await
        .unwrap();

    assert_eq!(report.source("community").unwrap().records, 3);
    let missing = report.source("missing").unwrap();
    assert!(missing.error.as_deref().unwrap().contains("503"));

    let item = ingestor
        .store()
        .get_item("community~etcd")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.provider.as_deref(), Some("CNCF"));
    assert_eq!(item.channels["stable"], vec!["etcdoperator.v0.9.4"]);
    assert_eq!(ingestor.store().count(Schema::Bundle).await.unwrap(), 1);
}

#[tokio::test]
async fn test_watcher_lists_serving_catalogs() {
    let base = serve().await;
    let watcher = CatalogWatcher::new(&base, DEFAULT_CLUSTER_CATALOGS_PATH, Duration::from_secs(30));

    let sources = watcher.poll().await.unwrap();
    assert_eq!(sources, vec![CatalogSource::new("community")]);
}

#[tokio::test]
async fn test_watcher_drives_debounced_ingestion() {
    let base = serve().await;
    let ingestor = Arc::new(ingestor(&base).await);
    let trigger: DebouncedRefreshTrigger<Vec<CatalogSource>> =
        DebouncedRefreshTrigger::new(Duration::from_millis(50), ingestor.clone());
    let watcher = CatalogWatcher::new(&base, DEFAULT_CLUSTER_CATALOGS_PATH, Duration::from_millis(20));
    let cancel = CancellationToken::new();

    let run = {
        let cancel = cancel.clone();
        async move { watcher.run(&trigger, cancel).await }
    };
    let handle = tokio::spawn(run);

    let mut items = 0;
    for _ in 0..100 {
        items = ingestor.store().item_count().await.unwrap();
        if items > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(items, 1);
}
