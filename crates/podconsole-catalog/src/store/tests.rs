use super::CatalogStore;
use crate::schema::{CatalogItem, CatalogRecord, IdScheme, Schema};
use serde_json::json;

async fn test_store() -> CatalogStore {
    CatalogStore::in_memory().await.unwrap()
}

fn record(catalog: &str, body: serde_json::Value) -> CatalogRecord {
    CatalogRecord::from_object(catalog, body, &IdScheme::default())
        .unwrap()
        .unwrap()
}

fn package(catalog: &str, name: &str) -> CatalogRecord {
    record(catalog, json!({"schema": "olm.package", "name": name}))
}

fn channel(catalog: &str, package: &str, name: &str) -> CatalogRecord {
    record(
        catalog,
        json!({"schema": "olm.channel", "name": name, "package": package, "entries": []}),
    )
}

#[tokio::test]
async fn test_upsert_and_get_record() {
    let store = test_store().await;
    let written = store
        .upsert_records(&[package("community", "etcd"), channel("community", "etcd", "stable")])
        .await
        .unwrap();
    assert_eq!(written, 2);

    let got = store
        .get_record(Schema::Channel, "community~etcd~stable")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.package, "community~etcd");
    assert_eq!(got.body["entries"], json!([]));

    assert!(store
        .get_record(Schema::Bundle, "community~etcd~stable")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_upsert_replaces_by_id() {
    let store = test_store().await;
    store.upsert_records(&[package("community", "etcd")]).await.unwrap();

    let mut updated = package("community", "etcd");
    updated.body["defaultChannel"] = json!("alpha");
    store.upsert_records(&[updated]).await.unwrap();

    assert_eq!(store.count(Schema::Package).await.unwrap(), 1);
    let got = store
        .get_record(Schema::Package, "community~etcd")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.body["defaultChannel"], "alpha");
}

#[tokio::test]
async fn test_same_name_in_two_catalogs() {
    let store = test_store().await;
    store
        .upsert_records(&[package("community", "etcd"), package("certified", "etcd")])
        .await
        .unwrap();

    let ids: Vec<String> = store
        .packages()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["certified~etcd", "community~etcd"]);
}

#[tokio::test]
async fn test_records_for_package_keeps_insertion_order() {
    let store = test_store().await;
    store
        .upsert_records(&[
            channel("community", "etcd", "stable"),
            channel("community", "etcd", "alpha"),
            channel("community", "other", "stable"),
        ])
        .await
        .unwrap();

    let names: Vec<String> = store
        .records_for_package(Schema::Channel, "community~etcd")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["stable", "alpha"]);
}

#[tokio::test]
async fn test_items_filter_by_catalog() {
    let store = test_store().await;
    for (catalog, name) in [("community", "etcd"), ("certified", "mongodb")] {
        store
            .upsert_item(&CatalogItem {
                id: IdScheme::package_id(catalog, name),
                catalog: catalog.into(),
                name: name.into(),
                display_name: name.into(),
                source: catalog.into(),
                ..CatalogItem::default()
            })
            .await
            .unwrap();
    }

    assert_eq!(store.item_count().await.unwrap(), 2);
    let community = store.list_items(Some("community")).await.unwrap();
    assert_eq!(community.len(), 1);
    assert_eq!(community[0].name, "etcd");

    let item = store.get_item("certified~mongodb").await.unwrap().unwrap();
    assert_eq!(item.catalog, "certified");
}

#[tokio::test]
async fn test_clear_all_empties_every_table() {
    let store = test_store().await;
    store
        .upsert_records(&[package("community", "etcd"), channel("community", "etcd", "stable")])
        .await
        .unwrap();
    store
        .upsert_item(&CatalogItem {
            id: "community~etcd".into(),
            ..CatalogItem::default()
        })
        .await
        .unwrap();

    store.clear_all().await.unwrap();

    for schema in Schema::ALL {
        assert_eq!(store.count(schema).await.unwrap(), 0);
    }
    assert_eq!(store.item_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_from_path_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("catalog.db");

    let store = CatalogStore::from_path(&path).await.unwrap();
    store.upsert_records(&[package("community", "etcd")]).await.unwrap();
    drop(store);

    let reopened = CatalogStore::from_path(&path).await.unwrap();
    assert_eq!(reopened.count(Schema::Package).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_catalog_leaves_other_catalogs() {
    let store = test_store().await;
    store
        .upsert_records(&[
            package("community", "etcd"),
            channel("community", "etcd", "stable"),
            package("certified", "etcd"),
        ])
        .await
        .unwrap();

    store.delete_catalog("community").await.unwrap();

    assert_eq!(store.count(Schema::Channel).await.unwrap(), 0);
    let ids: Vec<String> = store.packages().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["certified~etcd"]);
}
