//! CatalogStore: SQLite persistence for ingested catalog data.
//!
//! Four tables: one per stored schema plus the derived catalog items. Each
//! is keyed by composite id and indexed on `package` and `catalog`.

use crate::error::{Error, Result};
use crate::schema::Schema;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

mod crud;
mod migrations;

#[cfg(test)]
mod tests;

/// Table holding derived catalog items
pub(crate) const ITEMS_TABLE: &str = "catalog_items";

/// Table holding objects of `schema`
pub(crate) fn table(schema: Schema) -> &'static str {
    match schema {
        Schema::Package => "olm_packages",
        Schema::Channel => "olm_channels",
        Schema::Bundle => "olm_bundles",
    }
}

/// SQLite-backed catalog store.
#[derive(Clone)]
pub struct CatalogStore {
    pub(crate) pool: SqlitePool,
}

impl CatalogStore {
    /// Open (or create) a catalog store at the given path.
    pub async fn from_path(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Internal(format!("mkdir: {e}")))?;
        }
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Catalog store initialized at {}", db_path.display());
        Ok(store)
    }

    /// In-memory store (for tests).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        debug!("In-memory catalog store initialized");
        Ok(store)
    }
}
