use super::{table, CatalogStore, ITEMS_TABLE};
use crate::error::Result;
use crate::schema::{CatalogItem, CatalogRecord, Schema};
use sqlx::Row;

impl CatalogStore {
    // ── Bulk ────────────────────────────────────────────────────

    /// Delete everything from all four tables in one transaction.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for schema in Schema::ALL {
            sqlx::query(&format!("DELETE FROM {}", table(schema)))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&format!("DELETE FROM {ITEMS_TABLE}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete every record and item of one catalog in one transaction.
    pub async fn delete_catalog(&self, catalog: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for schema in Schema::ALL {
            sqlx::query(&format!("DELETE FROM {} WHERE catalog = ?1", table(schema)))
                .bind(catalog)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&format!("DELETE FROM {ITEMS_TABLE} WHERE catalog = ?1"))
            .bind(catalog)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ── Records ─────────────────────────────────────────────────

    /// Insert or replace a batch of records in one transaction.
    pub async fn upsert_records(&self, records: &[CatalogRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO {} (id, catalog, package, name, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                table(record.schema)
            ))
            .bind(&record.id)
            .bind(&record.catalog)
            .bind(&record.package)
            .bind(&record.name)
            .bind(serde_json::to_string(&record.body)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    /// Get a record by composite id.
    pub async fn get_record(&self, schema: Schema, id: &str) -> Result<Option<CatalogRecord>> {
        let row = sqlx::query(&format!(
            "SELECT id, catalog, package, name, body FROM {} WHERE id = ?1",
            table(schema)
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_record(schema, &r)).transpose()
    }

    /// All records of `schema` belonging to a fully-qualified package, in insertion order.
    pub async fn records_for_package(
        &self,
        schema: Schema,
        package: &str,
    ) -> Result<Vec<CatalogRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT id, catalog, package, name, body FROM {} WHERE package = ?1 ORDER BY rowid",
            table(schema)
        ))
        .bind(package)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|r| Self::row_to_record(schema, r)).collect()
    }

    /// Every stored package record, ordered by id.
    pub async fn packages(&self) -> Result<Vec<CatalogRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT id, catalog, package, name, body FROM {} ORDER BY id",
            table(Schema::Package)
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| Self::row_to_record(Schema::Package, r))
            .collect()
    }

    /// Number of records of `schema`.
    pub async fn count(&self, schema: Schema) -> Result<u64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table(schema)))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    fn row_to_record(schema: Schema, row: &sqlx::sqlite::SqliteRow) -> Result<CatalogRecord> {
        let body: String = row.try_get("body")?;
        Ok(CatalogRecord {
            id: row.try_get("id")?,
            schema,
            catalog: row.try_get("catalog")?,
            package: row.try_get("package")?,
            name: row.try_get("name")?,
            body: serde_json::from_str(&body)?,
        })
    }

    // ── Catalog items ───────────────────────────────────────────

    /// Insert or replace a derived catalog item.
    pub async fn upsert_item(&self, item: &CatalogItem) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {ITEMS_TABLE} (id, catalog, package, body)
             VALUES (?1, ?2, ?3, ?4)"
        ))
        .bind(&item.id)
        .bind(&item.catalog)
        .bind(&item.id)
        .bind(serde_json::to_string(item)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a catalog item by `catalog~package` id.
    pub async fn get_item(&self, id: &str) -> Result<Option<CatalogItem>> {
        let row = sqlx::query(&format!("SELECT body FROM {ITEMS_TABLE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_item(&r)).transpose()
    }

    /// Catalog items ordered by id, optionally limited to one catalog.
    pub async fn list_items(&self, catalog: Option<&str>) -> Result<Vec<CatalogItem>> {
        let rows = match catalog {
            Some(catalog) => {
                sqlx::query(&format!(
                    "SELECT body FROM {ITEMS_TABLE} WHERE catalog = ?1 ORDER BY id"
                ))
                .bind(catalog)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT body FROM {ITEMS_TABLE} ORDER BY id"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_item).collect()
    }

    /// Number of catalog items.
    pub async fn item_count(&self) -> Result<u64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {ITEMS_TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogItem> {
        let body: String = row.try_get("body")?;
        Ok(serde_json::from_str(&body)?)
    }
}
