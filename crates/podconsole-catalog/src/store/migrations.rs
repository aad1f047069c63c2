use super::{table, CatalogStore, ITEMS_TABLE};
use crate::error::Result;
use crate::schema::Schema;

impl CatalogStore {
    // ── Migrations ──────────────────────────────────────────────

    pub(crate) async fn run_migrations(&self) -> Result<()> {
        for schema in Schema::ALL {
            let name = table(schema);
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    id      TEXT PRIMARY KEY,
                    catalog TEXT NOT NULL,
                    package TEXT NOT NULL,
                    name    TEXT NOT NULL,
                    body    TEXT NOT NULL
                )"
            ))
            .execute(&self.pool)
            .await?;
            self.create_indexes(name).await?;
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {ITEMS_TABLE} (
                id      TEXT PRIMARY KEY,
                catalog TEXT NOT NULL,
                package TEXT NOT NULL,
                body    TEXT NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;
        self.create_indexes(ITEMS_TABLE).await?;

        Ok(())
    }

    async fn create_indexes(&self, name: &str) -> Result<()> {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_package ON {name}(package)"
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_catalog ON {name}(catalog)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
