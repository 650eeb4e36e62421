// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::query;

use crate::StoreError;
use crate::schema::{SchemaStore, Table};
use crate::sqlite::SqliteStore;

impl SchemaStore for SqliteStore {
    async fn create_table(&self, table: &Table) -> Result<(), StoreError> {
        query(&table.create_statement())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
