// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StoreError;
use crate::memory::MemoryStore;
use crate::schema::{SchemaStore, Table};

impl SchemaStore for MemoryStore {
    async fn create_table(&self, table: &Table) -> Result<(), StoreError> {
        let mut state = self.state();
        state.begin_schema()?;
        state.tables.insert(table.name());
        Ok(())
    }
}
