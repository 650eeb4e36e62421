// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StoreError;
use crate::schema::Table;

/// Interface for creating the tables entities depend on.
pub trait SchemaStore {
    /// Create the table if it does not exist yet.
    ///
    /// Returns an error when the statement could not be executed, callers should consider the
    /// system malfunctioning in that case.
    fn create_table(&self, table: &Table) -> impl Future<Output = Result<(), StoreError>> + Send;
}
