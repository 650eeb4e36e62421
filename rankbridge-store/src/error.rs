// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite database and connection error.
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] sqlx::Error),

    /// Invalid, corrupted data was found in the database. This is a critical error.
    #[error("could not decode corrupted '{0}' value from database: {1}")]
    Decode(String, String),

    /// Database did not accept the insert, for example because of a violated unique constraint in
    /// the in-memory backend.
    #[error("constraint violated on table '{table}': {reason}")]
    Constraint { table: &'static str, reason: String },

    /// Backend is not reachable or refused to execute the statement.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}
