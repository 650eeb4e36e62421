// SPDX-License-Identifier: MIT OR Apache-2.0

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use traits::SchemaStore;

/// Declaration of a table an entity depends on.
///
/// Tables are created with `CREATE TABLE IF NOT EXISTS`, running the statement against an
/// existing database is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Table {
    name: &'static str,
    columns: &'static str,
}

impl Table {
    pub const fn new(name: &'static str, columns: &'static str) -> Self {
        Self { name, columns }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn columns(&self) -> &'static str {
        self.columns
    }

    /// Idempotent DDL statement creating this table.
    pub fn create_statement(&self) -> String {
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.name, self.columns)
    }
}

/// Rank definitions.
pub const RANKS_TABLE: Table = Table::new(
    "ranks",
    "
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rank_name TEXT NOT NULL UNIQUE,
    long_prefix TEXT NOT NULL,
    short_prefix TEXT,
    weight INTEGER NOT NULL DEFAULT 0,
    parent_rank INTEGER,
    is_default INTEGER NOT NULL DEFAULT 0
    ",
);

/// Permission nodes owned by a rank.
pub const PERMISSIONS_TABLE: Table = Table::new(
    "permission_nodes",
    "
    rank_id INTEGER NOT NULL,
    permission TEXT NOT NULL,
    allowed INTEGER NOT NULL,
    forced INTEGER NOT NULL DEFAULT 0,
    UNIQUE (rank_id, permission),
    FOREIGN KEY (rank_id) REFERENCES ranks(id)
    ",
);

/// Ranks assigned to an identity.
pub const ASSIGNMENTS_TABLE: Table = Table::new(
    "player_ranks",
    "
    player_id INTEGER NOT NULL,
    rank_id INTEGER NOT NULL,
    UNIQUE (player_id, rank_id),
    FOREIGN KEY (rank_id) REFERENCES ranks(id)
    ",
);

/// Identity directory, maps external uuids to numeric ids.
pub const IDENTITIES_TABLE: Table = Table::new(
    "users",
    "
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
    ",
);
