// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity directory mapping external uuids to numeric storage ids.
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(test)]
mod tests;
mod traits;

use uuid::Uuid;

pub use traits::{IdentityStore, NameResolver};

/// Identity known to the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
}
