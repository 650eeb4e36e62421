// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for rank definitions, permission nodes, per-identity rank assignments and the
//! identity directory.
//!
//! Every process of a network talks to the same relational database. Storage is accessed through
//! a small set of traits, one per concern, which are implemented for concrete backends:
//!
//! - [`SchemaStore`]: idempotent creation of declared [`Table`]s
//! - [`RankStore`]: rank rows and their permission nodes
//! - [`AssignmentStore`]: which identity owns which rank
//! - [`IdentityStore`]: mapping of external identity uuids to numeric storage ids
//!
//! A SQLite implementation is provided in the form of a `SqliteStore` (`sqlite` feature) and an
//! in-memory one as `MemoryStore` (`memory` feature). Both are enabled by default.
//!
//! There are no transactions: every call is one statement on a pooled connection. Callers which
//! issue several writes in a row (for example deleting a rank and its dependent rows) need to
//! handle partial failure themselves.
//!
//! Loading of identity-bound entities goes through the [`EntityLoader`] which verifies the
//! required schema and binds the identity before handing over to entity-specific loading.
mod assignments;
mod error;
mod identities;
mod loader;
#[cfg(feature = "memory")]
pub mod memory;
mod ranks;
mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use assignments::AssignmentStore;
pub use error::StoreError;
pub use identities::{IdentityRecord, IdentityStore, NameResolver};
pub use loader::{EntityLoader, LoadError, LoadState};
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use ranks::{NewRankRecord, PermissionRecord, RankColumn, RankRecord, RankStore};
pub use schema::{
    ASSIGNMENTS_TABLE, IDENTITIES_TABLE, PERMISSIONS_TABLE, RANKS_TABLE, SchemaStore, Table,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStore, SqliteStoreBuilder};

/// Umbrella trait for a backend implementing every storage concern.
///
/// Higher layers (registry, profiles, caches) are generic over this trait and share one cloned
/// store handle between them.
pub trait Store:
    SchemaStore + RankStore + AssignmentStore + IdentityStore + Clone + Send + Sync + 'static
{
}

impl<T> Store for T where
    T: SchemaStore + RankStore + AssignmentStore + IdentityStore + Clone + Send + Sync + 'static
{
}
