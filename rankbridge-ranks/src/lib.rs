// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rank and permission resolution kept coherent across processes.
//!
//! The [`RankRegistry`] holds every rank definition of the shared database in memory and is the
//! only place where definitions get mutated. Every identity gets a [`RankProfile`] resolving its
//! assigned rank ids against the registry. Profiles are cached per identity by the
//! [`ProfileCache`].
//!
//! Changes are announced on the invalidation bus. The [`InvalidationListener`] applies
//! announcements of other processes to the local registry and cache:
//!
//! ```text
//!  process A                              process B
//! ┌────────────────┐   invalidation bus  ┌──────────────────────┐
//! │ RankRegistry   │ ──────────────────> │ InvalidationListener │
//! │ RankProfile    │                     │  ├─ RankRegistry     │
//! └────────────────┘                     │  └─ ProfileCache     │
//!                                        └──────────────────────┘
//! ```
//!
//! Consistency between processes is eventual. Lost messages are compensated by the expiry of
//! cached profiles.
pub mod cache;
mod error;
mod ids;
pub mod listener;
pub mod profile;
mod rank;
pub mod registry;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use cache::ProfileCache;
pub use error::{DeleteStep, ProfileError, RegistryError, ValidationError};
pub use ids::{IdentityId, ParseRankIdListError, RankId, RankIdList};
pub use listener::{InvalidationListener, MessageOutcome};
pub use profile::RankProfile;
pub use rank::{
    MAX_PREFIX_LEN, PermissionNode, Permissions, Rank, RankDefinition, WeakRank,
    normalize_permission,
};
pub use registry::{MutationOutcome, RankRegistry, RegistryConfig};
