// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ranks assigned to identities.
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use traits::AssignmentStore;
