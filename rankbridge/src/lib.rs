// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rank and permission resolution for a network of server processes sharing one database.
//!
//! A [`Node`] wires the pieces of one process together: the SQLite store, the
//! [`RankRegistry`] holding every rank definition, the [`ProfileCache`] of per-identity
//! [`RankProfile`]s and a background listener applying invalidations published by its peers.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use rankbridge::RankDefinition;
//! use uuid::Uuid;
//!
//! let node = rankbridge::builder()
//!     .database_url("sqlite://ranks.db")
//!     .exclude_rank("staff")
//!     .spawn()
//!     .await?;
//!
//! let vip = node
//!     .registry()
//!     .create_rank(RankDefinition::new("vip", "[VIP]").with_weight(10))
//!     .await?;
//! node.registry().set_permission(vip.id(), "chat.color", true, false).await?;
//!
//! let identity = node.register_identity(&Uuid::new_v4(), "panda").await?;
//! let profile = node.profile(&identity.uuid).await?;
//! profile.add_rank(vip.id()).await?;
//! assert!(profile.has_permission("chat.color"));
//! # Ok(())
//! # }
//! ```
mod builder;
mod config;
mod node;
#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use builder::NodeBuilder;
pub use config::{Config, DEFAULT_CHANNEL, DEFAULT_PROFILE_TTL_SECS};
pub use node::{Node, NodeError};
pub use rankbridge_bus::{InvalidationBus, MemoryTransport, Transport, TransportError};
pub use rankbridge_ranks::{
    PermissionNode, ProfileCache, ProfileError, Rank, RankDefinition, RankId, RankIdList,
    RankProfile, RankRegistry, RegistryError, ValidationError,
};
pub use rankbridge_store::{IdentityRecord, LoadError, NameResolver, SqliteStore, StoreError};

pub fn builder() -> NodeBuilder {
    Node::builder()
}

pub async fn spawn() -> Result<Node, NodeError> {
    Node::spawn().await
}
