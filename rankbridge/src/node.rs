// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use rankbridge_bus::{BusError, IdentityInvalidation, InvalidationBus, Transport};
use rankbridge_ranks::{
    InvalidationListener, ProfileCache, RankProfile, RankRegistry, RegistryConfig, RegistryError,
};
use rankbridge_store::{
    IDENTITIES_TABLE, IdentityRecord, IdentityStore, LoadError, NameResolver, SchemaStore,
    SqliteStore, SqliteStoreBuilder, StoreError,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
pub use crate::builder::NodeBuilder;

/// Lower bound for the interval in which expired profiles are purged.
const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// One process of a rank network.
///
/// Owns the database pool, the rank registry and the profile cache, and listens for invalidations
/// of its peers in a background task. Background tasks stop when the node is dropped.
pub struct Node {
    config: Config,
    store: SqliteStore,
    registry: RankRegistry<SqliteStore>,
    cache: ProfileCache<SqliteStore>,
    name_resolver: Option<Arc<dyn NameResolver>>,
    listener: JoinHandle<()>,
    purge: JoinHandle<()>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Node {
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    /// Spawns a node on a private in-memory database which only talks to itself.
    pub async fn spawn() -> Result<Self, NodeError> {
        NodeBuilder::new().spawn().await
    }

    pub(crate) async fn spawn_inner(
        config: Config,
        transport: Arc<dyn Transport>,
        name_resolver: Option<Arc<dyn NameResolver>>,
    ) -> Result<Self, NodeError> {
        if config.profile_ttl == 0 {
            return Err(NodeError::InvalidConfig(
                "profile ttl needs to be at least one second".into(),
            ));
        }

        let store = SqliteStoreBuilder::new()
            .database_url(&config.database_url)
            .max_connections(config.max_connections)
            .build()
            .await?;
        store.create_table(&IDENTITIES_TABLE).await?;

        let bus = InvalidationBus::new(transport, config.channel.clone());
        let registry = RankRegistry::load(
            store.clone(),
            bus,
            RegistryConfig {
                excluded_ranks: config.excluded_ranks.clone(),
            },
        )
        .await?;
        let cache = ProfileCache::new(registry.clone(), config.profile_ttl());

        let listener = InvalidationListener::new(registry.clone(), cache.clone())
            .spawn()
            .await?;
        let purge = tokio::spawn(purge_expired(
            cache.clone(),
            config.profile_ttl().max(MIN_PURGE_INTERVAL),
        ));

        info!(
            channel = %config.channel,
            ranks = registry.ranks().len(),
            "spawned rank node"
        );

        Ok(Node {
            config,
            store,
            registry,
            cache,
            name_resolver,
            listener,
            purge,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn registry(&self) -> &RankRegistry<SqliteStore> {
        &self.registry
    }

    pub fn cache(&self) -> &ProfileCache<SqliteStore> {
        &self.cache
    }

    pub fn bus(&self) -> &InvalidationBus {
        self.registry.bus()
    }

    /// Registers an identity or updates its display name.
    ///
    /// Renaming a known identity drops its cached profile here and tells peers to do the same.
    pub async fn register_identity(
        &self,
        uuid: &Uuid,
        name: &str,
    ) -> Result<IdentityRecord, NodeError> {
        let previous = self.store.identity_by_uuid(uuid).await?;
        let identity = self.store.register_identity(uuid, name).await?;

        if previous.is_some_and(|previous| previous.name != identity.name) {
            debug!(identity = %uuid, %name, "renamed identity");
            self.cache.invalidate(uuid);
            if let Err(err) = self.bus().publish(&IdentityInvalidation { uuid: *uuid }).await {
                warn!(identity = %uuid, "could not announce renamed identity: {err}");
            }
        }

        Ok(identity)
    }

    /// Returns the rank profile of a registered identity.
    pub async fn profile(&self, uuid: &Uuid) -> Result<Arc<RankProfile<SqliteStore>>, NodeError> {
        Ok(self.cache.get(uuid).await?)
    }

    /// Resolves a display name through the configured [`NameResolver`] and returns the profile
    /// of the identity behind it.
    ///
    /// Returns `None` when the name could not be resolved or the identity was never registered.
    pub async fn profile_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Arc<RankProfile<SqliteStore>>>, NodeError> {
        let resolver = self
            .name_resolver
            .as_ref()
            .ok_or(NodeError::NameResolverMissing)?;
        let Some(uuid) = resolver.resolve(name).await else {
            debug!(%name, "could not resolve name");
            return Ok(None);
        };

        match self.cache.get(&uuid).await {
            Ok(profile) => Ok(Some(profile)),
            Err(LoadError::IdentityNotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Stops background tasks and closes the database pool.
    pub async fn shutdown(self) {
        self.listener.abort();
        self.purge.abort();
        self.store.close().await;
        debug!("shut down rank node");
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.listener.abort();
        self.purge.abort();
    }
}

async fn purge_expired(cache: ProfileCache<SqliteStore>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let purged = cache.purge_expired();
        if purged > 0 {
            debug!(purged, "purged expired profiles");
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("no name resolver configured")]
    NameResolverMissing,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
