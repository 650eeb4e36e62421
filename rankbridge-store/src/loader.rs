// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline loading identity-bound entities from storage.
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::StoreError;
use crate::identities::{IdentityRecord, IdentityStore};
use crate::schema::{IDENTITIES_TABLE, SchemaStore, Table};

/// Stages of loading an entity.
///
/// ```text
/// Init --> SchemaVerified --> IdentityBound --> Loaded
///   \            \                  \
///    `------------`------------------`-------> Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Init,
    SchemaVerified,
    IdentityBound,
    Loaded,
    Failed,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not verify table '{table}': {source}")]
    Schema {
        table: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("identity {0} is not registered")]
    IdentityNotFound(Uuid),

    #[error("could not look up identity {uuid}: {source}")]
    IdentityLookup {
        uuid: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("could not load entity: {0}")]
    Entity(#[source] StoreError),
}

impl LoadError {
    /// Last stage which was successfully reached before loading failed.
    pub fn stage(&self) -> LoadState {
        match self {
            LoadError::Schema { .. } => LoadState::Init,
            LoadError::IdentityNotFound(_) | LoadError::IdentityLookup { .. } => {
                LoadState::SchemaVerified
            }
            LoadError::Entity(_) => LoadState::IdentityBound,
        }
    }
}

/// Loads entities bound to an identity.
///
/// Loading an entity passes three stages: all tables the entity declares (and the identity
/// directory) are created if missing, then the identity is looked up, finally the entity-specific
/// callback runs with the bound identity. If the identity can not be bound the callback is never
/// invoked.
///
/// Tables which were verified once are remembered and not created again by the same loader or
/// any of its clones.
#[derive(Clone, Debug)]
pub struct EntityLoader<S> {
    store: S,
    verified: Arc<Mutex<HashSet<&'static str>>>,
}

impl<S> EntityLoader<S>
where
    S: SchemaStore + IdentityStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            verified: Arc::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates all given tables which were not verified by this loader before.
    pub async fn verify_schema(&self, tables: &[Table]) -> Result<(), LoadError> {
        for table in tables {
            if self.verified.lock().contains(table.name()) {
                continue;
            }

            self.store
                .create_table(table)
                .await
                .map_err(|source| LoadError::Schema {
                    table: table.name(),
                    source,
                })?;

            trace!(table = table.name(), "verified table");
            self.verified.lock().insert(table.name());
        }
        Ok(())
    }

    /// Runs the loading pipeline for the identity with the given uuid.
    pub async fn load<T, F, Fut>(
        &self,
        tables: &[Table],
        uuid: &Uuid,
        callback: F,
    ) -> Result<T, LoadError>
    where
        F: FnOnce(IdentityRecord) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let result = self.run(tables, uuid, callback).await;
        if let Err(err) = &result {
            warn!(
                identity = %uuid,
                stage = ?err.stage(),
                state = ?LoadState::Failed,
                "entity loading failed: {err}"
            );
        }
        result
    }

    async fn run<T, F, Fut>(&self, tables: &[Table], uuid: &Uuid, callback: F) -> Result<T, LoadError>
    where
        F: FnOnce(IdentityRecord) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        trace!(identity = %uuid, state = ?LoadState::Init, "entity loading");

        self.verify_schema(tables).await?;
        self.verify_schema(&[IDENTITIES_TABLE]).await?;
        trace!(identity = %uuid, state = ?LoadState::SchemaVerified, "entity loading");

        let identity = self
            .store
            .identity_by_uuid(uuid)
            .await
            .map_err(|source| LoadError::IdentityLookup {
                uuid: *uuid,
                source,
            })?
            .ok_or(LoadError::IdentityNotFound(*uuid))?;
        trace!(
            identity = %uuid,
            identity_id = identity.id,
            state = ?LoadState::IdentityBound,
            "entity loading"
        );

        let entity = callback(identity).await.map_err(LoadError::Entity)?;
        trace!(identity = %uuid, state = ?LoadState::Loaded, "entity loading");

        Ok(entity)
    }
}
