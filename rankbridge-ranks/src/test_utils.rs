// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use rankbridge_bus::{BusSubscription, InvalidationBus, MemoryTransport};
use rankbridge_store::{IDENTITIES_TABLE, IdentityRecord, IdentityStore, MemoryStore, SchemaStore};
use uuid::Uuid;

use crate::registry::{RankRegistry, RegistryConfig};

pub const TEST_CHANNEL: &str = "rank-network";

/// Registry, storage and bus of one simulated process.
pub struct TestProcess {
    pub store: MemoryStore,
    pub transport: MemoryTransport,
    pub registry: RankRegistry<MemoryStore>,
}

impl TestProcess {
    /// Spawns a process with its own storage and bus.
    pub async fn new() -> Self {
        Self::with(MemoryStore::new(), MemoryTransport::new(), &[]).await
    }

    /// Spawns a process on shared storage and bus, excluding the given rank names.
    pub async fn with(store: MemoryStore, transport: MemoryTransport, excluded: &[&str]) -> Self {
        let bus = InvalidationBus::new(Arc::new(transport.clone()), TEST_CHANNEL);
        let config = RegistryConfig {
            excluded_ranks: excluded.iter().map(|name| name.to_string()).collect::<HashSet<_>>(),
        };
        let registry = RankRegistry::load(store.clone(), bus, config)
            .await
            .expect("registry loads from memory store");
        Self {
            store,
            transport,
            registry,
        }
    }

    pub async fn subscribe(&self) -> BusSubscription {
        self.registry
            .bus()
            .subscribe()
            .await
            .expect("memory transport subscribes")
    }

    /// Registers a new identity with a random uuid.
    pub async fn identity(&self, name: &str) -> IdentityRecord {
        self.store
            .create_table(&IDENTITIES_TABLE)
            .await
            .expect("identity table can be created");
        self.store
            .register_identity(&Uuid::new_v4(), name)
            .await
            .expect("identity can be registered")
    }
}
