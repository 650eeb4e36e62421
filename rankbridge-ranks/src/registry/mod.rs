// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authoritative in-memory view of all rank definitions.
mod admin;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use rankbridge_bus::{BusMessage, InvalidationBus, MutationKind, PermissionMutation};
use rankbridge_store::{ASSIGNMENTS_TABLE, PERMISSIONS_TABLE, RANKS_TABLE, Store, StoreError};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::{IdentityId, RankId};
use crate::error::RegistryError;
use crate::rank::{PermissionNode, Permissions, Rank, RankDefinition, normalize_permission};

/// Process-local registry policy.
#[derive(Clone, Debug, Default)]
pub struct RegistryConfig {
    /// Names of ranks which are suppressed from normal resolution in this process. Only their
    /// forced permission nodes apply to identities owning them.
    pub excluded_ranks: HashSet<String>,
}

impl RegistryConfig {
    fn is_excluded(&self, name: &str) -> bool {
        self.excluded_ranks.contains(name)
    }
}

/// Result of applying a received permission mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Rank is excluded and the mutation does not touch a forced node.
    Ignored,
    UnknownRank,
}

#[derive(Default)]
struct RegistryState {
    by_name: HashMap<String, Rank>,
    by_id: HashMap<RankId, Rank>,
    excluded: HashMap<RankId, Rank>,
}

impl RegistryState {
    fn insert(&mut self, rank: Rank, config: &RegistryConfig) {
        let name = rank.name();
        if config.is_excluded(&name) {
            self.excluded.insert(rank.id(), rank);
        } else {
            self.by_id.insert(rank.id(), rank.clone());
            self.by_name.insert(name, rank);
        }
    }

    fn remove(&mut self, id: RankId) -> Option<Rank> {
        if let Some(rank) = self.excluded.remove(&id) {
            return Some(rank);
        }
        let rank = self.by_id.remove(&id)?;
        self.by_name.retain(|_, other| other.id() != id);
        Some(rank)
    }

    /// Active or excluded rank with this id.
    fn any(&self, id: RankId) -> Option<&Rank> {
        self.by_id.get(&id).or_else(|| self.excluded.get(&id))
    }

    fn name_taken(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
            || self.excluded.values().any(|rank| rank.read().name == name)
    }

    fn all(&self) -> impl Iterator<Item = &Rank> {
        self.by_id.values().chain(self.excluded.values())
    }
}

/// Registry of all rank definitions, loaded once and kept in sync with storage.
///
/// Lookups are answered from memory and never fail. Administrative operations write through to
/// storage first, mutate the in-memory definitions after the write succeeded and finally announce
/// the change on the invalidation bus so peer processes converge.
///
/// Cloned handles share the same registry.
pub struct RankRegistry<S> {
    inner: Arc<RegistryInner<S>>,
}

struct RegistryInner<S> {
    store: S,
    bus: InvalidationBus,
    config: RegistryConfig,
    state: RwLock<RegistryState>,
    /// Serializes administrative operations and reloads within this process.
    admin: Mutex<()>,
    /// Serializes rank assignment changes of one identity across all of its profile objects.
    writers: DashMap<IdentityId, Weak<Mutex<()>>>,
}

impl<S> Clone for RankRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> RankRegistry<S>
where
    S: Store,
{
    /// Creates the rank tables if needed and reads all definitions from storage.
    pub async fn load(
        store: S,
        bus: InvalidationBus,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        for table in [RANKS_TABLE, PERMISSIONS_TABLE, ASSIGNMENTS_TABLE] {
            store.create_table(&table).await?;
        }

        let definitions = read_definitions(&store).await?;
        let mut state = RegistryState::default();
        for definition in definitions {
            state.insert(Rank::new(definition), &config);
        }
        debug!(
            ranks = state.by_id.len(),
            excluded = state.excluded.len(),
            "loaded rank registry"
        );

        Ok(Self {
            inner: Arc::new(RegistryInner {
                store,
                bus,
                config,
                state: RwLock::new(state),
                admin: Mutex::new(()),
                writers: DashMap::new(),
            }),
        })
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Returns the rank with this id, excluded ranks are not visible here.
    pub fn rank(&self, id: RankId) -> Option<Rank> {
        self.inner.state.read().by_id.get(&id).cloned()
    }

    pub fn rank_by_name(&self, name: &str) -> Option<Rank> {
        self.inner.state.read().by_name.get(name).cloned()
    }

    /// Returns the rank with this id if it is excluded by the registry policy.
    pub fn excluded_rank(&self, id: RankId) -> Option<Rank> {
        self.inner.state.read().excluded.get(&id).cloned()
    }

    pub fn is_excluded(&self, id: RankId) -> bool {
        self.inner.state.read().excluded.contains_key(&id)
    }

    /// All active ranks ordered by id.
    pub fn ranks(&self) -> Vec<Rank> {
        sorted(self.inner.state.read().by_id.values().cloned())
    }

    /// Active ranks every identity holds implicitly, ordered by id.
    pub fn default_ranks(&self) -> Vec<Rank> {
        sorted(
            self.inner
                .state
                .read()
                .by_id
                .values()
                .filter(|rank| rank.is_default())
                .cloned(),
        )
    }

    pub fn excluded_ranks(&self) -> Vec<Rank> {
        sorted(self.inner.state.read().excluded.values().cloned())
    }

    /// Ancestors of a rank, closest first.
    ///
    /// The walk stops at the first parent which is not an active rank or which was visited
    /// before, so corrupted data with cycles terminates as well.
    pub fn parent_chain(&self, rank: &Rank) -> Vec<Rank> {
        let state = self.inner.state.read();
        let mut visited = HashSet::from([rank.id()]);
        let mut chain = Vec::new();
        let mut next = rank.parent();

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                warn!(rank_id = %rank.id(), %parent_id, "detected cycle in parent chain");
                break;
            }
            let Some(parent) = state.by_id.get(&parent_id) else {
                trace!(rank_id = %rank.id(), %parent_id, "parent chain ends at unknown rank");
                break;
            };
            next = parent.parent();
            chain.push(parent.clone());
        }

        chain
    }

    /// Own permission nodes of a rank merged with all inherited ones.
    ///
    /// Nodes of closer ranks win over nodes with the same key of more distant ancestors.
    pub fn all_permissions(&self, rank: &Rank) -> Permissions {
        let mut permissions = rank.permissions();
        for ancestor in self.parent_chain(rank) {
            for (key, node) in ancestor.permissions() {
                permissions.entry(key).or_insert(node);
            }
        }
        permissions
    }

    /// Returns the lock serializing assignment changes of this identity.
    ///
    /// Every profile of the identity created from this registry shares the same lock, also when
    /// the profile was replaced in a cache while an older one is still in use.
    pub(crate) fn identity_writer(&self, id: IdentityId) -> Arc<Mutex<()>> {
        let mut entry = self.inner.writers.entry(id).or_default();
        if let Some(writer) = entry.upgrade() {
            return writer;
        }
        let writer = Arc::new(Mutex::new(()));
        *entry = Arc::downgrade(&writer);
        writer
    }

    /// Forgets writer locks of identities without any live profile.
    pub(crate) fn prune_identity_writers(&self) {
        self.inner
            .writers
            .retain(|_, writer| writer.strong_count() > 0);
    }

    /// Re-reads all definitions from storage.
    ///
    /// Existing rank handles are updated in place so references held by profiles stay valid.
    /// Ranks which vanished from storage are retired.
    pub async fn reload(&self) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;
        let definitions = read_definitions(&self.inner.store).await?;

        let mut state = self.inner.state.write();
        let mut next = RegistryState::default();
        for definition in definitions {
            let Some(id) = definition.id else {
                continue;
            };
            let rank = match state.any(id) {
                Some(rank) => {
                    *rank.write() = definition;
                    rank.clone()
                }
                None => Rank::new(definition),
            };
            next.insert(rank, &self.inner.config);
        }

        for rank in state.all() {
            if next.any(rank.id()).is_none() {
                rank.retire();
            }
        }

        debug!(
            ranks = next.by_id.len(),
            excluded = next.excluded.len(),
            "reloaded rank registry"
        );
        *state = next;
        Ok(())
    }

    /// Applies a permission change announced by another process.
    ///
    /// Active ranks receive the same change the originating process applied. Changes to excluded
    /// ranks are only relevant for forced nodes: they apply when the node is or was forced or
    /// when the node gets removed, a node which stopped being forced is removed.
    pub fn apply_permission_mutation(&self, message: &PermissionMutation) -> MutationOutcome {
        let id = RankId::new(message.rank_id);
        let key = normalize_permission(&message.permission);
        let node = PermissionNode::new(&key, message.is_allowed, message.forced);

        let state = self.inner.state.read();

        if let Some(rank) = state.by_id.get(&id) {
            let mut definition = rank.write();
            match message.message_type {
                MutationKind::SetPermission => {
                    definition.permissions.insert(key, node);
                }
                MutationKind::RemovePermission => {
                    definition.permissions.remove(&key);
                }
            }
            trace!(rank_id = %id, permission = %message.permission, "applied permission mutation");
            return MutationOutcome::Applied;
        }

        let Some(rank) = state.excluded.get(&id) else {
            return MutationOutcome::UnknownRank;
        };

        let mut definition = rank.write();
        let was_forced = definition
            .permissions
            .get(&key)
            .is_some_and(|existing| existing.forced);

        match message.message_type {
            MutationKind::RemovePermission => {
                definition.permissions.remove(&key);
            }
            MutationKind::SetPermission if node.forced => {
                definition.permissions.insert(key, node);
            }
            MutationKind::SetPermission if was_forced => {
                definition.permissions.remove(&key);
            }
            MutationKind::SetPermission => return MutationOutcome::Ignored,
        }

        trace!(rank_id = %id, permission = %message.permission, "applied mutation to excluded rank");
        MutationOutcome::Applied
    }

    /// Publishes a message, failures are logged since the local change was already persisted.
    async fn announce<M: BusMessage>(&self, message: &M) {
        if let Err(err) = self.inner.bus.publish(message).await {
            warn!(message_type = M::TYPE, "could not announce change to peers: {err}");
        }
    }
}

impl<S> std::fmt::Debug for RankRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("RankRegistry")
            .field("ranks", &state.by_id.len())
            .field("excluded", &state.excluded.len())
            .finish()
    }
}

fn sorted(ranks: impl Iterator<Item = Rank>) -> Vec<Rank> {
    let mut ranks: Vec<Rank> = ranks.collect();
    ranks.sort_by_key(|rank| rank.id());
    ranks
}

/// Reads rank rows and permission rows and combines them into definitions.
async fn read_definitions<S: Store>(store: &S) -> Result<Vec<RankDefinition>, StoreError> {
    let records = store.ranks().await?;
    let permissions = store.permissions().await?;

    let mut definitions: BTreeMap<RankId, RankDefinition> = records
        .into_iter()
        .map(|record| (RankId::new(record.id), RankDefinition::from_record(record)))
        .collect();

    for record in permissions {
        let rank_id = RankId::new(record.rank_id);
        match definitions.get_mut(&rank_id) {
            Some(definition) => {
                let node = PermissionNode::from(record);
                definition.permissions.insert(node.permission.clone(), node);
            }
            None => {
                trace!(%rank_id, permission = %record.permission, "skipped orphaned permission node");
            }
        }
    }

    Ok(definitions.into_values().collect())
}
