// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolved view of the ranks and permissions one identity holds.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rankbridge_bus::ProfileInvalidation;
use rankbridge_store::{IdentityRecord, Store, StoreError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::ProfileError;
use crate::rank::{PermissionNode, Permissions, Rank, WeakRank, normalize_permission};
use crate::registry::RankRegistry;
use crate::{IdentityId, RankId, RankIdList};

/// Derived state, rebuilt from the raw rank ids whenever they change.
#[derive(Default)]
struct ProfileState {
    /// Rank ids as persisted for this identity.
    raw: RankIdList,
    /// Owned active ranks, including every default rank.
    ranks: Vec<WeakRank>,
    /// Ranks confirmed to be ancestors of an owned rank.
    confirmed_ancestors: HashSet<RankId>,
    /// Assigned ranks which are excluded by the registry policy.
    excluded: Vec<WeakRank>,
}

/// Ranks and permissions of one identity.
///
/// The persisted rank ids are the source of truth, everything else is resolved against the
/// registry and can be rebuilt at any time. References into the registry are weak: ranks deleted
/// later simply stop contributing.
///
/// Mutations are serialized per identity: all profile objects of one identity created from the
/// same registry wait for each other, and every mutation re-reads the assignments from storage
/// before checking ownership. Reads never wait for storage.
pub struct RankProfile<S> {
    identity: IdentityRecord,
    registry: RankRegistry<S>,
    state: RwLock<ProfileState>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl<S> RankProfile<S>
where
    S: Store,
{
    /// Reads the assigned rank ids of the identity from storage and resolves them.
    pub async fn load(
        registry: RankRegistry<S>,
        identity: IdentityRecord,
    ) -> Result<Self, StoreError> {
        let raw = read_assignments(&registry, &identity).await?;
        trace!(identity = %identity.uuid, ranks = %raw, "loaded rank assignments");
        Ok(Self::with_rank_ids(registry, identity, raw))
    }

    /// Creates a profile from already known rank ids without reading storage.
    pub fn with_rank_ids(
        registry: RankRegistry<S>,
        identity: IdentityRecord,
        raw: RankIdList,
    ) -> Self {
        let writer = registry.identity_writer(IdentityId::new(identity.id));
        let profile = Self {
            identity,
            registry,
            state: RwLock::new(ProfileState::default()),
            writer,
        };
        profile.install(raw);
        profile
    }

    pub fn identity(&self) -> &IdentityRecord {
        &self.identity
    }

    pub fn identity_id(&self) -> IdentityId {
        IdentityId::new(self.identity.id)
    }

    pub fn uuid(&self) -> Uuid {
        self.identity.uuid
    }

    /// Replaces the raw rank ids and resolves them again.
    pub async fn inject(&self, raw: RankIdList) {
        let _writer = self.writer.lock().await;
        self.install(raw);
    }

    /// Resolves the current raw rank ids again, picking up registry changes.
    pub async fn reload(&self) {
        let _writer = self.writer.lock().await;
        let raw = self.state.read().raw.clone();
        self.install(raw);
    }

    /// Re-reads the assigned rank ids from storage and resolves them.
    pub async fn refresh(&self) -> Result<(), ProfileError> {
        let _writer = self.writer.lock().await;
        let raw = read_assignments(&self.registry, &self.identity).await?;
        self.install(raw);
        Ok(())
    }

    /// Rank ids as persisted.
    pub fn raw_rank_ids(&self) -> RankIdList {
        self.state.read().raw.clone()
    }

    /// Owned ranks which are still alive in the registry, including default ranks.
    pub fn ranks(&self) -> Vec<Rank> {
        self.state
            .read()
            .ranks
            .iter()
            .filter_map(WeakRank::upgrade)
            .collect()
    }

    /// Assigned ranks which are excluded by the registry policy.
    pub fn excluded_ranks(&self) -> Vec<Rank> {
        self.state
            .read()
            .excluded
            .iter()
            .filter_map(WeakRank::upgrade)
            .collect()
    }

    /// Forced permission nodes of all excluded ranks.
    pub fn forced_permissions(&self) -> Vec<PermissionNode> {
        self.excluded_ranks()
            .iter()
            .flat_map(Rank::forced_permissions)
            .collect()
    }

    /// Returns `true` if the rank is owned or is an ancestor of an owned rank.
    ///
    /// Positive answers for ancestors are remembered, negative ones are computed again on every
    /// call.
    pub fn has_rank(&self, id: RankId) -> bool {
        let owned = self.ranks();
        if owned.iter().any(|rank| rank.id() == id) {
            return true;
        }
        if self.state.read().confirmed_ancestors.contains(&id) {
            return true;
        }

        for rank in &owned {
            if self
                .registry
                .parent_chain(rank)
                .iter()
                .any(|ancestor| ancestor.id() == id)
            {
                self.state.write().confirmed_ancestors.insert(id);
                return true;
            }
        }
        false
    }

    /// Effective permission nodes of this identity.
    ///
    /// Forced nodes of excluded ranks take absolute precedence. Then the permissions of every
    /// owned rank are merged in descending weight (ties broken by ascending id), the first rank
    /// defining a key wins.
    pub fn all_permissions(&self) -> Permissions {
        let mut permissions = Permissions::new();
        for node in self.forced_permissions() {
            permissions.entry(node.permission.clone()).or_insert(node);
        }

        let mut ranks = self.ranks();
        ranks.sort_by(|a, b| b.weight().cmp(&a.weight()).then(a.id().cmp(&b.id())));
        for rank in ranks {
            for (key, node) in self.registry.all_permissions(&rank) {
                permissions.entry(key).or_insert(node);
            }
        }
        permissions
    }

    /// Returns `true` if the effective node for this key exists and allows it.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.all_permissions()
            .get(&normalize_permission(permission))
            .is_some_and(|node| node.allowed)
    }

    /// Owned rank with the highest weight, ties are won by the lower id.
    pub fn heaviest_rank(&self) -> Option<Rank> {
        self.ranks()
            .into_iter()
            .max_by(|a, b| a.weight().cmp(&b.weight()).then(b.id().cmp(&a.id())))
    }

    /// Assigns a rank to this identity.
    pub async fn add_rank(&self, id: RankId) -> Result<(), ProfileError> {
        let _writer = self.writer.lock().await;

        // Another profile object of this identity might have changed the assignments.
        let current = read_assignments(&self.registry, &self.identity).await?;
        self.install(current);

        if self.owns(id) {
            return Err(ProfileError::AlreadyOwned(id));
        }
        if self.registry.rank(id).is_none() && self.registry.excluded_rank(id).is_none() {
            return Err(ProfileError::UnknownRank(id));
        }

        self.registry
            .store()
            .assign_rank(self.identity.id, id.as_i64())
            .await
            .map_err(|err| {
                warn!(identity = %self.identity.uuid, rank_id = %id, "could not assign rank: {err}");
                err
            })?;

        let mut raw = self.state.read().raw.clone();
        raw.push(id);
        self.install(raw);
        debug!(identity = %self.identity.uuid, rank_id = %id, "added rank");

        self.announce().await;
        Ok(())
    }

    /// Removes an assigned rank from this identity.
    pub async fn remove_rank(&self, id: RankId) -> Result<(), ProfileError> {
        let _writer = self.writer.lock().await;

        let current = read_assignments(&self.registry, &self.identity).await?;
        self.install(current);

        if !self.state.read().raw.contains(id) {
            return Err(ProfileError::NotOwned(id));
        }

        self.registry
            .store()
            .unassign_rank(self.identity.id, id.as_i64())
            .await
            .map_err(|err| {
                warn!(identity = %self.identity.uuid, rank_id = %id, "could not unassign rank: {err}");
                err
            })?;

        let mut raw = self.state.read().raw.clone();
        raw.remove(id);
        self.install(raw);
        debug!(identity = %self.identity.uuid, rank_id = %id, "removed rank");

        self.announce().await;
        Ok(())
    }

    fn owns(&self, id: RankId) -> bool {
        let state = self.state.read();
        state.raw.contains(id)
            || state
                .ranks
                .iter()
                .any(|rank| rank.id() == id && rank.upgrade().is_some())
    }

    /// Resolves raw rank ids against the registry and replaces the derived state.
    ///
    /// Unknown ids are dropped, excluded ones are tracked separately and every default rank is
    /// added.
    fn install(&self, raw: RankIdList) {
        let mut ranks: Vec<Rank> = Vec::new();
        let mut excluded: Vec<Rank> = Vec::new();

        for id in &raw {
            if let Some(rank) = self.registry.rank(*id) {
                if !ranks.contains(&rank) {
                    ranks.push(rank);
                }
            } else if let Some(rank) = self.registry.excluded_rank(*id) {
                if !excluded.contains(&rank) {
                    excluded.push(rank);
                }
            } else {
                trace!(identity = %self.identity.uuid, rank_id = %id, "dropped unknown rank");
            }
        }

        for rank in self.registry.default_ranks() {
            if !ranks.contains(&rank) {
                ranks.push(rank);
            }
        }

        *self.state.write() = ProfileState {
            raw,
            ranks: ranks.iter().map(Rank::downgrade).collect(),
            confirmed_ancestors: HashSet::new(),
            excluded: excluded.iter().map(Rank::downgrade).collect(),
        };
    }

    async fn announce(&self) {
        let message = ProfileInvalidation {
            player_id: self.identity.uuid,
        };
        if let Err(err) = self.registry.bus().publish(&message).await {
            warn!(identity = %self.identity.uuid, "could not announce profile change: {err}");
        }
    }
}

async fn read_assignments<S: Store>(
    registry: &RankRegistry<S>,
    identity: &IdentityRecord,
) -> Result<RankIdList, StoreError> {
    Ok(registry
        .store()
        .assigned_ranks(identity.id)
        .await?
        .into_iter()
        .map(RankId::new)
        .collect())
}

impl<S> fmt::Debug for RankProfile<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankProfile")
            .field("identity", &self.identity.uuid)
            .field("ranks", &self.state.read().raw.to_string())
            .finish_non_exhaustive()
    }
}
