// SPDX-License-Identifier: MIT OR Apache-2.0

//! Administrative mutation of rank definitions.
use std::collections::HashSet;

use rankbridge_bus::{MutationKind, PermissionMutation, RegistryReload};
use rankbridge_store::{NewRankRecord, PermissionRecord, RankColumn, Store};
use tracing::{debug, warn};

use crate::RankId;
use crate::error::{DeleteStep, RegistryError, ValidationError};
use crate::rank::{MAX_PREFIX_LEN, PermissionNode, Rank, RankDefinition, normalize_permission};
use crate::registry::RankRegistry;

fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.is_empty() {
        return Err(ValidationError::EmptyPrefix);
    }
    let len = prefix.chars().count();
    if len > MAX_PREFIX_LEN {
        return Err(ValidationError::PrefixTooLong(len));
    }
    Ok(())
}

impl<S> RankRegistry<S>
where
    S: Store,
{
    /// Persists a new rank and adds it to the registry.
    ///
    /// Permission nodes are not part of the creation, they are added with
    /// [`set_permission`](Self::set_permission) afterwards.
    pub async fn create_rank(&self, definition: RankDefinition) -> Result<Rank, RegistryError> {
        let _admin = self.inner.admin.lock().await;

        if let Some(id) = definition.id {
            return Err(ValidationError::AlreadyPersisted(id).into());
        }
        let name = definition.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        validate_prefix(&definition.long_prefix)?;
        if let Some(short_prefix) = &definition.short_prefix {
            validate_prefix(short_prefix)?;
        }
        {
            let state = self.inner.state.read();
            if state.name_taken(&name) {
                return Err(ValidationError::DuplicateName(name).into());
            }
            if let Some(parent) = definition.parent {
                if !state.by_id.contains_key(&parent) {
                    return Err(ValidationError::UnknownParent(parent).into());
                }
            }
        }

        let record = NewRankRecord {
            name: name.clone(),
            long_prefix: definition.long_prefix.clone(),
            short_prefix: definition.short_prefix.clone(),
            weight: definition.weight,
            parent_id: definition.parent.map(|id| id.as_i64()),
            is_default: definition.is_default,
        };
        let id = self.inner.store.insert_rank(&record).await.map_err(|err| {
            warn!(%name, "could not persist new rank: {err}");
            err
        })?;

        let mut definition = definition;
        definition.id = Some(RankId::new(id));
        definition.name = name;
        definition.permissions.clear();
        definition.grant_rank_permission();
        let rank = Rank::new(definition);

        self.inner
            .state
            .write()
            .insert(rank.clone(), &self.inner.config);
        debug!(rank_id = %rank.id(), name = %rank.name(), "created rank");

        self.announce(&RegistryReload {}).await;
        Ok(rank)
    }

    /// Deletes a rank together with its assignments and permission nodes.
    ///
    /// Assignments, permission nodes and the rank row are removed in this order. When one of the
    /// writes fails the earlier ones stay applied and the rank is kept in memory.
    pub async fn delete_rank(&self, id: RankId) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;

        if self.inner.state.read().any(id).is_none() {
            return Err(RegistryError::RankNotFound(id));
        }

        let store = &self.inner.store;
        let partial = |step| {
            move |source| {
                warn!(rank_id = %id, ?step, "could not delete rank: {source}");
                RegistryError::PartialDelete {
                    rank: id,
                    step,
                    source,
                }
            }
        };

        store
            .unassign_rank_everywhere(id.as_i64())
            .await
            .map_err(partial(DeleteStep::Assignments))?;
        store
            .delete_permissions(id.as_i64())
            .await
            .map_err(partial(DeleteStep::Permissions))?;
        store
            .delete_rank(id.as_i64())
            .await
            .map_err(partial(DeleteStep::Rank))?;

        if let Some(rank) = self.inner.state.write().remove(id) {
            rank.retire();
        }
        debug!(rank_id = %id, "deleted rank");

        self.announce(&RegistryReload {}).await;
        Ok(())
    }

    /// Sets a permission node of a rank, replacing an existing node with the same key.
    ///
    /// Setting a node to the values it already has succeeds without touching storage.
    pub async fn set_permission(
        &self,
        id: RankId,
        permission: &str,
        allowed: bool,
        forced: bool,
    ) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;

        let key = normalize_permission(permission);
        if key.is_empty() {
            return Err(ValidationError::EmptyPermission.into());
        }
        let rank = self.any_rank(id)?;
        let node = PermissionNode::new(&key, allowed, forced);
        if rank.read().permissions.get(&key) == Some(&node) {
            return Ok(());
        }

        self.inner
            .store
            .set_permission(&PermissionRecord {
                rank_id: id.as_i64(),
                permission: key.clone(),
                allowed,
                forced,
            })
            .await
            .map_err(|err| {
                warn!(rank_id = %id, permission = %key, "could not persist permission: {err}");
                err
            })?;

        rank.write().permissions.insert(key.clone(), node);
        debug!(rank_id = %id, permission = %key, allowed, forced, "set permission");

        self.announce(&PermissionMutation {
            message_type: MutationKind::SetPermission,
            rank_id: id.as_i64(),
            permission: key,
            is_allowed: allowed,
            forced,
        })
        .await;
        Ok(())
    }

    /// Removes a permission node from a rank.
    pub async fn remove_permission(&self, id: RankId, permission: &str) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;

        let key = normalize_permission(permission);
        if key.is_empty() {
            return Err(ValidationError::EmptyPermission.into());
        }
        let rank = self.any_rank(id)?;
        let Some(node) = rank.read().permissions.get(&key).cloned() else {
            return Err(RegistryError::PermissionNotFound {
                rank: id,
                permission: key,
            });
        };

        self.inner
            .store
            .remove_permission(id.as_i64(), &key)
            .await
            .map_err(|err| {
                warn!(rank_id = %id, permission = %key, "could not remove permission: {err}");
                err
            })?;

        rank.write().permissions.remove(&key);
        debug!(rank_id = %id, permission = %key, "removed permission");

        self.announce(&PermissionMutation {
            message_type: MutationKind::RemovePermission,
            rank_id: id.as_i64(),
            permission: key,
            is_allowed: node.allowed,
            forced: node.forced,
        })
        .await;
        Ok(())
    }

    pub async fn set_weight(&self, id: RankId, weight: i32) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;
        let rank = self.any_rank(id)?;
        if rank.weight() == weight {
            return Ok(());
        }
        self.update_column(&rank, RankColumn::Weight(weight)).await
    }

    /// Changes the parent of a rank, `None` turns it into a root.
    ///
    /// The new parent has to be an active rank and must not be a descendant of the rank itself.
    pub async fn set_parent(&self, id: RankId, parent: Option<RankId>) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;
        let rank = self.any_rank(id)?;
        if rank.parent() == parent {
            return Ok(());
        }

        if let Some(parent_id) = parent {
            let state = self.inner.state.read();
            if !state.by_id.contains_key(&parent_id) {
                return Err(ValidationError::UnknownParent(parent_id).into());
            }

            // Walk up from the new parent, reaching the rank itself means we'd close a loop.
            let mut visited = HashSet::new();
            let mut next = Some(parent_id);
            while let Some(current) = next {
                if current == id {
                    return Err(ValidationError::ParentCycle {
                        rank: id,
                        parent: parent_id,
                    }
                    .into());
                }
                if !visited.insert(current) {
                    break;
                }
                next = state.any(current).and_then(|rank| rank.parent());
            }
        }

        self.update_column(&rank, RankColumn::Parent(parent.map(|id| id.as_i64())))
            .await
    }

    /// Marks a rank as granted to every identity or revokes that.
    pub async fn set_default(&self, id: RankId, is_default: bool) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;
        let rank = self.any_rank(id)?;
        if rank.is_default() == is_default {
            return Ok(());
        }
        self.update_column(&rank, RankColumn::Default(is_default))
            .await
    }

    pub async fn set_long_prefix(&self, id: RankId, prefix: &str) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;
        validate_prefix(prefix)?;
        let rank = self.any_rank(id)?;
        if rank.read().long_prefix == prefix {
            return Ok(());
        }
        self.update_column(&rank, RankColumn::LongPrefix(prefix.to_string()))
            .await
    }

    /// Sets the short display form, `None` falls back to the long one.
    pub async fn set_short_prefix(
        &self,
        id: RankId,
        prefix: Option<&str>,
    ) -> Result<(), RegistryError> {
        let _admin = self.inner.admin.lock().await;
        if let Some(prefix) = prefix {
            validate_prefix(prefix)?;
        }
        let rank = self.any_rank(id)?;
        if rank.read().short_prefix.as_deref() == prefix {
            return Ok(());
        }
        self.update_column(&rank, RankColumn::ShortPrefix(prefix.map(str::to_string)))
            .await
    }

    fn any_rank(&self, id: RankId) -> Result<Rank, RegistryError> {
        self.inner
            .state
            .read()
            .any(id)
            .cloned()
            .ok_or(RegistryError::RankNotFound(id))
    }

    /// Writes a single column of a rank row, then applies it to the in-memory definition.
    async fn update_column(&self, rank: &Rank, column: RankColumn) -> Result<(), RegistryError> {
        let id = rank.id();
        let updated = self
            .inner
            .store
            .update_rank(id.as_i64(), &column)
            .await
            .map_err(|err| {
                warn!(rank_id = %id, column = column.name(), "could not update rank: {err}");
                err
            })?;
        if !updated {
            warn!(rank_id = %id, "rank row vanished from storage");
            return Err(RegistryError::RankNotFound(id));
        }

        {
            let mut definition = rank.write();
            match column {
                RankColumn::LongPrefix(prefix) => definition.long_prefix = prefix,
                RankColumn::ShortPrefix(prefix) => definition.short_prefix = prefix,
                RankColumn::Weight(weight) => definition.weight = weight,
                RankColumn::Parent(parent) => definition.parent = parent.map(RankId::new),
                RankColumn::Default(is_default) => definition.is_default = is_default,
            }
        }
        debug!(rank_id = %id, "updated rank");

        self.announce(&RegistryReload {}).await;
        Ok(())
    }
}
