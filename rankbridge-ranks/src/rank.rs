// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rankbridge_store::{PermissionRecord, RankRecord};

use crate::RankId;

/// Maximum number of characters of a rank prefix.
pub const MAX_PREFIX_LEN: usize = 32;

/// Namespace of the permission node every rank implicitly grants, see
/// [`RankDefinition::rank_permission`].
const RANK_PERMISSION_NAMESPACE: &str = "ranks";

/// Normalizes a permission key, keys are compared case-insensitive.
pub fn normalize_permission(permission: &str) -> String {
    permission.trim().to_lowercase()
}

/// Single allow or deny flag for a permission key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionNode {
    pub permission: String,
    pub allowed: bool,
    /// Forced nodes apply even when the owning rank is excluded from resolution.
    pub forced: bool,
}

impl PermissionNode {
    pub fn new(permission: &str, allowed: bool, forced: bool) -> Self {
        Self {
            permission: normalize_permission(permission),
            allowed,
            forced,
        }
    }
}

impl From<PermissionRecord> for PermissionNode {
    fn from(record: PermissionRecord) -> Self {
        Self::new(&record.permission, record.allowed, record.forced)
    }
}

/// Permission nodes keyed by their normalized permission key.
pub type Permissions = BTreeMap<String, PermissionNode>;

/// Named, weighted bundle of permissions with an optional parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankDefinition {
    /// Storage key, `None` as long as the definition was not persisted.
    pub id: Option<RankId>,
    pub name: String,
    /// Display form, may contain formatting markers.
    pub long_prefix: String,
    pub short_prefix: Option<String>,
    /// Higher weight means more senior.
    pub weight: i32,
    pub parent: Option<RankId>,
    /// Default ranks are granted to every identity without being assigned.
    pub is_default: bool,
    pub(crate) permissions: Permissions,
}

impl RankDefinition {
    pub fn new(name: &str, long_prefix: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            long_prefix: long_prefix.to_string(),
            short_prefix: None,
            weight: 0,
            parent: None,
            is_default: false,
            permissions: Permissions::new(),
        }
    }

    pub fn with_short_prefix(mut self, short_prefix: &str) -> Self {
        self.short_prefix = Some(short_prefix.to_string());
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_parent(mut self, parent: RankId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Short display form, falls back to the long one.
    pub fn short_prefix(&self) -> &str {
        self.short_prefix.as_deref().unwrap_or(&self.long_prefix)
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Permission key granted by holding a rank with this name, for example `ranks.admin`.
    pub fn rank_permission(name: &str) -> String {
        normalize_permission(&format!("{RANK_PERMISSION_NAMESPACE}.{name}"))
    }

    pub(crate) fn from_record(record: RankRecord) -> Self {
        let mut definition = Self {
            id: Some(RankId::new(record.id)),
            name: record.name,
            long_prefix: record.long_prefix,
            short_prefix: record.short_prefix,
            weight: record.weight,
            parent: record.parent_id.map(RankId::new),
            is_default: record.is_default,
            permissions: Permissions::new(),
        };
        definition.grant_rank_permission();
        definition
    }

    /// Adds the implicit `ranks.<name>` node unless the permission was persisted explicitly.
    pub(crate) fn grant_rank_permission(&mut self) {
        let key = Self::rank_permission(&self.name);
        self.permissions
            .entry(key.clone())
            .or_insert_with(|| PermissionNode::new(&key, true, false));
    }
}

/// Shared handle to a persisted rank definition owned by the registry.
///
/// Cloning the handle is cheap, all clones see edits made through the registry. Profiles keep
/// [`WeakRank`] references instead which stop resolving as soon as the rank gets deleted.
#[derive(Clone)]
pub struct Rank(Arc<RankInner>);

struct RankInner {
    id: RankId,
    definition: RwLock<RankDefinition>,
    retired: AtomicBool,
}

impl Rank {
    /// Wraps a persisted definition.
    ///
    /// Panics if the definition has no id.
    pub(crate) fn new(definition: RankDefinition) -> Self {
        let id = definition
            .id
            .expect("only persisted definitions can be shared as ranks");
        Self(Arc::new(RankInner {
            id,
            definition: RwLock::new(definition),
            retired: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> RankId {
        self.0.id
    }

    pub fn name(&self) -> String {
        self.0.definition.read().name.clone()
    }

    pub fn weight(&self) -> i32 {
        self.0.definition.read().weight
    }

    pub fn parent(&self) -> Option<RankId> {
        self.0.definition.read().parent
    }

    pub fn is_default(&self) -> bool {
        self.0.definition.read().is_default
    }

    pub fn long_prefix(&self) -> String {
        self.0.definition.read().long_prefix.clone()
    }

    pub fn short_prefix(&self) -> String {
        self.0.definition.read().short_prefix().to_string()
    }

    /// Snapshot of the current definition.
    pub fn definition(&self) -> RankDefinition {
        self.0.definition.read().clone()
    }

    pub fn permission(&self, permission: &str) -> Option<PermissionNode> {
        self.0
            .definition
            .read()
            .permissions
            .get(&normalize_permission(permission))
            .cloned()
    }

    /// Own permission nodes, without inherited ones.
    pub fn permissions(&self) -> Permissions {
        self.0.definition.read().permissions.clone()
    }

    pub fn forced_permissions(&self) -> Vec<PermissionNode> {
        self.0
            .definition
            .read()
            .permissions
            .values()
            .filter(|node| node.forced)
            .cloned()
            .collect()
    }

    /// Returns `true` if the rank was deleted or vanished from storage.
    pub fn is_retired(&self) -> bool {
        self.0.retired.load(Ordering::Acquire)
    }

    pub fn downgrade(&self) -> WeakRank {
        WeakRank {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, RankDefinition> {
        self.0.definition.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RankDefinition> {
        self.0.definition.write()
    }

    pub(crate) fn retire(&self) {
        self.0.retired.store(true, Ordering::Release);
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Rank {}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let definition = self.0.definition.read();
        f.debug_struct("Rank")
            .field("id", &self.0.id)
            .field("name", &definition.name)
            .field("weight", &definition.weight)
            .field("parent", &definition.parent)
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Non-owning reference to a rank.
#[derive(Clone, Debug)]
pub struct WeakRank {
    id: RankId,
    inner: Weak<RankInner>,
}

impl WeakRank {
    pub fn id(&self) -> RankId {
        self.id
    }

    /// Returns the rank if it is still held by the registry and was not retired.
    pub fn upgrade(&self) -> Option<Rank> {
        let rank = Rank(self.inner.upgrade()?);
        if rank.is_retired() {
            return None;
        }
        Some(rank)
    }
}
