// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::BusMessage;

/// Change applied to a single permission node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    SetPermission,
    RemovePermission,
}

/// A permission node of a rank was set or removed.
///
/// Receivers apply the same change to their in-memory registry instead of reloading all ranks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PermissionMutation {
    pub message_type: MutationKind,
    pub rank_id: i64,
    pub permission: String,
    #[serde(default)]
    pub is_allowed: bool,
    #[serde(default)]
    pub forced: bool,
}

impl BusMessage for PermissionMutation {
    const TYPE: &'static str = "permissions-update";
    const VERSION: u32 = 1;
}

/// Ranks assigned to an identity changed, cached profiles of it are stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileInvalidation {
    pub player_id: Uuid,
}

impl BusMessage for ProfileInvalidation {
    const TYPE: &'static str = "rank-update";
    const VERSION: u32 = 1;
}

/// Directory data of an identity changed, for example its display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInvalidation {
    pub uuid: Uuid,
}

impl BusMessage for IdentityInvalidation {
    const TYPE: &'static str = "reload-player-info";
    const VERSION: u32 = 1;
}

/// Rank definitions changed in a way which requires re-reading them from storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReload {}

impl BusMessage for RegistryReload {
    const TYPE: &'static str = "reload-rank-module";
    const VERSION: u32 = 1;
}
