// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rank rows and the permission nodes attached to them.
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use traits::RankStore;

/// Persisted rank definition, without its permission nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankRecord {
    pub id: i64,
    pub name: String,
    pub long_prefix: String,
    pub short_prefix: Option<String>,
    pub weight: i32,
    pub parent_id: Option<i64>,
    pub is_default: bool,
}

/// Rank definition which was not persisted yet and has no id assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRankRecord {
    pub name: String,
    pub long_prefix: String,
    pub short_prefix: Option<String>,
    pub weight: i32,
    pub parent_id: Option<i64>,
    pub is_default: bool,
}

impl NewRankRecord {
    pub(crate) fn with_id(self, id: i64) -> RankRecord {
        RankRecord {
            id,
            name: self.name,
            long_prefix: self.long_prefix,
            short_prefix: self.short_prefix,
            weight: self.weight,
            parent_id: self.parent_id,
            is_default: self.is_default,
        }
    }
}

/// Permission node row.
///
/// The permission key is expected to be normalized by the caller, the store compares keys
/// byte-wise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionRecord {
    pub rank_id: i64,
    pub permission: String,
    pub allowed: bool,
    pub forced: bool,
}

/// Single editable column of a rank row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RankColumn {
    LongPrefix(String),
    ShortPrefix(Option<String>),
    Weight(i32),
    Parent(Option<i64>),
    Default(bool),
}

impl RankColumn {
    /// Name of the column in the `ranks` table.
    pub fn name(&self) -> &'static str {
        match self {
            RankColumn::LongPrefix(_) => "long_prefix",
            RankColumn::ShortPrefix(_) => "short_prefix",
            RankColumn::Weight(_) => "weight",
            RankColumn::Parent(_) => "parent_rank",
            RankColumn::Default(_) => "is_default",
        }
    }

    pub(crate) fn apply(&self, record: &mut RankRecord) {
        match self {
            RankColumn::LongPrefix(prefix) => record.long_prefix = prefix.clone(),
            RankColumn::ShortPrefix(prefix) => record.short_prefix = prefix.clone(),
            RankColumn::Weight(weight) => record.weight = *weight,
            RankColumn::Parent(parent) => record.parent_id = *parent,
            RankColumn::Default(is_default) => record.is_default = *is_default,
        }
    }
}
