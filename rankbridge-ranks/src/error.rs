// SPDX-License-Identifier: MIT OR Apache-2.0

use rankbridge_store::StoreError;
use thiserror::Error;

use crate::RankId;
use crate::rank::MAX_PREFIX_LEN;

/// Invalid input to an administrative operation. Storage is never touched when this occurs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rank name can not be empty")]
    EmptyName,

    #[error("rank with name '{0}' already exists")]
    DuplicateName(String),

    #[error("prefix can not be empty")]
    EmptyPrefix,

    #[error("prefix is {0} characters long, at most {MAX_PREFIX_LEN} are allowed")]
    PrefixTooLong(usize),

    #[error("permission key can not be empty")]
    EmptyPermission,

    #[error("parent rank {0} does not exist")]
    UnknownParent(RankId),

    #[error("making {parent} the parent of {rank} would create a cycle")]
    ParentCycle { rank: RankId, parent: RankId },

    #[error("rank definition was already persisted with id {0}")]
    AlreadyPersisted(RankId),
}

/// Step of deleting a rank, in the order they are executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteStep {
    Assignments,
    Permissions,
    Rank,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("rank {0} does not exist")]
    RankNotFound(RankId),

    #[error("rank {rank} has no permission node '{permission}'")]
    PermissionNotFound { rank: RankId, permission: String },

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Deleting a rank failed half-way, writes of earlier steps remain applied.
    #[error("deleting rank {rank} failed at step {step:?}: {source}")]
    PartialDelete {
        rank: RankId,
        step: DeleteStep,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("rank {0} is already owned")]
    AlreadyOwned(RankId),

    #[error("rank {0} is not owned")]
    NotOwned(RankId),

    #[error("rank {0} does not exist")]
    UnknownRank(RankId),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
