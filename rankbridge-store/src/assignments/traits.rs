// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StoreError;

/// Interface for storing which identity owns which rank.
///
/// Identities are addressed by their numeric id from the identity directory, see
/// [`IdentityStore`](crate::IdentityStore).
pub trait AssignmentStore {
    /// Returns the rank ids assigned to an identity in insertion order.
    fn assigned_ranks(
        &self,
        identity_id: i64,
    ) -> impl Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Assigns a rank to an identity.
    fn assign_rank(
        &self,
        identity_id: i64,
        rank_id: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes a rank from an identity.
    ///
    /// Returns `false` if the rank was not assigned.
    fn unassign_rank(
        &self,
        identity_id: i64,
        rank_id: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes a rank from every identity owning it and returns the number of removed rows.
    fn unassign_rank_everywhere(
        &self,
        rank_id: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
