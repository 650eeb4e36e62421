// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StoreError;
use crate::ranks::{NewRankRecord, PermissionRecord, RankColumn, RankRecord};

/// Interface for storing and querying rank definitions and their permission nodes.
pub trait RankStore {
    /// Returns all persisted rank rows, ordered by id.
    fn ranks(&self) -> impl Future<Output = Result<Vec<RankRecord>, StoreError>> + Send;

    /// Returns all persisted permission nodes of all ranks.
    fn permissions(&self) -> impl Future<Output = Result<Vec<PermissionRecord>, StoreError>> + Send;

    /// Inserts a new rank row and returns the id assigned by the database.
    fn insert_rank(
        &self,
        rank: &NewRankRecord,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Updates a single column of a rank row.
    ///
    /// Returns `false` if no row with this id exists.
    fn update_rank(
        &self,
        id: i64,
        column: &RankColumn,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes the rank row itself. Dependent rows are not touched.
    ///
    /// Returns `false` if no row with this id exists.
    fn delete_rank(&self, id: i64) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Inserts a permission node or replaces the values of an existing one with the same rank id
    /// and permission key.
    fn set_permission(
        &self,
        permission: &PermissionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes a single permission node.
    ///
    /// Returns `false` if the node did not exist.
    fn remove_permission(
        &self,
        rank_id: i64,
        permission: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes all permission nodes of a rank and returns the number of removed rows.
    fn delete_permissions(&self, rank_id: i64)
    -> impl Future<Output = Result<u64, StoreError>> + Send;
}
