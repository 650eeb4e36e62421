// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StoreError;
use crate::memory::MemoryStore;
use crate::ranks::{NewRankRecord, PermissionRecord, RankColumn, RankRecord, RankStore};
use crate::schema::RANKS_TABLE;

impl RankStore for MemoryStore {
    async fn ranks(&self) -> Result<Vec<RankRecord>, StoreError> {
        let state = self.state();
        state.begin_read()?;
        Ok(state.ranks.values().cloned().collect())
    }

    async fn permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let state = self.state();
        state.begin_read()?;
        Ok(state.permissions.values().cloned().collect())
    }

    async fn insert_rank(&self, rank: &NewRankRecord) -> Result<i64, StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        if state.ranks.values().any(|record| record.name == rank.name) {
            return Err(StoreError::Constraint {
                table: RANKS_TABLE.name(),
                reason: format!("rank_name '{}' is not unique", rank.name),
            });
        }

        state.last_rank_id += 1;
        let id = state.last_rank_id;
        state.ranks.insert(id, rank.clone().with_id(id));
        Ok(id)
    }

    async fn update_rank(&self, id: i64, column: &RankColumn) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        match state.ranks.get_mut(&id) {
            Some(record) => {
                column.apply(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_rank(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        Ok(state.ranks.remove(&id).is_some())
    }

    async fn set_permission(&self, permission: &PermissionRecord) -> Result<(), StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        state.permissions.insert(
            (permission.rank_id, permission.permission.clone()),
            permission.clone(),
        );
        Ok(())
    }

    async fn remove_permission(&self, rank_id: i64, permission: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        Ok(state
            .permissions
            .remove(&(rank_id, permission.to_string()))
            .is_some())
    }

    async fn delete_permissions(&self, rank_id: i64) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        let before = state.permissions.len();
        state.permissions.retain(|(id, _), _| *id != rank_id);
        Ok((before - state.permissions.len()) as u64)
    }
}
