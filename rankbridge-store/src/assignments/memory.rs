// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StoreError;
use crate::assignments::AssignmentStore;
use crate::memory::MemoryStore;
use crate::schema::ASSIGNMENTS_TABLE;

impl AssignmentStore for MemoryStore {
    async fn assigned_ranks(&self, identity_id: i64) -> Result<Vec<i64>, StoreError> {
        let state = self.state();
        state.begin_read()?;
        Ok(state
            .assignments
            .iter()
            .filter(|(identity, _)| *identity == identity_id)
            .map(|(_, rank)| *rank)
            .collect())
    }

    async fn assign_rank(&self, identity_id: i64, rank_id: i64) -> Result<(), StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        if state.assignments.contains(&(identity_id, rank_id)) {
            return Err(StoreError::Constraint {
                table: ASSIGNMENTS_TABLE.name(),
                reason: format!("rank {rank_id} is already assigned to identity {identity_id}"),
            });
        }
        state.assignments.push((identity_id, rank_id));
        Ok(())
    }

    async fn unassign_rank(&self, identity_id: i64, rank_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        let before = state.assignments.len();
        state
            .assignments
            .retain(|assignment| *assignment != (identity_id, rank_id));
        Ok(state.assignments.len() < before)
    }

    async fn unassign_rank_everywhere(&self, rank_id: i64) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.begin_write()?;
        let before = state.assignments.len();
        state.assignments.retain(|(_, rank)| *rank != rank_id);
        Ok((before - state.assignments.len()) as u64)
    }
}
