// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{query, query_scalar};

use crate::StoreError;
use crate::assignments::AssignmentStore;
use crate::sqlite::SqliteStore;

impl AssignmentStore for SqliteStore {
    async fn assigned_ranks(&self, identity_id: i64) -> Result<Vec<i64>, StoreError> {
        let rank_ids = query_scalar::<_, i64>(
            "
            SELECT
                rank_id
            FROM
                player_ranks
            WHERE
                player_id = ?
            ORDER BY
                rowid
            ",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rank_ids)
    }

    async fn assign_rank(&self, identity_id: i64, rank_id: i64) -> Result<(), StoreError> {
        query(
            "
            INSERT INTO
                player_ranks (
                    player_id,
                    rank_id
                )
            VALUES
                (?, ?)
            ",
        )
        .bind(identity_id)
        .bind(rank_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unassign_rank(&self, identity_id: i64, rank_id: i64) -> Result<bool, StoreError> {
        let result = query(
            "
            DELETE FROM
                player_ranks
            WHERE
                player_id = ?
                AND rank_id = ?
            ",
        )
        .bind(identity_id)
        .bind(rank_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unassign_rank_everywhere(&self, rank_id: i64) -> Result<u64, StoreError> {
        let result = query(
            "
            DELETE FROM
                player_ranks
            WHERE
                rank_id = ?
            ",
        )
        .bind(rank_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
