// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{query, query_as};

use crate::StoreError;
use crate::ranks::{NewRankRecord, PermissionRecord, RankColumn, RankRecord, RankStore};
use crate::sqlite::SqliteStore;

type RankRow = (i64, String, String, Option<String>, i32, Option<i64>, bool);

type PermissionRow = (i64, String, bool, bool);

impl RankStore for SqliteStore {
    async fn ranks(&self) -> Result<Vec<RankRecord>, StoreError> {
        let rows = query_as::<_, RankRow>(
            "
            SELECT
                id,
                rank_name,
                long_prefix,
                short_prefix,
                weight,
                parent_rank,
                is_default
            FROM
                ranks
            ORDER BY
                id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, name, long_prefix, short_prefix, weight, parent_id, is_default)| RankRecord {
                    id,
                    name,
                    long_prefix,
                    short_prefix,
                    weight,
                    parent_id,
                    is_default,
                },
            )
            .collect())
    }

    async fn permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let rows = query_as::<_, PermissionRow>(
            "
            SELECT
                rank_id,
                permission,
                allowed,
                forced
            FROM
                permission_nodes
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(rank_id, permission, allowed, forced)| PermissionRecord {
                rank_id,
                permission,
                allowed,
                forced,
            })
            .collect())
    }

    async fn insert_rank(&self, rank: &NewRankRecord) -> Result<i64, StoreError> {
        let result = query(
            "
            INSERT INTO
                ranks (
                    rank_name,
                    long_prefix,
                    short_prefix,
                    weight,
                    parent_rank,
                    is_default
                )
            VALUES
                (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&rank.name)
        .bind(&rank.long_prefix)
        .bind(&rank.short_prefix)
        .bind(rank.weight)
        .bind(rank.parent_id)
        .bind(rank.is_default)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_rank(&self, id: i64, column: &RankColumn) -> Result<bool, StoreError> {
        // Column names come from a closed set and are never user input.
        let statement = format!("UPDATE ranks SET {} = ? WHERE id = ?", column.name());
        let statement = query(&statement);
        let statement = match column {
            RankColumn::LongPrefix(prefix) => statement.bind(prefix.clone()),
            RankColumn::ShortPrefix(prefix) => statement.bind(prefix.clone()),
            RankColumn::Weight(weight) => statement.bind(*weight),
            RankColumn::Parent(parent) => statement.bind(*parent),
            RankColumn::Default(is_default) => statement.bind(*is_default),
        };
        let result = statement.bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_rank(&self, id: i64) -> Result<bool, StoreError> {
        let result = query(
            "
            DELETE FROM
                ranks
            WHERE
                id = ?
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_permission(&self, permission: &PermissionRecord) -> Result<(), StoreError> {
        query(
            "
            INSERT INTO
                permission_nodes (
                    rank_id,
                    permission,
                    allowed,
                    forced
                )
            VALUES
                (?, ?, ?, ?)
            ON CONFLICT (rank_id, permission) DO UPDATE SET
                allowed = excluded.allowed,
                forced = excluded.forced
            ",
        )
        .bind(permission.rank_id)
        .bind(&permission.permission)
        .bind(permission.allowed)
        .bind(permission.forced)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_permission(&self, rank_id: i64, permission: &str) -> Result<bool, StoreError> {
        let result = query(
            "
            DELETE FROM
                permission_nodes
            WHERE
                rank_id = ?
                AND permission = ?
            ",
        )
        .bind(rank_id)
        .bind(permission)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_permissions(&self, rank_id: i64) -> Result<u64, StoreError> {
        let result = query(
            "
            DELETE FROM
                permission_nodes
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
