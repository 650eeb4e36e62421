// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{query, query_as};
use uuid::Uuid;

use crate::StoreError;
use crate::identities::{IdentityRecord, IdentityStore};
use crate::sqlite::SqliteStore;

type IdentityRow = (i64, String, String);

fn decode_identity((id, uuid, name): IdentityRow) -> Result<IdentityRecord, StoreError> {
    let uuid = Uuid::parse_str(&uuid)
        .map_err(|err| StoreError::Decode("uuid".into(), err.to_string()))?;
    Ok(IdentityRecord { id, uuid, name })
}

impl IdentityStore for SqliteStore {
    async fn identity_by_uuid(&self, uuid: &Uuid) -> Result<Option<IdentityRecord>, StoreError> {
        let row = query_as::<_, IdentityRow>(
            "
            SELECT
                id,
                uuid,
                name
            FROM
                users
            WHERE
                uuid = ?
            ",
        )
        .bind(uuid.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_identity).transpose()
    }

    async fn identity_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        let row = query_as::<_, IdentityRow>(
            "
            SELECT
                id,
                uuid,
                name
            FROM
                users
            WHERE
                id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_identity).transpose()
    }

    async fn register_identity(&self, uuid: &Uuid, name: &str) -> Result<IdentityRecord, StoreError> {
        if let Some(mut identity) = self.identity_by_uuid(uuid).await? {
            if identity.name != name {
                query(
                    "
                    UPDATE
                        users
                    SET
                        name = ?
                    WHERE
                        id = ?
                    ",
                )
                .bind(name)
                .bind(identity.id)
                .execute(&self.pool)
                .await?;
                identity.name = name.to_string();
            }
            return Ok(identity);
        }

        let result = query(
            "
            INSERT INTO
                users (
                    uuid,
                    name
                )
            VALUES
                (?, ?)
            ",
        )
        .bind(uuid.to_string())
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(IdentityRecord {
            id: result.last_insert_rowid(),
            uuid: *uuid,
            name: name.to_string(),
        })
    }
}
