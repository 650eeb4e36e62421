// SPDX-License-Identifier: MIT OR Apache-2.0

use uuid::Uuid;

use crate::StoreError;
use crate::identities::{IdentityRecord, IdentityStore};
use crate::memory::MemoryStore;

impl IdentityStore for MemoryStore {
    async fn identity_by_uuid(&self, uuid: &Uuid) -> Result<Option<IdentityRecord>, StoreError> {
        let state = self.state();
        state.begin_read()?;
        Ok(state
            .identities
            .values()
            .find(|identity| identity.uuid == *uuid)
            .cloned())
    }

    async fn identity_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        let state = self.state();
        state.begin_read()?;
        Ok(state.identities.get(&id).cloned())
    }

    async fn register_identity(&self, uuid: &Uuid, name: &str) -> Result<IdentityRecord, StoreError> {
        let mut state = self.state();
        state.begin_read()?;

        let existing = state
            .identities
            .values()
            .find(|identity| identity.uuid == *uuid)
            .cloned();

        match existing {
            Some(mut identity) => {
                if identity.name != name {
                    state.begin_write()?;
                    identity.name = name.to_string();
                    state.identities.insert(identity.id, identity.clone());
                }
                Ok(identity)
            }
            None => {
                state.begin_write()?;
                state.last_identity_id += 1;
                let record = IdentityRecord {
                    id: state.last_identity_id,
                    uuid: *uuid,
                    name: name.to_string(),
                };
                state.identities.insert(record.id, record.clone());
                Ok(record)
            }
        }
    }
}
