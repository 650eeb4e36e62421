// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use uuid::Uuid;

use crate::StoreError;
use crate::identities::IdentityRecord;

/// Interface for storing and querying identities.
pub trait IdentityStore {
    fn identity_by_uuid(
        &self,
        uuid: &Uuid,
    ) -> impl Future<Output = Result<Option<IdentityRecord>, StoreError>> + Send;

    fn identity_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<IdentityRecord>, StoreError>> + Send;

    /// Loads the identity with this uuid or inserts it when it is not known yet.
    ///
    /// A changed display name of an existing identity gets updated.
    fn register_identity(
        &self,
        uuid: &Uuid,
        name: &str,
    ) -> impl Future<Output = Result<IdentityRecord, StoreError>> + Send;
}

/// Best-effort resolution of display names into identities, usually backed by an external
/// directory service.
///
/// Implementations are expected to give up after a bounded amount of time and answer with `None`
/// instead of blocking.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Option<Uuid>;
}
