// SPDX-License-Identifier: MIT OR Apache-2.0

//! Applies invalidation messages of other processes to the local registry and profile cache.
use futures_util::StreamExt;
use rankbridge_bus::{
    BusError, BusMessage, BusSubscription, Envelope, IdentityInvalidation, PermissionMutation,
    ProfileInvalidation, RegistryReload,
};
use rankbridge_store::Store;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::cache::ProfileCache;
use crate::registry::{MutationOutcome, RankRegistry};

/// What happened to a received envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied,
    /// Unknown type, other version or nothing to do for this process.
    Ignored,
    /// Message could not be decoded or refers to state this process does not know.
    Dropped,
}

/// Receiving side of the invalidation bus.
pub struct InvalidationListener<S> {
    registry: RankRegistry<S>,
    cache: ProfileCache<S>,
}

impl<S> InvalidationListener<S>
where
    S: Store,
{
    pub fn new(registry: RankRegistry<S>, cache: ProfileCache<S>) -> Self {
        Self { registry, cache }
    }

    /// Handles a single envelope. Failures are logged, never returned.
    pub async fn handle(&self, envelope: &Envelope) -> MessageOutcome {
        let outcome = match envelope.message_type.as_str() {
            ProfileInvalidation::TYPE => match decode::<ProfileInvalidation>(envelope) {
                Some(message) => {
                    self.cache.invalidate(&message.player_id);
                    MessageOutcome::Applied
                }
                None => MessageOutcome::Ignored,
            },
            // Cached profiles carry the identity record, loading them again refreshes it.
            IdentityInvalidation::TYPE => match decode::<IdentityInvalidation>(envelope) {
                Some(message) => {
                    self.cache.invalidate(&message.uuid);
                    MessageOutcome::Applied
                }
                None => MessageOutcome::Ignored,
            },
            PermissionMutation::TYPE => match decode::<PermissionMutation>(envelope) {
                Some(message) => match self.registry.apply_permission_mutation(&message) {
                    MutationOutcome::Applied => MessageOutcome::Applied,
                    MutationOutcome::Ignored => MessageOutcome::Ignored,
                    MutationOutcome::UnknownRank => {
                        warn!(
                            rank_id = message.rank_id,
                            permission = %message.permission,
                            "dropped permission mutation for unknown rank"
                        );
                        MessageOutcome::Dropped
                    }
                },
                None => MessageOutcome::Ignored,
            },
            RegistryReload::TYPE => match decode::<RegistryReload>(envelope) {
                Some(_) => match self.registry.reload().await {
                    Ok(()) => {
                        self.cache.invalidate_all();
                        MessageOutcome::Applied
                    }
                    Err(err) => {
                        warn!("could not reload rank registry: {err}");
                        MessageOutcome::Dropped
                    }
                },
                None => MessageOutcome::Ignored,
            },
            _ => MessageOutcome::Ignored,
        };

        trace!(
            message_type = %envelope.message_type,
            version = envelope.version,
            ?outcome,
            "handled envelope"
        );
        outcome
    }

    /// Handles envelopes of the subscription until it ends.
    pub async fn run(self, mut subscription: BusSubscription) {
        debug!(channel = subscription.channel(), "listening for invalidations");
        while let Some(envelope) = subscription.next().await {
            self.handle(&envelope).await;
        }
        debug!("invalidation subscription ended");
    }

    /// Subscribes to the bus and handles envelopes in a background task.
    ///
    /// The subscription is established before this returns, messages published afterwards are
    /// not missed.
    pub async fn spawn(self) -> Result<JoinHandle<()>, BusError> {
        let subscription = self.registry.bus().subscribe().await?;
        Ok(tokio::spawn(self.run(subscription)))
    }
}

/// Decodes the body if type and version match, logs malformed bodies.
fn decode<M: BusMessage>(envelope: &Envelope) -> Option<M> {
    match envelope.decode_body::<M>() {
        Ok(message) => message,
        Err(err) => {
            warn!(message_type = M::TYPE, "dropped malformed message body: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rankbridge_bus::{
        Envelope, IdentityInvalidation, MutationKind, PermissionMutation, ProfileInvalidation,
        RegistryReload,
    };
    use rankbridge_store::{IdentityStore, MemoryStore};
    use serde_json::json;

    use crate::RankId;
    use crate::cache::ProfileCache;
    use crate::rank::RankDefinition;
    use crate::test_utils::TestProcess;

    use super::{InvalidationListener, MessageOutcome};

    fn listener(process: &TestProcess) -> InvalidationListener<MemoryStore> {
        let cache = ProfileCache::new(process.registry.clone(), Duration::from_secs(60));
        InvalidationListener::new(process.registry.clone(), cache)
    }

    fn mutation(kind: MutationKind, rank_id: RankId, allowed: bool, forced: bool) -> Envelope {
        Envelope::new(&PermissionMutation {
            message_type: kind,
            rank_id: rank_id.as_i64(),
            permission: "Chat.Color".into(),
            is_allowed: allowed,
            forced,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_rank_is_dropped() {
        let process = TestProcess::new().await;
        let listener = listener(&process);

        let outcome = listener
            .handle(&mutation(MutationKind::SetPermission, RankId::new(99), true, false))
            .await;
        assert_eq!(outcome, MessageOutcome::Dropped);
    }

    #[tokio::test]
    async fn apply_mutation_to_active_rank() {
        let process = TestProcess::new().await;
        let listener = listener(&process);
        let rank = process
            .registry
            .create_rank(RankDefinition::new("vip", "[VIP]"))
            .await
            .unwrap();

        let outcome = listener
            .handle(&mutation(MutationKind::SetPermission, rank.id(), true, false))
            .await;
        assert_eq!(outcome, MessageOutcome::Applied);
        assert!(rank.permission("chat.color").unwrap().allowed);

        let outcome = listener
            .handle(&mutation(MutationKind::RemovePermission, rank.id(), true, false))
            .await;
        assert_eq!(outcome, MessageOutcome::Applied);
        assert!(rank.permission("chat.color").is_none());
    }

    #[tokio::test]
    async fn excluded_ranks_only_track_forced_nodes() {
        let store = MemoryStore::new();
        let origin = TestProcess::with(store.clone(), Default::default(), &[]).await;
        let rank = origin
            .registry
            .create_rank(RankDefinition::new("staff", "[Staff]"))
            .await
            .unwrap();

        let process = TestProcess::with(store, Default::default(), &["staff"]).await;
        let listener = listener(&process);
        let excluded = process.registry.excluded_rank(rank.id()).unwrap();

        // Plain nodes are irrelevant for excluded ranks.
        let outcome = listener
            .handle(&mutation(MutationKind::SetPermission, rank.id(), true, false))
            .await;
        assert_eq!(outcome, MessageOutcome::Ignored);
        assert!(excluded.permission("chat.color").is_none());

        let outcome = listener
            .handle(&mutation(MutationKind::SetPermission, rank.id(), true, true))
            .await;
        assert_eq!(outcome, MessageOutcome::Applied);
        assert!(excluded.permission("chat.color").unwrap().forced);

        // Node stopped being forced, it is removed.
        let outcome = listener
            .handle(&mutation(MutationKind::SetPermission, rank.id(), true, false))
            .await;
        assert_eq!(outcome, MessageOutcome::Applied);
        assert!(excluded.permission("chat.color").is_none());

        let outcome = listener
            .handle(&mutation(MutationKind::RemovePermission, rank.id(), false, false))
            .await;
        assert_eq!(outcome, MessageOutcome::Applied);
    }

    #[tokio::test]
    async fn profile_invalidation_evicts() {
        let process = TestProcess::new().await;
        let identity = process.identity("panda").await;
        let cache = ProfileCache::new(process.registry.clone(), Duration::from_secs(60));
        let listener = InvalidationListener::new(process.registry.clone(), cache.clone());

        cache.get(&identity.uuid).await.unwrap();
        let envelope = Envelope::new(&ProfileInvalidation {
            player_id: identity.uuid,
        })
        .unwrap();
        assert_eq!(listener.handle(&envelope).await, MessageOutcome::Applied);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn identity_invalidation_refreshes_names() {
        let process = TestProcess::new().await;
        let identity = process.identity("panda").await;
        let cache = ProfileCache::new(process.registry.clone(), Duration::from_secs(60));
        let listener = InvalidationListener::new(process.registry.clone(), cache.clone());
        assert_eq!(cache.get(&identity.uuid).await.unwrap().identity().name, "panda");

        // Renamed by another process.
        process
            .store
            .register_identity(&identity.uuid, "red panda")
            .await
            .unwrap();
        assert_eq!(cache.get(&identity.uuid).await.unwrap().identity().name, "panda");

        let envelope = Envelope::new(&IdentityInvalidation {
            uuid: identity.uuid,
        })
        .unwrap();
        assert_eq!(listener.handle(&envelope).await, MessageOutcome::Applied);
        assert_eq!(cache.get(&identity.uuid).await.unwrap().identity().name, "red panda");
    }

    #[tokio::test]
    async fn registry_reload_picks_up_peer_changes() {
        let store = MemoryStore::new();
        let origin = TestProcess::with(store.clone(), Default::default(), &[]).await;
        let process = TestProcess::with(store, Default::default(), &[]).await;
        let identity = process.identity("panda").await;
        let cache = ProfileCache::new(process.registry.clone(), Duration::from_secs(60));
        let listener = InvalidationListener::new(process.registry.clone(), cache.clone());
        cache.get(&identity.uuid).await.unwrap();

        let rank = origin
            .registry
            .create_rank(RankDefinition::new("vip", "[VIP]"))
            .await
            .unwrap();
        assert!(process.registry.rank(rank.id()).is_none());

        let envelope = Envelope::new(&RegistryReload {}).unwrap();
        assert_eq!(listener.handle(&envelope).await, MessageOutcome::Applied);
        assert_eq!(process.registry.rank(rank.id()).unwrap().name(), "vip");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn mismatching_envelopes_are_ignored() {
        let process = TestProcess::new().await;
        let listener = listener(&process);

        let envelope = Envelope {
            message_type: "rank-update".into(),
            version: 2,
            message: json!({ "player-id": "whatever" }),
        };
        assert_eq!(listener.handle(&envelope).await, MessageOutcome::Ignored);

        let envelope = Envelope {
            message_type: "chat-message".into(),
            version: 1,
            message: json!({}),
        };
        assert_eq!(listener.handle(&envelope).await, MessageOutcome::Ignored);
    }
}
