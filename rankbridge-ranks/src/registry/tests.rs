// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_matches::assert_matches;
use futures_util::StreamExt;
use rankbridge_bus::{MutationKind, PermissionMutation, RegistryReload};
use rankbridge_store::{AssignmentStore, MemoryStore, RankColumn, RankStore};

use crate::error::{DeleteStep, RegistryError, ValidationError};
use crate::rank::RankDefinition;
use crate::test_utils::TestProcess;
use crate::{RankId, RankRegistry};

async fn chain(registry: &RankRegistry<MemoryStore>) -> (RankId, RankId, RankId) {
    let r1 = registry
        .create_rank(RankDefinition::new("owner", "[Owner]").with_weight(100))
        .await
        .unwrap();
    let r2 = registry
        .create_rank(
            RankDefinition::new("admin", "[Admin]")
                .with_weight(50)
                .with_parent(r1.id()),
        )
        .await
        .unwrap();
    let r3 = registry
        .create_rank(
            RankDefinition::new("moderator", "[Mod]")
                .with_weight(10)
                .with_parent(r2.id()),
        )
        .await
        .unwrap();
    (r1.id(), r2.id(), r3.id())
}

#[tokio::test]
async fn transitive_inheritance() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let (r1, r2, r3) = chain(registry).await;

    // Sibling of r2, also inheriting from r1.
    let sibling = registry
        .create_rank(RankDefinition::new("helper", "[Helper]").with_parent(r1))
        .await
        .unwrap();

    registry.set_permission(r1, "world.edit", true, false).await.unwrap();

    let r3 = registry.rank(r3).unwrap();
    assert!(registry.all_permissions(&r3)["world.edit"].allowed);
    assert!(registry.all_permissions(&sibling)["world.edit"].allowed);

    let ancestors: Vec<RankId> = registry
        .parent_chain(&r3)
        .iter()
        .map(|rank| rank.id())
        .collect();
    assert_eq!(ancestors, vec![r2, r1]);

    // Implicit rank permissions are inherited as well.
    let permissions = registry.all_permissions(&r3);
    assert!(permissions.contains_key("ranks.moderator"));
    assert!(permissions.contains_key("ranks.admin"));
    assert!(permissions.contains_key("ranks.owner"));
}

#[tokio::test]
async fn closest_ancestor_wins() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let (r1, r2, r3) = chain(registry).await;

    registry.set_permission(r1, "world.edit", false, false).await.unwrap();
    registry.set_permission(r2, "world.edit", true, false).await.unwrap();

    let r2_rank = registry.rank(r2).unwrap();
    assert!(registry.all_permissions(&r2_rank)["world.edit"].allowed);
    let r3_rank = registry.rank(r3).unwrap();
    assert!(registry.all_permissions(&r3_rank)["world.edit"].allowed);
    let r1_rank = registry.rank(r1).unwrap();
    assert!(!registry.all_permissions(&r1_rank)["world.edit"].allowed);
}

#[tokio::test]
async fn lookups_never_fail() {
    let process = TestProcess::new().await;
    let registry = &process.registry;

    assert!(registry.rank(RankId::new(1)).is_none());
    assert!(registry.rank_by_name("admin").is_none());

    let admin = registry
        .create_rank(RankDefinition::new("admin", "[Admin]"))
        .await
        .unwrap();
    assert_eq!(registry.rank_by_name("admin"), Some(admin.clone()));
    assert_eq!(registry.rank(admin.id()), Some(admin));
}

#[tokio::test]
async fn load_from_storage() {
    let store = MemoryStore::new();
    let origin = TestProcess::with(store.clone(), Default::default(), &[]).await;
    let (r1, _, r3) = chain(&origin.registry).await;
    origin
        .registry
        .set_permission(r1, "Fly", true, true)
        .await
        .unwrap();
    origin.registry.set_default(r3, true).await.unwrap();

    let process = TestProcess::with(store, Default::default(), &["owner"]).await;
    let registry = &process.registry;

    // Excluded ranks are not visible through normal lookups.
    assert!(registry.rank(r1).is_none());
    assert!(registry.rank_by_name("owner").is_none());
    assert!(registry.is_excluded(r1));
    assert!(registry.excluded_rank(r1).unwrap().permission("fly").unwrap().forced);

    assert_eq!(registry.ranks().len(), 2);
    assert_eq!(registry.excluded_ranks().len(), 1);
    let defaults: Vec<RankId> = registry.default_ranks().iter().map(|rank| rank.id()).collect();
    assert_eq!(defaults, vec![r3]);

    // Excluded ranks do not contribute through inheritance.
    let r3 = registry.rank(r3).unwrap();
    assert_eq!(registry.parent_chain(&r3).len(), 1);
    assert!(!registry.all_permissions(&r3).contains_key("fly"));
}

#[tokio::test]
async fn validation_failures_never_write() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let admin = registry
        .create_rank(RankDefinition::new("admin", "[Admin]"))
        .await
        .unwrap();
    let writes = process.store.write_count();

    assert_matches!(
        registry
            .create_rank(RankDefinition::new("admin", "[Other]"))
            .await,
        Err(RegistryError::Validation(ValidationError::DuplicateName(name))) if name == "admin"
    );
    assert_matches!(
        registry.create_rank(RankDefinition::new("  ", "[Empty]")).await,
        Err(RegistryError::Validation(ValidationError::EmptyName))
    );
    assert_matches!(
        registry
            .create_rank(RankDefinition::new("long", &"x".repeat(33)))
            .await,
        Err(RegistryError::Validation(ValidationError::PrefixTooLong(33)))
    );
    assert_matches!(
        registry
            .create_rank(RankDefinition::new("orphan", "[Orphan]").with_parent(RankId::new(99)))
            .await,
        Err(RegistryError::Validation(ValidationError::UnknownParent(_)))
    );
    assert_matches!(
        registry.set_long_prefix(admin.id(), &"y".repeat(40)).await,
        Err(RegistryError::Validation(ValidationError::PrefixTooLong(40)))
    );
    assert_matches!(
        registry.set_short_prefix(admin.id(), Some("")).await,
        Err(RegistryError::Validation(ValidationError::EmptyPrefix))
    );
    assert_matches!(
        registry.set_permission(admin.id(), " ", true, false).await,
        Err(RegistryError::Validation(ValidationError::EmptyPermission))
    );
    assert_matches!(
        registry.set_weight(RankId::new(99), 1).await,
        Err(RegistryError::RankNotFound(_))
    );
    assert_matches!(
        registry.remove_permission(admin.id(), "not.there").await,
        Err(RegistryError::PermissionNotFound { .. })
    );

    assert_eq!(process.store.write_count(), writes);

    // Prefixes count characters, not bytes.
    assert!(
        registry
            .create_rank(RankDefinition::new("umlaut", &"ü".repeat(32)))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn unchanged_values_skip_storage() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let admin = registry
        .create_rank(RankDefinition::new("admin", "[Admin]").with_weight(5))
        .await
        .unwrap();
    registry
        .set_permission(admin.id(), "world.edit", true, false)
        .await
        .unwrap();
    let writes = process.store.write_count();

    registry
        .set_permission(admin.id(), "WORLD.EDIT", true, false)
        .await
        .unwrap();
    registry.set_default(admin.id(), false).await.unwrap();
    registry.set_weight(admin.id(), 5).await.unwrap();
    registry.set_parent(admin.id(), None).await.unwrap();
    registry.set_long_prefix(admin.id(), "[Admin]").await.unwrap();
    registry.set_short_prefix(admin.id(), None).await.unwrap();

    assert_eq!(process.store.write_count(), writes);
}

#[tokio::test]
async fn edits_write_through() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let (r1, r2, _) = chain(registry).await;

    registry.set_weight(r2, 70).await.unwrap();
    registry.set_default(r2, true).await.unwrap();
    registry.set_long_prefix(r2, "&c[Admin]").await.unwrap();
    registry.set_short_prefix(r2, Some("&cA")).await.unwrap();
    registry.set_parent(r2, None).await.unwrap();

    let rank = registry.rank(r2).unwrap();
    assert_eq!(rank.weight(), 70);
    assert!(rank.is_default());
    assert_eq!(rank.long_prefix(), "&c[Admin]");
    assert_eq!(rank.short_prefix(), "&cA");
    assert_eq!(rank.parent(), None);

    let record = process
        .store
        .ranks()
        .await
        .unwrap()
        .into_iter()
        .find(|record| record.id == r2.as_i64())
        .unwrap();
    assert_eq!(record.weight, 70);
    assert!(record.is_default);
    assert_eq!(record.long_prefix, "&c[Admin]");
    assert_eq!(record.short_prefix.as_deref(), Some("&cA"));
    assert_eq!(record.parent_id, None);

    registry.set_short_prefix(r2, None).await.unwrap();
    assert_eq!(rank.short_prefix(), "&c[Admin]");

    registry.set_parent(r2, Some(r1)).await.unwrap();
    assert_eq!(rank.parent(), Some(r1));
}

#[tokio::test]
async fn reject_parent_cycles() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let (r1, r2, r3) = chain(registry).await;
    let writes = process.store.write_count();

    assert_matches!(
        registry.set_parent(r1, Some(r3)).await,
        Err(RegistryError::Validation(ValidationError::ParentCycle { .. }))
    );
    assert_matches!(
        registry.set_parent(r2, Some(r2)).await,
        Err(RegistryError::Validation(ValidationError::ParentCycle { .. }))
    );
    assert_eq!(process.store.write_count(), writes);
    assert_eq!(registry.rank(r1).unwrap().parent(), None);
}

#[tokio::test]
async fn cyclic_data_terminates() {
    let store = MemoryStore::new();
    let origin = TestProcess::with(store.clone(), Default::default(), &[]).await;
    let (r1, _, r3) = chain(&origin.registry).await;

    // Corrupt the data behind the registry's back.
    store
        .update_rank(r1.as_i64(), &RankColumn::Parent(Some(r3.as_i64())))
        .await
        .unwrap();

    let process = TestProcess::with(store, Default::default(), &[]).await;
    let r3 = process.registry.rank(r3).unwrap();
    assert_eq!(process.registry.parent_chain(&r3).len(), 2);
    assert!(
        process
            .registry
            .all_permissions(&r3)
            .contains_key("ranks.owner")
    );
}

#[tokio::test]
async fn delete_rank() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let (r1, r2, _) = chain(registry).await;
    registry.set_permission(r2, "kick", true, false).await.unwrap();
    process.store.assign_rank(1, r2.as_i64()).await.unwrap();

    let handle = registry.rank(r2).unwrap();
    let weak = handle.downgrade();

    registry.delete_rank(r2).await.unwrap();

    assert!(registry.rank(r2).is_none());
    assert!(registry.rank_by_name("admin").is_none());
    assert!(handle.is_retired());
    assert!(weak.upgrade().is_none());
    assert!(process.store.assigned_ranks(1).await.unwrap().is_empty());
    assert!(
        process
            .store
            .permissions()
            .await
            .unwrap()
            .iter()
            .all(|node| node.rank_id != r2.as_i64())
    );
    assert!(registry.rank(r1).is_some());

    assert_matches!(
        registry.delete_rank(r2).await,
        Err(RegistryError::RankNotFound(_))
    );
}

#[tokio::test]
async fn partial_delete_names_failed_step() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let (_, r2, _) = chain(registry).await;

    // First delete write (assignments) succeeds, second (permissions) fails.
    process
        .store
        .fail_nth_write(process.store.write_count() + 2);
    assert_matches!(
        registry.delete_rank(r2).await,
        Err(RegistryError::PartialDelete {
            step: DeleteStep::Permissions,
            ..
        })
    );

    // Nothing changed in memory.
    assert!(registry.rank(r2).is_some());
    assert_eq!(process.store.ranks().await.unwrap().len(), 3);

    // Retrying finishes the job.
    registry.delete_rank(r2).await.unwrap();
    assert!(registry.rank(r2).is_none());
}

#[tokio::test]
async fn storage_failures_leave_memory_untouched() {
    let process = TestProcess::new().await;
    let registry = &process.registry;
    let admin = registry
        .create_rank(RankDefinition::new("admin", "[Admin]"))
        .await
        .unwrap();

    process.store.fail_writes(true);
    assert_matches!(
        registry.set_weight(admin.id(), 9).await,
        Err(RegistryError::Storage(_))
    );
    assert_matches!(
        registry.set_permission(admin.id(), "fly", true, false).await,
        Err(RegistryError::Storage(_))
    );
    assert_matches!(
        registry.create_rank(RankDefinition::new("guest", "[Guest]")).await,
        Err(RegistryError::Storage(_))
    );

    assert_eq!(admin.weight(), 0);
    assert!(admin.permission("fly").is_none());
    assert!(registry.rank_by_name("guest").is_none());
}

#[tokio::test]
async fn mutations_are_announced() {
    let process = TestProcess::new().await;
    let mut subscription = process.subscribe().await;
    let registry = &process.registry;

    let admin = registry
        .create_rank(RankDefinition::new("admin", "[Admin]"))
        .await
        .unwrap();
    assert!(subscription.next().await.unwrap().is::<RegistryReload>());

    registry
        .set_permission(admin.id(), "Chat.Color", true, true)
        .await
        .unwrap();
    let message = subscription
        .next()
        .await
        .unwrap()
        .decode_body::<PermissionMutation>()
        .unwrap()
        .unwrap();
    assert_eq!(
        message,
        PermissionMutation {
            message_type: MutationKind::SetPermission,
            rank_id: admin.id().as_i64(),
            permission: "chat.color".into(),
            is_allowed: true,
            forced: true,
        }
    );

    registry.remove_permission(admin.id(), "chat.color").await.unwrap();
    let message = subscription
        .next()
        .await
        .unwrap()
        .decode_body::<PermissionMutation>()
        .unwrap()
        .unwrap();
    assert_eq!(message.message_type, MutationKind::RemovePermission);

    registry.set_weight(admin.id(), 3).await.unwrap();
    assert!(subscription.next().await.unwrap().is::<RegistryReload>());
}

#[tokio::test]
async fn publish_failures_do_not_fail_mutations() {
    let process = TestProcess::new().await;
    process.transport.fail_publish(true);

    let admin = process
        .registry
        .create_rank(RankDefinition::new("admin", "[Admin]"))
        .await
        .unwrap();
    process
        .registry
        .set_permission(admin.id(), "fly", true, false)
        .await
        .unwrap();
    assert!(admin.permission("fly").is_some());
}

#[tokio::test]
async fn reload_updates_handles_in_place() {
    let store = MemoryStore::new();
    let origin = TestProcess::with(store.clone(), Default::default(), &[]).await;
    let process = TestProcess::with(store, Default::default(), &[]).await;

    let admin = origin
        .registry
        .create_rank(RankDefinition::new("admin", "[Admin]"))
        .await
        .unwrap();
    process.registry.reload().await.unwrap();
    let handle = process.registry.rank(admin.id()).unwrap();

    origin.registry.set_weight(admin.id(), 42).await.unwrap();
    origin
        .registry
        .set_permission(admin.id(), "fly", true, false)
        .await
        .unwrap();
    process.registry.reload().await.unwrap();

    // Same handle, new values.
    assert_eq!(handle.weight(), 42);
    assert!(handle.permission("fly").is_some());
    assert_eq!(process.registry.rank(admin.id()), Some(handle.clone()));

    origin.registry.delete_rank(admin.id()).await.unwrap();
    process.registry.reload().await.unwrap();
    assert!(handle.is_retired());
    assert!(process.registry.rank(admin.id()).is_none());
}
