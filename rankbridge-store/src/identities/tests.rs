// SPDX-License-Identifier: MIT OR Apache-2.0

use uuid::Uuid;

use crate::assert_all_stores;
use crate::identities::IdentityStore;

#[tokio::test]
async fn register_and_lookup() {
    assert_all_stores!(|store| async {
        let uuid = Uuid::new_v4();
        assert_eq!(store.identity_by_uuid(&uuid).await.unwrap(), None);

        let identity = store.register_identity(&uuid, "panda").await.unwrap();
        assert_eq!(identity.uuid, uuid);
        assert_eq!(identity.name, "panda");

        assert_eq!(
            store.identity_by_uuid(&uuid).await.unwrap(),
            Some(identity.clone())
        );
        assert_eq!(
            store.identity_by_id(identity.id).await.unwrap(),
            Some(identity.clone())
        );

        // Registering again returns the same row.
        let again = store.register_identity(&uuid, "panda").await.unwrap();
        assert_eq!(again, identity);

        let other = store
            .register_identity(&Uuid::new_v4(), "turtle")
            .await
            .unwrap();
        assert_ne!(other.id, identity.id);
    });
}

#[tokio::test]
async fn register_updates_changed_name() {
    assert_all_stores!(|store| async {
        let uuid = Uuid::new_v4();
        let identity = store.register_identity(&uuid, "panda").await.unwrap();
        let renamed = store.register_identity(&uuid, "red-panda").await.unwrap();

        assert_eq!(renamed.id, identity.id);
        assert_eq!(renamed.name, "red-panda");
        assert_eq!(
            store.identity_by_id(identity.id).await.unwrap().unwrap().name,
            "red-panda"
        );
    });
}
