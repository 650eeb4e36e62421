// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::ranks::NewRankRecord;

/// Macro to run the same test logic against all store backend implementations.
///
/// This macro takes a closure that will be executed against each store type:
/// - In-memory store (`MemoryStore`)
/// - SQLite store (`SqliteStore`)
///
/// All tables are created before the closure runs.
///
/// ## Example
///
/// ```rust
/// # use rankbridge_store::{RankStore, assert_all_stores};
/// # async fn run() {
/// assert_all_stores!(|store| async {
///     assert!(store.ranks().await.unwrap().is_empty());
/// });
/// # }
/// ```
#[macro_export]
macro_rules! assert_all_stores {
    (|$store:ident| $test_body:expr) => {
        // Test with MemoryStore.
        {
            let $store = $crate::memory::MemoryStore::new();
            $crate::test_utils::create_all_tables(&$store).await;
            $test_body.await;
        }

        // Test with SqliteStore.
        {
            let $store = $crate::sqlite::SqliteStore::temporary().await;
            $crate::test_utils::create_all_tables(&$store).await;
            $test_body.await;
        }
    };
}

/// Creates every table declared by this crate.
pub async fn create_all_tables<S: crate::SchemaStore>(store: &S) {
    for table in [
        crate::RANKS_TABLE,
        crate::PERMISSIONS_TABLE,
        crate::ASSIGNMENTS_TABLE,
        crate::IDENTITIES_TABLE,
    ] {
        store
            .create_table(&table)
            .await
            .expect("table could be created");
    }
}

/// Rank row fixture with a prefix derived from the name and no parent.
pub fn new_rank(name: &str, weight: i32) -> NewRankRecord {
    NewRankRecord {
        name: name.to_string(),
        long_prefix: format!("[{name}]"),
        short_prefix: None,
        weight,
        parent_id: None,
        is_default: false,
    }
}
