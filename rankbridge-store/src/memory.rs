// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage backend.
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::StoreError;
use crate::identities::IdentityRecord;
use crate::ranks::{PermissionRecord, RankRecord};

/// In-memory store.
///
/// This does not persist data permamently, all changes are lost when the process ends. Use this
/// only in development or test contexts.
///
/// Cloned instances share the same state, similar to multiple connections into one database.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    pub(crate) tables: HashSet<&'static str>,
    pub(crate) ranks: BTreeMap<i64, RankRecord>,
    pub(crate) last_rank_id: i64,
    pub(crate) permissions: BTreeMap<(i64, String), PermissionRecord>,
    pub(crate) assignments: Vec<(i64, i64)>,
    pub(crate) identities: BTreeMap<i64, IdentityRecord>,
    pub(crate) last_identity_id: i64,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    write_count: u64,
    fail_writes: bool,
    fail_nth_write: Option<u64>,
    fail_reads: bool,
    fail_schema: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock()
    }
}

impl MemoryState {
    /// Accounts for a write statement, fails when a write fault was injected.
    pub(crate) fn begin_write(&mut self) -> Result<(), StoreError> {
        self.faults.write_count += 1;
        if self.faults.fail_writes || self.faults.fail_nth_write == Some(self.faults.write_count) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    pub(crate) fn begin_read(&self) -> Result<(), StoreError> {
        if self.faults.fail_reads {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }

    pub(crate) fn begin_schema(&self) -> Result<(), StoreError> {
        if self.faults.fail_schema {
            return Err(StoreError::Unavailable("injected schema failure".into()));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test_utils"))]
impl MemoryStore {
    /// Number of write statements attempted against this store, including failed ones.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().faults.write_count
    }

    /// Let every following write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().faults.fail_writes = fail;
    }

    /// Let the n-th write (counted from the first write ever attempted, starting at 1) fail.
    pub fn fail_nth_write(&self, n: u64) {
        self.inner.lock().faults.fail_nth_write = Some(n);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().faults.fail_reads = fail;
    }

    pub fn fail_schema(&self, fail: bool) {
        self.inner.lock().faults.fail_schema = fail;
    }

    /// Returns `true` if the table was created in this store.
    pub fn has_table(&self, name: &str) -> bool {
        self.inner.lock().tables.contains(name)
    }
}

// Trait implementations are in the regarding modules, see for example `ranks` or `identities`.
