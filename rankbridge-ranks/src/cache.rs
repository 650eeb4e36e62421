// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expiring, read-through cache of rank profiles.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use rankbridge_store::{ASSIGNMENTS_TABLE, EntityLoader, LoadError, Store};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::profile::RankProfile;
use crate::registry::RankRegistry;

/// Time after which cached profiles are considered stale.
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(10 * 60);

struct CacheEntry<S> {
    profile: Arc<RankProfile<S>>,
    inserted_at: Instant,
}

impl<S> CacheEntry<S> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

/// Profiles of identities, keyed by their uuid.
///
/// Misses load the profile through the [`EntityLoader`]. Concurrent misses for the same identity
/// are collapsed into one load, so there is at most one profile object per identity in the
/// cache. Only successful loads are cached.
///
/// Entries expire after the configured time to live. Expiry is the fallback for invalidation
/// messages which never arrived.
pub struct ProfileCache<S> {
    inner: Arc<CacheInner<S>>,
}

struct CacheInner<S> {
    registry: RankRegistry<S>,
    loader: EntityLoader<S>,
    ttl: Duration,
    entries: DashMap<Uuid, CacheEntry<S>>,
    gates: DashMap<Uuid, Arc<LoadGate>>,
}

/// Collapses concurrent loads of one identity.
#[derive(Default)]
struct LoadGate {
    lock: Mutex<()>,
    /// Bumped on every invalidation of the identity, loads racing with one are returned but not
    /// cached.
    epoch: AtomicU64,
}

impl LoadGate {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

impl<S> Clone for ProfileCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> ProfileCache<S>
where
    S: Store,
{
    pub fn new(registry: RankRegistry<S>, ttl: Duration) -> Self {
        let loader = EntityLoader::new(registry.store().clone());
        Self {
            inner: Arc::new(CacheInner {
                registry,
                loader,
                ttl,
                entries: DashMap::new(),
                gates: DashMap::new(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Returns the cached profile or loads it from storage.
    pub async fn get(&self, uuid: &Uuid) -> Result<Arc<RankProfile<S>>, LoadError> {
        if let Some(profile) = self.get_if_present(uuid) {
            return Ok(profile);
        }

        let gate = self.gate(uuid);
        let result = {
            let _guard = gate.lock.lock().await;

            // Another caller might have loaded it while we were waiting.
            if let Some(profile) = self.get_if_present(uuid) {
                Ok(profile)
            } else {
                self.load(uuid, &gate).await
            }
        };

        // Map and our handle are the only references left when nobody else is waiting.
        self.inner
            .gates
            .remove_if(uuid, |_, gate| Arc::strong_count(gate) <= 2);
        drop(gate);

        result
    }

    fn gate(&self, uuid: &Uuid) -> Arc<LoadGate> {
        self.inner.gates.entry(*uuid).or_default().clone()
    }

    async fn load(&self, uuid: &Uuid, gate: &LoadGate) -> Result<Arc<RankProfile<S>>, LoadError> {
        let epoch = gate.epoch();
        let registry = self.inner.registry.clone();

        let profile = self
            .inner
            .loader
            .load(&[ASSIGNMENTS_TABLE], uuid, |identity| {
                RankProfile::load(registry, identity)
            })
            .await?;
        let profile = Arc::new(profile);
        self.store_loaded(uuid, gate, epoch, profile.clone());
        Ok(profile)
    }

    /// Caches a loaded profile unless the identity was invalidated since `epoch` was read.
    ///
    /// The entry is inserted first and removed again when the epoch moved, an invalidation
    /// running concurrently either sees the entry or is seen by the second check.
    fn store_loaded(
        &self,
        uuid: &Uuid,
        gate: &LoadGate,
        epoch: u64,
        profile: Arc<RankProfile<S>>,
    ) -> bool {
        if gate.epoch() == epoch {
            self.inner.entries.insert(
                *uuid,
                CacheEntry {
                    profile: profile.clone(),
                    inserted_at: Instant::now(),
                },
            );
            if gate.epoch() == epoch {
                trace!(identity = %uuid, "cached profile");
                return true;
            }
            self.inner
                .entries
                .remove_if(uuid, |_, entry| Arc::ptr_eq(&entry.profile, &profile));
        }
        trace!(identity = %uuid, "profile was invalidated while loading, not caching it");
        false
    }

    /// Returns the cached profile if present and not expired.
    pub fn get_if_present(&self, uuid: &Uuid) -> Option<Arc<RankProfile<S>>> {
        let ttl = self.inner.ttl;
        {
            let entry = self.inner.entries.get(uuid)?;
            if entry.is_fresh(ttl) {
                return Some(entry.profile.clone());
            }
        }

        self.inner
            .entries
            .remove_if(uuid, |_, entry| !entry.is_fresh(ttl));
        trace!(identity = %uuid, "evicted expired profile");
        None
    }

    /// Drops the cached profile of an identity, returns `true` if there was one.
    pub fn invalidate(&self, uuid: &Uuid) -> bool {
        if let Some(gate) = self.inner.gates.get(uuid) {
            gate.bump();
        }
        let removed = self.inner.entries.remove(uuid).is_some();
        debug!(identity = %uuid, removed, "invalidated profile");
        removed
    }

    pub fn invalidate_all(&self) {
        for gate in self.inner.gates.iter() {
            gate.bump();
        }
        self.inner.entries.clear();
        debug!("invalidated all profiles");
    }

    /// Removes all expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.inner.ttl;
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| entry.is_fresh(ttl));
        self.inner.registry.prune_identity_writers();
        before.saturating_sub(self.inner.entries.len())
    }

    /// Resolves every cached profile again against the registry.
    pub async fn reload_all(&self) {
        let profiles: Vec<Arc<RankProfile<S>>> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.profile.clone())
            .collect();

        for profile in profiles {
            profile.reload().await;
        }
    }

    /// Number of cached entries, including expired ones which were not purged yet.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use rankbridge_store::{AssignmentStore, LoadError};
    use uuid::Uuid;

    use crate::profile::RankProfile;
    use crate::rank::RankDefinition;
    use crate::test_utils::TestProcess;

    use super::ProfileCache;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn read_through() {
        let process = TestProcess::new().await;
        let identity = process.identity("panda").await;
        let cache = ProfileCache::new(process.registry.clone(), TTL);

        assert!(cache.get_if_present(&identity.uuid).is_none());
        let first = cache.get(&identity.uuid).await.unwrap();
        let second = cache.get(&identity.uuid).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let process = TestProcess::new().await;
        let cache = ProfileCache::new(process.registry.clone(), TTL);

        let unknown = Uuid::new_v4();
        assert_matches!(
            cache.get(&unknown).await,
            Err(LoadError::IdentityNotFound(_))
        );
        assert!(cache.is_empty());

        let identity = process.identity("panda").await;
        process.store.fail_reads(true);
        assert!(cache.get(&identity.uuid).await.is_err());
        assert!(cache.is_empty());

        process.store.fail_reads(false);
        assert!(cache.get(&identity.uuid).await.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_fresh_load() {
        let process = TestProcess::new().await;
        let identity = process.identity("panda").await;
        let rank = process
            .registry
            .create_rank(RankDefinition::new("vip", "[VIP]"))
            .await
            .unwrap();
        let cache = ProfileCache::new(process.registry.clone(), TTL);

        let profile = cache.get(&identity.uuid).await.unwrap();
        assert!(profile.ranks().is_empty());

        // Another process assigned the rank behind our back.
        process
            .store
            .assign_rank(identity.id, rank.id().as_i64())
            .await
            .unwrap();
        assert!(cache.get(&identity.uuid).await.unwrap().ranks().is_empty());

        assert!(cache.invalidate(&identity.uuid));
        assert!(!cache.invalidate(&identity.uuid));
        let profile = cache.get(&identity.uuid).await.unwrap();
        assert_eq!(profile.ranks(), vec![rank]);
    }

    #[tokio::test]
    async fn invalidate_all() {
        let process = TestProcess::new().await;
        let cache = ProfileCache::new(process.registry.clone(), TTL);
        for name in ["panda", "turtle", "penguin"] {
            let identity = process.identity(name).await;
            cache.get(&identity.uuid).await.unwrap();
        }
        assert_eq!(cache.len(), 3);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let process = TestProcess::new().await;
        let identity = process.identity("panda").await;
        let other = process.identity("turtle").await;
        let cache = ProfileCache::new(process.registry.clone(), TTL);

        let first = cache.get(&identity.uuid).await.unwrap();
        tokio::time::advance(TTL / 2).await;
        cache.get(&other.uuid).await.unwrap();
        assert!(cache.get_if_present(&identity.uuid).is_some());

        tokio::time::advance(TTL / 2).await;
        assert!(cache.get_if_present(&identity.uuid).is_none());
        assert_eq!(cache.len(), 1);

        // Expired entries are loaded again.
        let second = cache.get(&identity.uuid).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        tokio::time::advance(TTL).await;
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_profile() {
        let process = TestProcess::new().await;
        let identity = process.identity("panda").await;
        let cache = ProfileCache::new(process.registry.clone(), TTL);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let uuid = identity.uuid;
                tokio::spawn(async move { cache.get(&uuid).await.unwrap() })
            })
            .collect();

        let mut profiles = Vec::new();
        for handle in handles {
            profiles.push(handle.await.unwrap());
        }
        assert!(
            profiles
                .windows(2)
                .all(|pair| Arc::ptr_eq(&pair[0], &pair[1]))
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn reload_all_picks_up_registry_changes() {
        let process = TestProcess::new().await;
        let identity = process.identity("panda").await;
        let cache = ProfileCache::new(process.registry.clone(), TTL);

        let profile = cache.get(&identity.uuid).await.unwrap();
        assert!(profile.ranks().is_empty());

        let rank = process
            .registry
            .create_rank(RankDefinition::new("guest", "[Guest]").with_default(true))
            .await
            .unwrap();
        cache.reload_all().await;
        assert_eq!(profile.ranks(), vec![rank]);
    }

    #[tokio::test]
    async fn invalidations_only_discard_loads_of_the_same_identity() {
        let process = TestProcess::new().await;
        let panda = process.identity("panda").await;
        let turtle = process.identity("turtle").await;
        let cache = ProfileCache::new(process.registry.clone(), TTL);

        let gate = cache.gate(&panda.uuid);
        let epoch = gate.epoch();
        let profile = Arc::new(
            RankProfile::load(process.registry.clone(), panda.clone())
                .await
                .unwrap(),
        );

        // Another identity got invalidated while loading.
        cache.invalidate(&turtle.uuid);
        assert!(cache.store_loaded(&panda.uuid, &gate, epoch, profile.clone()));
        assert!(cache.get_if_present(&panda.uuid).is_some());

        // The identity itself got invalidated while loading.
        let epoch = gate.epoch();
        cache.invalidate(&panda.uuid);
        assert!(!cache.store_loaded(&panda.uuid, &gate, epoch, profile.clone()));
        assert!(cache.get_if_present(&panda.uuid).is_none());

        let epoch = gate.epoch();
        cache.invalidate_all();
        assert!(!cache.store_loaded(&panda.uuid, &gate, epoch, profile));
        assert!(cache.is_empty());
    }
}
