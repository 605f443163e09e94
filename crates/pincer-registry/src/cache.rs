//! A short, in-process cache of the index plus a materialized
//! `adapterId -> active manifest` map, for the `getAdapterAction` hot path.
//!
//! Per the Concurrency & Resource Model, this is an isolate-local,
//! best-effort cache: any write through [`crate::Registry`] invalidates it
//! immediately, and a miss just re-reads from the KV store. Cross-process
//! staleness up to [`TTL`] is accepted by design, not a bug.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use pincer_manifest::Manifest;

use crate::types::RegistryIndex;

/// How long a cached snapshot remains valid before a fresh read is forced.
const TTL: Duration = Duration::from_secs(10);

struct Snapshot {
    index: RegistryIndex,
    manifests: BTreeMap<String, Manifest>,
    fetched_at: Instant,
}

/// The read cache. `None` means "no valid snapshot"; callers repopulate it
/// after a miss.
pub struct ReadCache {
    inner: Mutex<Option<Snapshot>>,
}

impl Default for ReadCache {
    fn default() -> Self {
        ReadCache { inner: Mutex::new(None) }
    }
}

impl ReadCache {
    /// Return the cached `(index, manifests)` pair if it is still fresh.
    pub fn get(&self) -> Option<(RegistryIndex, BTreeMap<String, Manifest>)> {
        let guard = self.inner.lock().expect("read cache mutex poisoned");
        let snapshot = guard.as_ref()?;
        if snapshot.fetched_at.elapsed() > TTL {
            return None;
        }
        Some((snapshot.index.clone(), snapshot.manifests.clone()))
    }

    /// Replace the cached snapshot.
    pub fn store(&self, index: RegistryIndex, manifests: BTreeMap<String, Manifest>) {
        let mut guard = self.inner.lock().expect("read cache mutex poisoned");
        *guard = Some(Snapshot { index, manifests, fetched_at: Instant::now() });
    }

    /// Drop any cached snapshot. Called after every registry write.
    pub fn invalidate(&self) {
        let mut guard = self.inner.lock().expect("read cache mutex poisoned");
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let cache = ReadCache::default();
        assert!(cache.get().is_none());
    }

    #[test]
    fn store_then_get_round_trips() {
        let cache = ReadCache::default();
        cache.store(RegistryIndex::default(), BTreeMap::new());
        assert!(cache.get().is_some());
    }

    #[test]
    fn invalidate_clears_the_snapshot() {
        let cache = ReadCache::default();
        cache.store(RegistryIndex::default(), BTreeMap::new());
        cache.invalidate();
        assert!(cache.get().is_none());
    }
}
