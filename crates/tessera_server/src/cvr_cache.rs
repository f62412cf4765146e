//! CVR snapshot cache.
//!
//! Snapshots are write-once and addressed by the opaque `cvrID` carried in
//! pull cookies. Entries expire after a time-to-live and the least recently
//! used entries are evicted once the cache is full. A missing snapshot only
//! costs the client a full resync.

use crate::error::{ServerError, ServerResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tessera_protocol::{Cvr, CvrId};
use tracing::trace;

/// Key-value storage for CVR snapshots.
pub trait CvrCache: Send + Sync {
    /// Looks up a snapshot. Expired or evicted snapshots read as `None`.
    fn get(&self, id: &CvrId) -> ServerResult<Option<Cvr>>;

    /// Stores a snapshot under a fresh id.
    fn put(&self, id: CvrId, cvr: &Cvr) -> ServerResult<()>;
}

struct Entry {
    /// CBOR-encoded snapshot.
    bytes: Vec<u8>,
    stored_at: Instant,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CvrId, Entry>,
    /// Recency index: last-use tick to id.
    recency: BTreeMap<u64, CvrId>,
    tick: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, id: &CvrId) {
        if let Some(entry) = self.entries.remove(id) {
            self.recency.remove(&entry.tick);
        }
    }
}

/// In-process [`CvrCache`] with TTL expiry and LRU eviction.
pub struct MemoryCvrCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
}

impl MemoryCvrCache {
    /// Creates a cache.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns the number of stored snapshots, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if no snapshots are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired snapshot and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<CvrId> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.stored_at.elapsed() >= self.ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            inner.remove(id);
        }
        expired.len()
    }
}

impl CvrCache for MemoryCvrCache {
    fn get(&self, id: &CvrId) -> ServerResult<Option<Cvr>> {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        let Some(entry) = inner.entries.get_mut(id) else {
            return Ok(None);
        };
        if entry.stored_at.elapsed() >= self.ttl {
            inner.remove(id);
            trace!(cvr = %id, "snapshot expired");
            return Ok(None);
        }

        let previous = std::mem::replace(&mut entry.tick, tick);
        let cvr = ciborium::from_reader::<Cvr, _>(entry.bytes.as_slice())
            .map_err(|e| ServerError::Cache(format!("corrupt snapshot {id}: {e}")))?;
        inner.recency.remove(&previous);
        inner.recency.insert(tick, id.clone());
        Ok(Some(cvr))
    }

    fn put(&self, id: CvrId, cvr: &Cvr) -> ServerResult<()> {
        let mut bytes = Vec::new();
        ciborium::into_writer(cvr, &mut bytes)
            .map_err(|e| ServerError::Cache(format!("encode snapshot {id}: {e}")))?;

        let mut inner = self.inner.lock();
        inner.remove(&id);
        while inner.entries.len() >= self.capacity {
            let Some((_, oldest)) = inner.recency.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
            trace!(cvr = %oldest, "snapshot evicted");
        }

        let tick = inner.next_tick();
        inner.recency.insert(tick, id.clone());
        inner.entries.insert(
            id,
            Entry {
                bytes,
                stored_at: Instant::now(),
                tick,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(version: u64) -> Cvr {
        let mut collections = BTreeMap::new();
        collections.insert(
            "progress".to_string(),
            BTreeMap::from([("p".to_string(), version)]),
        );
        serde_json::from_value(serde_json::to_value(collections).unwrap()).unwrap()
    }

    fn cache(capacity: usize) -> MemoryCvrCache {
        MemoryCvrCache::new(Duration::from_secs(3600), capacity)
    }

    #[test]
    fn stores_and_returns_snapshots() {
        let cache = cache(10);
        let id = CvrId::new("a");
        cache.put(id.clone(), &snapshot(3)).unwrap();
        assert_eq!(cache.get(&id).unwrap(), Some(snapshot(3)));
        assert_eq!(cache.get(&CvrId::new("missing")).unwrap(), None);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = cache(2);
        cache.put(CvrId::new("a"), &snapshot(1)).unwrap();
        cache.put(CvrId::new("b"), &snapshot(2)).unwrap();
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get(&CvrId::new("a")).unwrap().is_some());
        cache.put(CvrId::new("c"), &snapshot(3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CvrId::new("a")).unwrap().is_some());
        assert!(cache.get(&CvrId::new("b")).unwrap().is_none());
        assert!(cache.get(&CvrId::new("c")).unwrap().is_some());
    }

    #[test]
    fn expired_snapshots_read_as_missing() {
        let cache = MemoryCvrCache::new(Duration::ZERO, 10);
        cache.put(CvrId::new("a"), &snapshot(1)).unwrap();
        cache.put(CvrId::new("b"), &snapshot(2)).unwrap();
        assert!(cache.get(&CvrId::new("a")).unwrap().is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
