//! Capacity-managed map from request key to cache entry.
//!
//! Lookups are lock-free and creation is an atomic insert-if-absent, so two
//! callers missing on the same key always end up sharing one entry. Once the
//! store grows past its capacity the [`Evictor`] picks whole entries to
//! unlink; operations already holding an evicted entry finish against it
//! undisturbed.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::entry::CacheEntry;
use crate::cache::evictor::Evictor;
use crate::config::CacheConfig;

pub struct CacheStore<K, Id> {
    entries: DashMap<K, Arc<CacheEntry<Id>>>,
    evictor: Evictor,
    max_entries: usize,
    /// Logical clock driving LRU ordering.
    clock: AtomicU64,
    /// Serializes eviction rounds so racing inserts never over-evict.
    evicting: Mutex<()>,
}

impl<K, Id> CacheStore<K, Id>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
{
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            evictor: Evictor::new(config.eviction),
            max_entries: config.max_entries.max(1),
            clock: AtomicU64::new(0),
            evicting: Mutex::new(()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up the entry for `key`, marking it as used.
    pub fn get(&self, key: &K) -> Option<Arc<CacheEntry<Id>>> {
        let entry = self.entries.get(key).map(|e| Arc::clone(e.value()))?;
        entry.touch(self.tick());
        Some(entry)
    }

    /// Look up the entry for `key` without affecting eviction order.
    pub fn peek(&self, key: &K) -> Option<Arc<CacheEntry<Id>>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Return the entry for `key`, creating an empty one if absent.
    ///
    /// Returns the entry and the number of entries evicted to make room.
    pub fn get_or_insert(&self, key: &K) -> (Arc<CacheEntry<Id>>, usize) {
        if let Some(entry) = self.get(key) {
            return (entry, 0);
        }

        let tick = self.tick();
        let (entry, inserted) = match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let entry = Arc::new(CacheEntry::new(tick));
                vacant.insert(Arc::clone(&entry));
                (entry, true)
            }
        };
        entry.touch(tick);

        let evicted = if inserted {
            debug!(key = ?key, "Created cache entry");
            self.evict_overflow(key)
        } else {
            0
        };
        (entry, evicted)
    }

    /// Store `entry` under `key`, replacing any previous entry wholesale.
    pub fn put(&self, key: K, entry: Arc<CacheEntry<Id>>) -> usize {
        entry.touch(self.tick());
        self.entries.insert(key.clone(), entry);
        self.evict_overflow(&key)
    }

    pub fn remove(&self, key: &K) -> Option<Arc<CacheEntry<Id>>> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    /// Unlink `entry` if it is still the one stored for `key` and was never seeded.
    pub fn remove_unseeded(&self, key: &K, entry: &Arc<CacheEntry<Id>>) -> bool {
        self.entries
            .remove_if(key, |_, stored| {
                Arc::ptr_eq(stored, entry) && !stored.is_seeded()
            })
            .is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Evict entries until the store is back within capacity.
    ///
    /// Rounds run one at a time and size themselves under the lock. Only the
    /// caller's own key is protected, so a key inserted concurrently by another
    /// caller may be picked; that caller finishes against its unlinked entry
    /// and the key is seeded again on its next search.
    fn evict_overflow(&self, protected: &K) -> usize {
        let _round = self.evicting.lock();
        let excess = self.entries.len().saturating_sub(self.max_entries);
        if excess == 0 {
            return 0;
        }

        let now = self.clock.load(Ordering::Relaxed);
        let snapshot: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().access_stats()))
            .collect();
        let victims = self
            .evictor
            .select_victims(snapshot.into_iter(), excess, now, Some(protected));

        let mut evicted = 0;
        for victim in victims {
            if self.entries.remove(&victim.key).is_some() {
                evicted += 1;
                debug!(key = ?victim.key, score = victim.score, "Evicted entry");
            }
        }

        if evicted > 0 {
            info!(
                evicted,
                entries = self.entries.len(),
                capacity = self.max_entries,
                policy = ?self.evictor.policy(),
                "Eviction round complete"
            );
        }
        evicted
    }
}
