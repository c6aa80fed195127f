//! Bounded cache from content hashes to computed comparison keys.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Default number of cached keys.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Access-ordered cache mapping a content hash to its comparison key, with
/// least-recently-used eviction once full.
///
/// Content hashes can collide, so a hit may return the key of different
/// content; the cache is strictly a performance aid and the target workload
/// (near-identical messages) makes collisions rare. Eviction scans for the
/// stalest entry, which is acceptable at this capacity.
#[derive(Debug)]
pub struct KeyCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<u64, CacheEntry>,
}

#[derive(Debug)]
struct CacheEntry {
    key: String,
    last_used: u64,
}

impl KeyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::with_capacity(capacity.max(1)),
        }
    }

    /// Hash content the way the cache indexes it.
    pub fn content_hash(content: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a cached key, refreshing its recency on hit.
    pub fn get(&mut self, hash: u64) -> Option<String> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&hash).map(|entry| {
            entry.last_used = tick;
            entry.key.clone()
        })
    }

    /// Insert a computed key, evicting the least-recently-used entry when at
    /// capacity.
    pub fn insert(&mut self, hash: u64, key: String) {
        self.tick += 1;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&hash) {
            let eldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(hash, _)| *hash);
            if let Some(eldest) = eldest {
                self.entries.remove(&eldest);
            }
        }
        self.entries.insert(
            hash,
            CacheEntry {
                key,
                last_used: self.tick,
            },
        );
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
