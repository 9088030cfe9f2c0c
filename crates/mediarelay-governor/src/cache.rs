//! Positive cache of fetched asset bytes.
//!
//! Entries live for a fixed TTL from the moment they were stored. Oversized
//! payloads are refused outright, and reaching capacity trims the oldest fifth
//! of the cache before the new entry goes in.

use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::{Duration, Instant};

/// Default lifetime of a cached payload.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 50;

/// Payloads larger than this are never cached.
pub const MAX_ENTRY_BYTES: usize = 500_000;

struct CacheEntry {
    payload: Bytes,
    stored_at: Instant,
}

/// Thread-safe asset cache keyed by asset identity.
pub struct AssetCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
    max_entry_bytes: usize,
}

impl AssetCache {
    pub fn new(ttl: Duration, capacity: usize, max_entry_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            max_entry_bytes,
        }
    }

    /// Cached payload for `key`; an expired entry is evicted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                return Some(entry.payload.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
            tracing::trace!(key, "Cache entry expired");
        }
        None
    }

    /// Store `payload` under `key`. Returns `false` when the payload is too large.
    pub fn set(&self, key: &str, payload: Bytes) -> bool {
        if payload.len() > self.max_entry_bytes {
            tracing::debug!(
                key,
                size = payload.len(),
                limit = self.max_entry_bytes,
                "Payload too large to cache"
            );
            return false;
        }

        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.trim_oldest();
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                stored_at: Instant::now(),
            },
        );
        true
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() <= ttl);
    }

    /// Remove the oldest 20% of entries (at least one).
    fn trim_oldest(&self) {
        let mut ages: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.stored_at))
            .collect();
        ages.sort_by_key(|(_, stored_at)| *stored_at);

        let count = ages.len().div_ceil(5).max(1);
        for (key, _) in ages.into_iter().take(count) {
            self.entries.remove(&key);
        }
        tracing::debug!(evicted = count, "Trimmed asset cache");
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY, MAX_ENTRY_BYTES)
    }
}
