//! Bounded in-process LRU tier with a tag index.
//!
//! The entry map and the tag -> keys index live behind one mutex, so every
//! insert, delete and eviction updates both together: the index never names
//! a key the map does not hold, and every tag of a held entry is indexed.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use super::{CacheTier, TierKind};
use crate::entry::{CacheEntry, now_millis};
use crate::error::TierError;

/// Statistics for the local tier.
#[derive(Debug, Clone, Default)]
pub struct LocalTierStats {
    /// Number of entries currently held.
    pub entries: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room for new ones.
    pub evictions: u64,
}

impl LocalTierStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct LocalState {
    entries: LruCache<String, CacheEntry>,
    tag_index: HashMap<String, HashSet<String>>,
}

impl LocalState {
    fn index(&mut self, entry: &CacheEntry) {
        for tag in &entry.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(entry.key.clone());
        }
    }

    fn unindex(&mut self, entry: &CacheEntry) {
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(&entry.key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.unindex(&entry);
        Some(entry)
    }
}

/// In-process LRU tier.
///
/// `get` counts as an access and refreshes recency. When the tier is full the
/// least recently accessed entry is evicted before the new one goes in.
pub struct LocalTier {
    state: Mutex<LocalState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalTier {
    /// Create a local tier holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(LocalState {
                entries: LruCache::new(capacity),
                tag_index: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Create a local tier from a plain capacity, treating 0 as 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    /// Get an entry, dropping it if it is past hard expiry.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let now = now_millis();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            Some(entry) if entry.expire_at > now => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert an entry. Returns the key evicted to make room, if any.
    pub fn insert(&self, entry: CacheEntry) -> Option<String> {
        let mut state = self.state.lock();

        // Replacing an entry must drop the old tag memberships first.
        state.remove(&entry.key);
        state.index(&entry);

        let evicted = state.entries.push(entry.key.clone(), entry);
        let (evicted_key, evicted_entry) = evicted?;
        state.unindex(&evicted_entry);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_eviction();
        tracing::trace!(key = %evicted_key, "local tier evicted least recently used entry");
        Some(evicted_key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every entry tagged `tag`.
    pub fn remove_by_tag(&self, tag: &str) -> usize {
        let mut state = self.state.lock();
        let Some(keys) = state.tag_index.remove(tag) else {
            return 0;
        };
        keys.iter().filter(|key| state.remove(key).is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.tag_index.clear();
    }

    pub fn stats(&self) -> LocalTierStats {
        let (entries, capacity) = {
            let state = self.state.lock();
            (state.entries.len(), state.entries.cap().get())
        };
        LocalTierStats {
            entries,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn assert_index_consistent(&self) {
        let state = self.state.lock();
        for (tag, keys) in &state.tag_index {
            assert!(!keys.is_empty(), "empty key set left for tag {tag}");
            for key in keys {
                let entry = state
                    .entries
                    .peek(key.as_str())
                    .unwrap_or_else(|| panic!("tag {tag} references missing key {key}"));
                assert!(entry.tags.contains(tag));
            }
        }
        for (key, entry) in state.entries.iter() {
            for tag in &entry.tags {
                assert!(
                    state.tag_index.get(tag).is_some_and(|keys| keys.contains(key)),
                    "key {key} missing from index of tag {tag}"
                );
            }
        }
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    fn kind(&self) -> TierKind {
        TierKind::Local
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, TierError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), TierError> {
        self.insert(entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, TierError> {
        Ok(self.remove(key))
    }

    async fn delete_by_tag(&self, tag: &str) -> Result<usize, TierError> {
        Ok(self.remove_by_tag(tag))
    }
}
