//! LRU cache for decoded tile chunks.

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::types::{CacheStats, SAMPLE_BYTES};

/// Cache key for chunks: (tile_id, chunk_x, chunk_y).
pub type ChunkKey = (u64, usize, usize);

/// LRU cache for decoded chunks with memory-bounded eviction.
///
/// One cache serves every tile a store has opened, so chunks reached through
/// cross-tile lookups compete for the same budget as the primary tile.
pub struct ChunkCache {
    cache: LruCache<ChunkKey, Vec<f32>>,
    memory_limit: usize,
    current_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ChunkCache {
    /// Create a new chunk cache with the given memory limit in bytes.
    ///
    /// `chunk_bytes` sizes the entry bound so the LRU never tracks more keys
    /// than the budget can hold.
    pub fn new(memory_limit: usize, chunk_bytes: usize) -> Self {
        let max_entries = (memory_limit / chunk_bytes.max(1)).max(16);

        Self {
            cache: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
            memory_limit,
            current_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Try to get a chunk from the cache.
    ///
    /// Returns `Some(data)` if found (cache hit), `None` if not found (cache miss).
    pub fn get(&mut self, key: &ChunkKey) -> Option<&[f32]> {
        if self.cache.contains(key) {
            self.hits += 1;
            self.cache.get(key).map(Vec::as_slice)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Return the cached chunk, loading and inserting it on a miss.
    ///
    /// A failed load (`None`) is not cached, so the next access retries.
    pub fn get_or_load<F>(&mut self, key: ChunkKey, load: F) -> Option<&[f32]>
    where
        F: FnOnce() -> Option<Vec<f32>>,
    {
        if self.cache.contains(&key) {
            self.hits += 1;
            return self.cache.get(&key).map(Vec::as_slice);
        }

        self.misses += 1;
        let data = load()?;
        self.insert(key, data);
        self.cache.get(&key).map(Vec::as_slice)
    }

    /// Check if a key exists in the cache without updating LRU order.
    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a chunk into the cache.
    ///
    /// If the cache is at capacity, the least recently used entries
    /// will be evicted to make room.
    pub fn insert(&mut self, key: ChunkKey, data: Vec<f32>) {
        let data_size = data.len() * SAMPLE_BYTES;

        if let Some(previous) = self.cache.pop(&key) {
            self.current_memory = self
                .current_memory
                .saturating_sub(previous.len() * SAMPLE_BYTES);
        }

        while self.current_memory + data_size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                let evicted_size = evicted.len() * SAMPLE_BYTES;
                self.current_memory = self.current_memory.saturating_sub(evicted_size);
                self.evictions += 1;
            }
        }

        if data_size <= self.memory_limit {
            // The entry bound can also push out the LRU entry.
            if let Some((_, evicted)) = self.cache.push(key, data) {
                self.current_memory = self
                    .current_memory
                    .saturating_sub(evicted.len() * SAMPLE_BYTES);
                self.evictions += 1;
            }
            self.current_memory += data_size;
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions,
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Get the memory limit in bytes.
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Stable identifier for a tile file, used as the first component of a
/// [`ChunkKey`] to keep chunks of different tiles apart.
pub fn tile_id(filename: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    filename.hash(&mut hasher);
    hasher.finish()
}
