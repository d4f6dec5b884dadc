use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use crate::accessor::chunk::ChunkData;
use crate::core::types::ChunkId;
use crate::core::error::Result;
use crate::storage::chunk::Chunk;

/// Decoded-blob cache. Chunks are immutable, so an entry never goes stale;
/// retired chunks are only dropped to free room.
pub struct ChunkCache {
    pub cache: Mutex<LruCache<ChunkId, Arc<ChunkData>>>,
    pub size_limit: usize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
}

impl ChunkCache {
    pub fn new(size_limit: usize) -> Self {
        let cap = NonZeroUsize::new(size_limit).unwrap_or(NonZeroUsize::MIN);
        ChunkCache {
            cache: Mutex::new(LruCache::new(cap)),
            size_limit,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    pub fn get_or_load(&self, chunk: &Chunk) -> Result<Arc<ChunkData>> {
        if let Some(data) = self.cache.lock().get(&chunk.id) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(data.clone());
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        // Loaded outside the lock; a concurrent miss on the same chunk just loads twice
        let data = Arc::new(chunk.load()?);
        self.cache.lock().put(chunk.id, data.clone());
        Ok(data)
    }

    pub fn invalidate(&self, id: &ChunkId) {
        self.cache.lock().pop(id);
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.lock().len(),
            capacity: self.size_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
