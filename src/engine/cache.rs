//! Decoded-plane cache.
//!
//! Planes produced by a non-direct codec (LZO blocks, run-length streams,
//! bit unpacking, demosaicing) are expensive to rebuild and are usually
//! read several times with different regions. The cache keeps whole
//! decoded planes, keyed by `(series, plane)`, in their stored byte order.
//!
//! The cache belongs to one open source and is dropped with it.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use bytes::Bytes;
use lru::LruCache;

/// Default capacity in decoded planes.
pub const DEFAULT_PLANE_CACHE_CAPACITY: usize = 16;

/// Cache key: series index and linear plane index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneKey {
    pub series: usize,
    pub plane: usize,
}

impl PlaneKey {
    pub const fn new(series: usize, plane: usize) -> Self {
        Self { series, plane }
    }
}

/// LRU cache of fully decoded planes.
///
/// A capacity of zero disables caching: `put` is a no-op and `get` always
/// misses.
pub struct PlaneCache {
    cache: Option<Mutex<LruCache<PlaneKey, Bytes>>>,
}

impl PlaneCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PLANE_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get(&self, key: &PlaneKey) -> Option<Bytes> {
        let mut cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(key).cloned()
    }

    pub fn put(&self, key: PlaneKey, plane: Bytes) {
        if let Some(Ok(mut cache)) = self.cache.as_ref().map(|c| c.lock()) {
            cache.put(key, plane);
        }
    }

    /// Number of planes currently cached.
    pub fn len(&self) -> usize {
        match self.cache.as_ref().map(|c| c.lock()) {
            Some(Ok(cache)) => cache.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached plane.
    pub fn clear(&self) {
        if let Some(Ok(mut cache)) = self.cache.as_ref().map(|c| c.lock()) {
            cache.clear();
        }
    }
}

impl Default for PlaneCache {
    fn default() -> Self {
        Self::new()
    }
}
