//! Content-addressed decode cache.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use lru::LruCache;

use crate::raster;
use crate::ClipError;

/// Default number of decoded rasters kept in memory.
pub const DEFAULT_DECODE_CACHE_CAPACITY: usize = 128;

/// Bounded LRU cache of decoded rasters keyed by a content hash of the raw
/// bytes.
///
/// Encoding and classifying the same upload touches the same bytes several
/// times in one request; the cache collapses those decodes. It is purely an
/// optimization: a hit and a miss produce the same raster.
pub struct DecodeCache {
    inner: Mutex<LruCache<u64, Arc<RgbImage>>>,
}

impl DecodeCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the decoded raster for `bytes`, decoding on a miss.
    pub fn get_or_decode(&self, bytes: &[u8]) -> Result<Arc<RgbImage>, ClipError> {
        let key = content_hash(bytes);

        if let Some(hit) = self.inner.lock().unwrap().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let raster = Arc::new(raster::decode_rgb(bytes)?);
        self.inner.lock().unwrap().put(key, Arc::clone(&raster));
        Ok(raster)
    }
}

impl Default for DecodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_DECODE_CACHE_CAPACITY)
    }
}

fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
