//! Content-addressed cache of inference results.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use sha2::{Digest, Sha256};
use crate::error::{Error, Result};

/// Hit/miss counters of a [`ResultCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// An LRU cache of inference outputs owned by a single dispatcher.
///
/// Keys are SHA-256 digests of the JSON encoding of an input, salted with a
/// scope string (the dispatcher uses the model path and backend kind), so
/// results from one model are never served for another. Once `capacity`
/// entries are held, inserting evicts the least recently used one.
pub struct ResultCache<V> {
    scope: String,
    entries: Mutex<LruCache<String, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> ResultCache<V> {
    pub fn new(capacity: NonZeroUsize, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Derive the cache key for `input`.
    pub fn key<I: Serialize>(&self, input: &I) -> Result<String> {
        let encoded = serde_json::to_vec(input).map_err(|e| Error::CacheKey(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(self.scope.as_bytes());
        hasher.update([0u8]);
        hasher.update(&encoded);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn insert(&self, key: String, value: V) {
        self.entries.lock().put(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

impl<V: Clone> ResultCache<V> {
    /// Look up `key`, marking it as most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let found = self.entries.lock().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }
}
