//! # Response Cache
//! Short-TTL memoization of per-account fetch results.
//!
//! Upstream mirrors are slow and flaky; memoizing for a few minutes smooths
//! bursts of scheduled and operator-triggered fetches for the same account
//! without risking staleness beyond the TTL window. Rebuilt from scratch on
//! every process start; nothing here is persisted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Serialize;

use crate::sources::FetchResult;

pub const CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

#[derive(Debug)]
struct CacheEntry {
    value: FetchResult,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Thread-safe TTL cache with a hard capacity bound.
///
/// Expired entries are evicted lazily on access; capacity overflow evicts
/// the oldest 20% by write timestamp.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, CACHE_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns the cached value unless the key is unseen or its entry has
    /// outlived the TTL. An expired entry is removed on this access.
    pub fn get(&self, key: &str) -> Option<FetchResult> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let fresh = match inner.entries.get(key) {
            Some(entry) => entry.stored_at.elapsed() <= self.ttl,
            None => false,
        };
        if !fresh {
            inner.entries.remove(key);
            inner.misses += 1;
            counter!("relay_cache_misses_total").increment(1);
            return None;
        }
        inner.hits += 1;
        counter!("relay_cache_hits_total").increment(1);
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Stores (or overwrites) a value, then enforces the capacity bound.
    pub fn set(&self, key: &str, value: FetchResult) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
        if inner.entries.len() > self.capacity {
            evict_oldest(&mut inner.entries, self.capacity / 5);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.clear();
    }
}

/// Drop the `n` entries with the oldest write timestamps.
fn evict_oldest(entries: &mut HashMap<String, CacheEntry>, n: usize) {
    let n = n.max(1);
    let mut by_age: Vec<(String, Instant)> = entries
        .iter()
        .map(|(k, e)| (k.clone(), e.stored_at))
        .collect();
    by_age.sort_by_key(|&(_, at)| at);
    for (key, _) in by_age.into_iter().take(n) {
        entries.remove(&key);
    }
}
