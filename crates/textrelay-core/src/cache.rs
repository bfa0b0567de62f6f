//! Response cache
//!
//! Cache-aside store keyed by request fingerprint. Only successful results
//! are ever written, so a transient outage self-heals on the next call. The
//! backing store is pluggable; a backend error on either side degrades to a
//! miss instead of failing the request.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::GenerationResult;

#[derive(Debug, Error)]
#[error("cache backend error: {0}")]
pub struct CacheBackendError(pub String);

/// Backing store contract: get/set-with-ttl. Implementations may be remote;
/// expiry is the store's responsibility.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<GenerationResult>, CacheBackendError>;
    async fn put(
        &self,
        key: &str,
        value: GenerationResult,
        ttl: Duration,
    ) -> Result<(), CacheBackendError>;
}

/// Cache tuning knobs, part of the relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Bound on entry count for the in-memory store; oldest-inserted entries
    /// are evicted first. `None` means unbounded.
    pub capacity: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            capacity: Some(4096),
        }
    }
}

struct StoredEntry {
    value: GenerationResult,
    inserted_at: Instant,
    ttl: Duration,
    seq: u64,
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, StoredEntry>,
    /// Insertion order as (seq, key); stale pairs are skipped on eviction.
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

/// In-process store: lazy expiry on read, least-recently-inserted eviction
/// when a capacity bound is configured.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    capacity: Option<usize>,
}

impl MemoryStore {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<GenerationResult>, CacheBackendError> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= entry.ttl,
            None => return Ok(None),
        };
        if expired {
            inner.entries.remove(key);
            return Ok(None);
        }
        Ok(inner.entries.get(key).map(|e| e.value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: GenerationResult,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
                seq,
            },
        );
        inner.order.push_back((seq, key.to_string()));
        if let Some(capacity) = self.capacity {
            while inner.entries.len() > capacity {
                let Some((old_seq, old_key)) = inner.order.pop_front() else {
                    break;
                };
                // Skip order entries made stale by an overwrite.
                if inner.entries.get(&old_key).is_some_and(|e| e.seq == old_seq) {
                    inner.entries.remove(&old_key);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    store_failures: AtomicU64,
}

/// Hit/miss accounting, snapshotted for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub store_failures: u64,
}

/// Fingerprint-keyed facade over a [`CacheStore`].
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    enabled: bool,
    counters: CacheCounters,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(config.ttl_secs),
            enabled: config.enabled,
            counters: CacheCounters::default(),
        }
    }

    /// In-memory cache with the configured capacity bound.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new(config.capacity)), config)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a previously produced result. Backend unavailability is a
    /// miss, never an error.
    pub async fn lookup(&self, fingerprint: &str) -> Option<GenerationResult> {
        if !self.enabled {
            return None;
        }
        match self.store.get(fingerprint).await {
            Ok(Some(result)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint, "cache hit");
                Some(result)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint, "cache miss");
                None
            }
            Err(err) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(fingerprint, error = %err, "cache backend unavailable, treating as miss");
                None
            }
        }
    }

    /// Record a successful result. A store failure is logged and dropped;
    /// it must never fail the overall request.
    pub async fn store(&self, fingerprint: &str, result: GenerationResult) {
        if !self.enabled {
            return;
        }
        if let Err(err) = self.store.put(fingerprint, result, self.ttl).await {
            self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
            warn!(fingerprint, error = %err, "cache write failed");
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
        }
    }
}
