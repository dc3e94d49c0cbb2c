//! Memory Tiering Manager
//!
//! Two tiers per key:
//!
//! ```text
//! store(key, payload) ──► LRU cache (always, TTL-bounded)
//!                    └──► persistent store (only if importance > threshold)
//!
//! retrieve(key) ──► cache hit?   → refresh recency, return
//!               └─► storage hit? → verify, re-populate cache, return
//!               └─► miss
//! ```
//!
//! Cleanup sweeps expired cache entries only; the persistent tier is bounded
//! by its own FIFO capacity.

use super::cache::{Lookup, TtlLruCache};
use super::importance::{AccessStats, DefaultImportance, ImportancePolicy};
use super::payload::{decode, encode, Payload};
use super::store::{InMemoryStore, StorageBackend, StorageEntry};
use crate::clock::Clock;
use crate::errors::{PipelineResult, StorageError};
use crate::pipeline::events::{EventSink, PipelineEvent};
use crate::pipeline::metrics::MetricsCollector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub cache_max_size: usize,
    pub cache_ttl_ms: u64,
    /// Importance strictly above this is persisted
    pub persistence_threshold: f64,
    /// Serialized payloads larger than this many bytes are compressed
    pub compression_threshold: usize,
    pub storage_max_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cache_max_size: 1_000,
            cache_ttl_ms: 60_000,
            persistence_threshold: 0.6,
            compression_threshold: 1_024,
            storage_max_size: 10_000,
        }
    }
}

/// Where a key currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    CachedOnly,
    CachedAndPersisted,
    PersistedOnly,
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreOutcome {
    pub importance: f64,
    pub persisted: bool,
    pub compressed: bool,
    pub cache_evicted: Vec<String>,
    pub storage_evicted: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub before: usize,
    pub after: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_entries: usize,
    pub persisted_entries: usize,
    pub cache_hits: u64,
    pub storage_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

pub struct MemoryTieringManager {
    config: MemoryConfig,
    cache: Mutex<TtlLruCache<Payload>>,
    store: Mutex<Box<dyn StorageBackend>>,
    policy: Box<dyn ImportancePolicy>,
    access: Mutex<HashMap<String, AccessStats>>,
    clock: Clock,
    events: EventSink,
    metrics: Arc<MetricsCollector>,
    cache_hits: AtomicU64,
    storage_hits: AtomicU64,
    misses: AtomicU64,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTieringManager {
    /// Manager with an in-memory persistent tier and the default importance policy.
    pub fn new(
        config: MemoryConfig,
        clock: Clock,
        events: EventSink,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            cache: Mutex::new(TtlLruCache::new(
                config.cache_max_size,
                config.cache_ttl_ms,
                clock.clone(),
            )),
            store: Mutex::new(Box::new(InMemoryStore::new(config.storage_max_size))),
            policy: Box::new(DefaultImportance),
            access: Mutex::new(HashMap::new()),
            config,
            clock,
            events,
            metrics,
            cache_hits: AtomicU64::new(0),
            storage_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_storage(mut self, backend: Box<dyn StorageBackend>) -> Self {
        self.store = Mutex::new(backend);
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn ImportancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn touch(&self, key: &str, retrieval: bool) -> AccessStats {
        let now = (self.clock)();
        let mut access = lock(&self.access);
        let stats = access.entry(key.to_string()).or_default();
        if retrieval {
            stats.retrievals += 1;
        } else {
            stats.stores += 1;
        }
        stats.last_access = now;
        *stats
    }

    /// Cache the payload and persist it when important enough.
    pub fn store(&self, key: &str, payload: Payload) -> PipelineResult<StoreOutcome> {
        let access = self.touch(key, false);
        let importance = self.policy.score(&payload, &access);
        let persist = importance > self.config.persistence_threshold;

        let encoded = if persist {
            Some(encode(&payload, self.config.compression_threshold)?)
        } else {
            None
        };

        let cache_evicted = lock(&self.cache).insert(key, payload);
        if !cache_evicted.is_empty() {
            self.metrics.record_cache_evictions(cache_evicted.len());
        }

        let mut outcome = StoreOutcome {
            importance,
            persisted: false,
            compressed: false,
            cache_evicted,
            storage_evicted: Vec::new(),
        };

        match encoded {
            Some(encoded) => {
                let entry = StorageEntry {
                    key: key.to_string(),
                    compressed: encoded.compressed,
                    checksum: encoded.checksum,
                    original_size: encoded.original_size,
                    bytes: encoded.bytes,
                    importance,
                    stored_at: (self.clock)(),
                };
                let storage_evicted = self.with_store(|store| store.put(entry))?;
                if !storage_evicted.is_empty() {
                    self.metrics.record_storage_evictions(storage_evicted.len());
                    log::debug!("Storage evicted {} oldest entries", storage_evicted.len());
                }

                self.metrics.record_persisted();
                self.events.emit(PipelineEvent::DataPersisted {
                    key: key.to_string(),
                    importance,
                    compressed: encoded.compressed,
                });
                log::debug!(
                    "💾 Persisted {} (importance {:.2}, {} bytes{})",
                    key,
                    importance,
                    encoded.original_size,
                    if encoded.compressed { ", lz4" } else { "" }
                );

                outcome.persisted = true;
                outcome.compressed = encoded.compressed;
                outcome.storage_evicted = storage_evicted;
            }
            None => {
                // A stale durable copy must not outlive a newer cached value
                let removed = self.with_store(|store| store.remove(key))?;
                log::debug!(
                    "Cached {} only (importance {:.2}{})",
                    key,
                    importance,
                    if removed { ", dropped stale durable copy" } else { "" }
                );
            }
        }

        Ok(outcome)
    }

    /// Cache first, then the persistent tier; `None` is a miss.
    pub fn retrieve(&self, key: &str) -> PipelineResult<Option<Payload>> {
        let lookup = lock(&self.cache).get(key);
        match lookup {
            Lookup::Hit(payload) => {
                self.touch(key, true);
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_cache_hit();
                self.events.emit(PipelineEvent::CacheHit {
                    key: key.to_string(),
                });
                return Ok(Some(payload));
            }
            Lookup::Expired => self.metrics.record_cache_expirations(1),
            Lookup::Absent => {}
        }

        let entry = self.with_store(|store| store.get(key))?;
        let Some(entry) = entry else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_miss();
            self.events.emit(PipelineEvent::Miss {
                key: key.to_string(),
            });
            return Ok(None);
        };

        let payload = decode(key, &entry.bytes, entry.compressed, &entry.checksum).map_err(|e| {
            self.metrics.record_storage_error();
            log::warn!("⚠️  Stored entry {} unreadable: {}", key, e);
            e
        })?;

        self.touch(key, true);
        let evicted = lock(&self.cache).insert(key, payload.clone());
        if !evicted.is_empty() {
            self.metrics.record_cache_evictions(evicted.len());
        }

        self.storage_hits.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_storage_hit();
        self.events.emit(PipelineEvent::StorageHit {
            key: key.to_string(),
        });
        Ok(Some(payload))
    }

    /// Current tier of a key. Does not refresh recency.
    pub fn tier_of(&self, key: &str) -> Tier {
        let cached = lock(&self.cache).contains_live(key);
        let persisted = self
            .with_store(|store| store.contains(key))
            .unwrap_or(false);
        match (cached, persisted) {
            (true, true) => Tier::CachedAndPersisted,
            (true, false) => Tier::CachedOnly,
            (false, true) => Tier::PersistedOnly,
            (false, false) => Tier::Absent,
        }
    }

    /// Drop expired cache entries and forget access stats of absent keys.
    pub fn cleanup(&self) -> CleanupReport {
        let (before, expired, after) = {
            let mut cache = lock(&self.cache);
            let before = cache.len();
            let expired = cache.purge_expired();
            (before, expired, cache.len())
        };
        if expired > 0 {
            self.metrics.record_cache_expirations(expired);
        }

        let tracked: Vec<String> = lock(&self.access).keys().cloned().collect();
        let stale: Vec<String> = tracked
            .into_iter()
            .filter(|k| self.tier_of(k) == Tier::Absent)
            .collect();
        if !stale.is_empty() {
            let mut access = lock(&self.access);
            for key in &stale {
                access.remove(key);
            }
        }

        self.events
            .emit(PipelineEvent::CacheCleanup { before, after });
        log::debug!(
            "🧹 Cache cleanup: {} -> {} entries ({} expired)",
            before,
            after,
            expired
        );

        CleanupReport {
            before,
            after,
            expired,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let (cached_entries, counters) = {
            let cache = lock(&self.cache);
            (cache.len(), cache.counters())
        };
        CacheStats {
            cached_entries,
            persisted_entries: self.with_store(|store| store.len()).unwrap_or(0),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            storage_hits: self.storage_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: counters.evictions,
            expirations: counters.expirations,
        }
    }

    fn with_store<T>(
        &self,
        op: impl FnOnce(&mut dyn StorageBackend) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut store = lock(&self.store);
        op(&mut **store).map_err(|e| {
            self.metrics.record_storage_error();
            log::warn!("⚠️  Storage operation failed: {}", e);
            e
        })
    }
}

impl std::fmt::Debug for MemoryTieringManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTieringManager")
            .field("config", &self.config)
            .finish()
    }
}

/// Periodic cache cleanup until `shutdown` flips to true.
pub fn spawn_cleanup_task(
    manager: Arc<MemoryTieringManager>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("🧹 Starting cache cleanup task (interval: {}ms)", every.as_millis());
        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    manager.cleanup();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("🧹 Cache cleanup task stopped");
    })
}
