//! Injected metrics collector
//!
//! One `Arc<MetricsCollector>` is shared by the queue, engine, scheduler and
//! memory manager of a runtime. Tests build their own instance so counts never
//! leak between runs.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsCollector {
    points_accepted: AtomicU64,
    rejected_queue_full: AtomicU64,
    rejected_memory: AtomicU64,
    points_processed: AtomicU64,
    points_invalid: AtomicU64,

    batches_processed: AtomicU64,
    batches_skipped: AtomicU64,
    slow_batches: AtomicU64,
    tick_panics: AtomicU64,
    last_batch_duration_ms: AtomicU64,

    analyses_completed: AtomicU64,
    analyses_insufficient: AtomicU64,
    analysis_failures: AtomicU64,
    analysis_timeouts: AtomicU64,

    cache_hits: AtomicU64,
    storage_hits: AtomicU64,
    misses: AtomicU64,
    cache_evictions: AtomicU64,
    cache_expirations: AtomicU64,
    entries_persisted: AtomicU64,
    storage_evictions: AtomicU64,
    storage_errors: AtomicU64,

    events_dropped: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub points_accepted: u64,
    pub rejected_queue_full: u64,
    pub rejected_memory: u64,
    pub points_processed: u64,
    pub points_invalid: u64,
    pub batches_processed: u64,
    pub batches_skipped: u64,
    pub slow_batches: u64,
    pub tick_panics: u64,
    pub last_batch_duration_ms: u64,
    pub analyses_completed: u64,
    pub analyses_insufficient: u64,
    pub analysis_failures: u64,
    pub analysis_timeouts: u64,
    pub cache_hits: u64,
    pub storage_hits: u64,
    pub misses: u64,
    pub cache_evictions: u64,
    pub cache_expirations: u64,
    pub entries_persisted: u64,
    pub storage_evictions: u64,
    pub storage_errors: u64,
    pub events_dropped: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        bump(&self.points_accepted, 1);
    }

    pub fn record_queue_full(&self) {
        bump(&self.rejected_queue_full, 1);
    }

    pub fn record_memory_rejection(&self) {
        bump(&self.rejected_memory, 1);
    }

    pub fn record_points(&self, processed: usize, invalid: usize) {
        bump(&self.points_processed, processed as u64);
        bump(&self.points_invalid, invalid as u64);
    }

    pub fn record_batch(&self, duration_ms: u64) {
        bump(&self.batches_processed, 1);
        self.last_batch_duration_ms
            .store(duration_ms, Ordering::Relaxed);
    }

    pub fn record_batch_skipped(&self) {
        bump(&self.batches_skipped, 1);
    }

    pub fn record_slow_batch(&self) {
        bump(&self.slow_batches, 1);
    }

    pub fn record_tick_panic(&self) {
        bump(&self.tick_panics, 1);
    }

    pub fn record_analysis_completed(&self) {
        bump(&self.analyses_completed, 1);
    }

    pub fn record_analysis_insufficient(&self) {
        bump(&self.analyses_insufficient, 1);
    }

    pub fn record_analysis_failure(&self) {
        bump(&self.analysis_failures, 1);
    }

    pub fn record_analysis_timeout(&self) {
        bump(&self.analysis_timeouts, 1);
    }

    pub fn record_cache_hit(&self) {
        bump(&self.cache_hits, 1);
    }

    pub fn record_storage_hit(&self) {
        bump(&self.storage_hits, 1);
    }

    pub fn record_miss(&self) {
        bump(&self.misses, 1);
    }

    pub fn record_cache_evictions(&self, n: usize) {
        bump(&self.cache_evictions, n as u64);
    }

    pub fn record_cache_expirations(&self, n: usize) {
        bump(&self.cache_expirations, n as u64);
    }

    pub fn record_persisted(&self) {
        bump(&self.entries_persisted, 1);
    }

    pub fn record_storage_evictions(&self, n: usize) {
        bump(&self.storage_evictions, n as u64);
    }

    pub fn record_storage_error(&self) {
        bump(&self.storage_errors, 1);
    }

    pub fn record_event_dropped(&self) {
        bump(&self.events_dropped, 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            points_accepted: load(&self.points_accepted),
            rejected_queue_full: load(&self.rejected_queue_full),
            rejected_memory: load(&self.rejected_memory),
            points_processed: load(&self.points_processed),
            points_invalid: load(&self.points_invalid),
            batches_processed: load(&self.batches_processed),
            batches_skipped: load(&self.batches_skipped),
            slow_batches: load(&self.slow_batches),
            tick_panics: load(&self.tick_panics),
            last_batch_duration_ms: load(&self.last_batch_duration_ms),
            analyses_completed: load(&self.analyses_completed),
            analyses_insufficient: load(&self.analyses_insufficient),
            analysis_failures: load(&self.analysis_failures),
            analysis_timeouts: load(&self.analysis_timeouts),
            cache_hits: load(&self.cache_hits),
            storage_hits: load(&self.storage_hits),
            misses: load(&self.misses),
            cache_evictions: load(&self.cache_evictions),
            cache_expirations: load(&self.cache_expirations),
            entries_persisted: load(&self.entries_persisted),
            storage_evictions: load(&self.storage_evictions),
            storage_errors: load(&self.storage_errors),
            events_dropped: load(&self.events_dropped),
        }
    }
}
