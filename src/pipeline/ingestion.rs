//! Bounded ingestion queue with memory guard
//!
//! `submit` never blocks: a full queue or a breached memory ceiling rejects
//! the point and emits a signal. The scheduler drains FIFO batches.
//!
//! The guard reads the resident memory of this process through `sysinfo`, so
//! windows, cached artifacts and everything else the pipeline holds count
//! against the ceiling, not just the queue.

use super::events::{EventSink, PipelineEvent};
use super::metrics::MetricsCollector;
use super::types::{DataPoint, QueuedPoint};
use crate::clock::Clock;
use crate::errors::{PipelineError, PipelineResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Reports current memory use in bytes.
pub type MemoryProbe = Arc<dyn Fn() -> usize + Send + Sync>;

/// Resident memory of the current process, sampled at most once per
/// `min_interval`. Callers in between get the previous sample.
pub struct ProcessMemory {
    pid: Option<Pid>,
    min_interval: Duration,
    system: Mutex<(System, Option<Instant>)>,
    last_bytes: AtomicUsize,
}

impl ProcessMemory {
    pub fn new(min_interval: Duration) -> Self {
        let pid = match get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                log::warn!("⚠️  Process memory unavailable ({}), memory guard disabled", e);
                None
            }
        };
        Self {
            pid,
            min_interval,
            system: Mutex::new((System::new(), None)),
            last_bytes: AtomicUsize::new(0),
        }
    }

    /// Current resident bytes. Never blocks on a concurrent refresh.
    pub fn sample(&self) -> usize {
        let Some(pid) = self.pid else {
            return 0;
        };
        // Another thread refreshing: its result is as fresh as ours would be
        let Ok(mut guard) = self.system.try_lock() else {
            return self.last_bytes.load(Ordering::Relaxed);
        };
        let (system, last_refresh) = &mut *guard;
        if last_refresh.is_some_and(|at| at.elapsed() < self.min_interval) {
            return self.last_bytes.load(Ordering::Relaxed);
        }

        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let bytes = system
            .process(pid)
            .map(|p| usize::try_from(p.memory()).unwrap_or(usize::MAX))
            .unwrap_or(0);
        *last_refresh = Some(Instant::now());
        self.last_bytes.store(bytes, Ordering::Relaxed);
        bytes
    }

    pub fn into_probe(self) -> MemoryProbe {
        Arc::new(move || self.sample())
    }
}

/// Compares memory use against a ceiling before each enqueue.
#[derive(Clone)]
pub struct MemoryGuard {
    ceiling_bytes: usize,
    probe: MemoryProbe,
}

impl MemoryGuard {
    /// Guard on the resident memory of this process.
    pub fn new(ceiling_bytes: usize, sample_interval: Duration) -> Self {
        Self::with_probe(
            ceiling_bytes,
            ProcessMemory::new(sample_interval).into_probe(),
        )
    }

    pub fn with_probe(ceiling_bytes: usize, probe: MemoryProbe) -> Self {
        Self {
            ceiling_bytes,
            probe,
        }
    }

    pub fn ceiling_bytes(&self) -> usize {
        self.ceiling_bytes
    }

    pub fn used_bytes(&self) -> usize {
        (self.probe)()
    }

    /// `Err(used)` when the ceiling is exceeded.
    pub fn check(&self) -> Result<(), usize> {
        let used = self.used_bytes();
        if used > self.ceiling_bytes {
            Err(used)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for MemoryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("ceiling_bytes", &self.ceiling_bytes)
            .finish_non_exhaustive()
    }
}

pub struct IngestionQueue {
    queue: Mutex<VecDeque<QueuedPoint>>,
    capacity: usize,
    guard: MemoryGuard,
    clock: Clock,
    events: EventSink,
    metrics: Arc<MetricsCollector>,
    /// Set after a rejection; the next success clears it. Keeps warn logs to one per episode.
    rejecting: AtomicBool,
}

impl IngestionQueue {
    pub fn new(
        capacity: usize,
        guard: MemoryGuard,
        clock: Clock,
        events: EventSink,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(16_384))),
            capacity,
            guard,
            clock,
            events,
            metrics,
            rejecting: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedPoint>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a point or return the backpressure condition.
    pub fn try_submit(&self, stream_id: &str, point: DataPoint) -> PipelineResult<()> {
        if let Err(used_bytes) = self.guard.check() {
            let ceiling_bytes = self.guard.ceiling_bytes();
            self.metrics.record_memory_rejection();
            self.events.emit(PipelineEvent::MemoryWarning {
                used_bytes,
                ceiling_bytes,
            });
            if !self.rejecting.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "⚠️  Memory ceiling exceeded ({} > {} bytes), rejecting submissions",
                    used_bytes,
                    ceiling_bytes
                );
            }
            return Err(PipelineError::MemoryPressure {
                used_bytes,
                ceiling_bytes,
            });
        }

        let queued = QueuedPoint {
            stream_id: stream_id.to_string(),
            point,
            enqueued_at: (self.clock)(),
        };

        {
            let mut queue = self.lock();
            if queue.len() >= self.capacity {
                drop(queue);
                self.metrics.record_queue_full();
                self.events.emit(PipelineEvent::QueueFull {
                    stream_id: stream_id.to_string(),
                    capacity: self.capacity,
                });
                if !self.rejecting.swap(true, Ordering::Relaxed) {
                    log::warn!("⚠️  Ingestion queue full ({}), rejecting submissions", self.capacity);
                }
                return Err(PipelineError::QueueFull {
                    capacity: self.capacity,
                });
            }
            queue.push_back(queued);
        }

        self.metrics.record_accepted();
        self.rejecting.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Enqueue a point; `false` means it was rejected.
    pub fn submit(&self, stream_id: &str, point: DataPoint) -> bool {
        self.try_submit(stream_id, point).is_ok()
    }

    /// Remove up to `max` points in FIFO order.
    pub fn drain(&self, max: usize) -> Vec<QueuedPoint> {
        let mut queue = self.lock();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
