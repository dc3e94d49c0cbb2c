//! Assembled pipeline: queue, windows, engines, memory tier and background tasks
//!
//! ```text
//! PipelineRuntime::new(config)
//!     ├─ IngestionQueue  (+ MemoryGuard)
//!     ├─ WindowBuffer
//!     ├─ PipelineEngine  (PatternRecognizer + PredictiveEngine)
//!     ├─ MemoryTieringManager
//!     └─ BatchScheduler
//! start()     → scheduler loop + cache cleanup task
//! shutdown()  → stop signal, final drain, join
//! ```

use super::config::PipelineConfig;
use super::engine::PipelineEngine;
use super::events::{EventSink, PipelineEvent};
use super::ingestion::{IngestionQueue, MemoryGuard, MemoryProbe};
use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::scheduler::BatchScheduler;
use super::types::{DataPoint, StreamAnalysis};
use super::windows::WindowBuffer;
use crate::analysis::CorrelationResult;
use crate::clock::{system_clock, Clock};
use crate::errors::{ConfigError, PipelineResult};
use crate::memory::{spawn_cleanup_task, MemoryTieringManager, Payload, StorageBackend};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Injection points for the runtime. Everything defaults to production values.
#[derive(Default)]
pub struct RuntimeOptions {
    /// Defaults to the system clock
    pub clock: Option<Clock>,
    /// Defaults to an in-memory store
    pub storage: Option<Box<dyn StorageBackend>>,
    /// Defaults to the resident memory of this process
    pub memory_probe: Option<MemoryProbe>,
}

pub struct PipelineRuntime {
    config: PipelineConfig,
    queue: Arc<IngestionQueue>,
    windows: Arc<WindowBuffer>,
    engine: Arc<PipelineEngine>,
    memory: Arc<MemoryTieringManager>,
    scheduler: Arc<BatchScheduler>,
    metrics: Arc<MetricsCollector>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl PipelineRuntime {
    /// Build with default options.
    pub fn build(
        config: PipelineConfig,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>), ConfigError> {
        Self::new(config, RuntimeOptions::default())
    }

    /// Validate `config` and wire every component. Returns the runtime and
    /// the receiving end of the event channel.
    pub fn new(
        config: PipelineConfig,
        options: RuntimeOptions,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>), ConfigError> {
        config.validate()?;

        let clock = options.clock.unwrap_or_else(system_clock);
        let metrics = Arc::new(MetricsCollector::new());
        let (events, rx) = EventSink::channel(config.event_channel_capacity, metrics.clone());

        let guard = match options.memory_probe {
            Some(probe) => MemoryGuard::with_probe(config.memory_ceiling_bytes, probe),
            None => MemoryGuard::new(
                config.memory_ceiling_bytes,
                Duration::from_millis(config.memory_probe_interval_ms),
            ),
        };
        let queue = Arc::new(IngestionQueue::new(
            config.max_queue_size,
            guard,
            clock.clone(),
            events.clone(),
            metrics.clone(),
        ));

        let windows = Arc::new(WindowBuffer::new(config.window_settings(), clock.clone()));

        let mut memory = MemoryTieringManager::new(
            config.memory_config(),
            clock.clone(),
            events.clone(),
            metrics.clone(),
        );
        if let Some(storage) = options.storage {
            memory = memory.with_storage(storage);
        }
        let memory = Arc::new(memory);

        let engine = Arc::new(PipelineEngine::new(
            &config,
            windows.clone(),
            memory.clone(),
            events.clone(),
            metrics.clone(),
            clock.clone(),
        ));

        let scheduler = Arc::new(BatchScheduler::new(
            &config,
            queue.clone(),
            engine.clone(),
            events,
            metrics.clone(),
            clock,
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok((
            Self {
                config,
                queue,
                windows,
                engine,
                memory,
                scheduler,
                metrics,
                shutdown_tx,
                handles: Vec::new(),
            },
            rx,
        ))
    }

    /// Spawn the scheduler loop and the cache cleanup task.
    ///
    /// Must be called from within a tokio runtime. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            log::warn!("⚠️  Pipeline runtime already started");
            return;
        }

        let scheduler = self.scheduler.clone();
        let shutdown = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(scheduler.run(shutdown)));

        self.handles.push(spawn_cleanup_task(
            self.memory.clone(),
            Duration::from_millis(self.config.cleanup_interval_ms),
            self.shutdown_tx.subscribe(),
        ));

        log::info!("🚀 Pipeline runtime started");
    }

    /// Enqueue a point. `false` means backpressure; see [`Self::try_submit`].
    pub fn submit(&self, stream_id: &str, point: DataPoint) -> bool {
        self.queue.submit(stream_id, point)
    }

    pub fn try_submit(&self, stream_id: &str, point: DataPoint) -> PipelineResult<()> {
        self.queue.try_submit(stream_id, point)
    }

    /// On-demand analysis of one stream's current window.
    pub async fn analyze(&self, stream_id: &str) -> PipelineResult<StreamAnalysis> {
        self.engine.analyze_stream(stream_id).await
    }

    pub fn correlate(&self, stream_a: &str, stream_b: &str) -> PipelineResult<CorrelationResult> {
        self.engine.correlate(stream_a, stream_b)
    }

    /// Read a stored artifact, e.g. `"cpu/forecast"`.
    pub fn retrieve(&self, key: &str) -> PipelineResult<Option<Payload>> {
        self.memory.retrieve(key)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    pub fn windows(&self) -> &Arc<WindowBuffer> {
        &self.windows
    }

    pub fn engine(&self) -> &Arc<PipelineEngine> {
        &self.engine
    }

    pub fn memory(&self) -> &Arc<MemoryTieringManager> {
        &self.memory
    }

    pub fn scheduler(&self) -> &Arc<BatchScheduler> {
        &self.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Stop background tasks. The scheduler drains the queue before exiting.
    pub async fn shutdown(self) {
        log::info!("⚠️  Shutting down pipeline runtime...");
        // Err only when never started
        let _ = self.shutdown_tx.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("❌ Background task ended abnormally: {}", e);
            }
        }

        log::info!("✅ Pipeline runtime stopped");
    }
}

impl std::fmt::Debug for PipelineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRuntime")
            .field("config", &self.config)
            .field("started", &!self.handles.is_empty())
            .finish()
    }
}
