//! # Streaming Pipeline
//!
//! Ingestion, windowing and batch orchestration around the analysis engines.
//!
//! ## Data Flow
//!
//! 1. Producers call `submit(stream_id, point)`; the bounded queue rejects
//!    instead of blocking when full or over the memory ceiling
//! 2. Every `processing_interval_ms` the scheduler drains up to `batch_size`
//!    points in FIFO order
//! 3. Valid points go into per-stream circular windows; invalid ones are counted
//! 4. Each touched stream is analyzed once over a single window snapshot
//! 5. Artifacts land in the memory tier and an `AnalysisCompleted` event is sent
//!
//! ## Module Organization
//!
//! - `types` - `DataPoint`, `QueuedPoint`, `StreamAnalysis`
//! - `config` - `PipelineConfig` with env loading and validation
//! - `events` - `PipelineEvent` channel and `EventSink`
//! - `metrics` - atomic counters shared by every component
//! - `windows` - circular window buffer
//! - `ingestion` - bounded queue and memory guard
//! - `engine` - batch processing and per-stream analysis
//! - `scheduler` - periodic batch ticks, overlap guard, final drain
//! - `runtime` - everything wired together

pub mod config;
pub mod engine;
pub mod events;
pub mod ingestion;
pub mod metrics;
pub mod runtime;
pub mod scheduler;
pub mod types;
pub mod windows;

pub use config::PipelineConfig;
pub use engine::{artifact_key, BatchOutcome, PipelineEngine};
pub use events::{BatchReport, EventSink, PipelineEvent};
pub use ingestion::{IngestionQueue, MemoryGuard, MemoryProbe, ProcessMemory};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use runtime::{PipelineRuntime, RuntimeOptions};
pub use scheduler::{BatchScheduler, TickOutcome};
pub use types::{DataPoint, QueuedPoint, StreamAnalysis};
pub use windows::{CircularWindow, RollingWindow, WindowBuffer, WindowMetrics, WindowSettings};
