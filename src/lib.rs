//! # flowcast
//!
//! Streaming analytics core for numeric time series:
//!
//! ```text
//! submit() → IngestionQueue → BatchScheduler tick
//!     ↓
//! WindowBuffer (per-stream ring buffers)
//!     ↓
//! ┌───────────────────────┬──────────────────────┐
//! │ PatternRecognizer     │ PredictiveEngine     │   (parallel, same snapshot)
//! └───────────────────────┴──────────────────────┘
//!     ↓
//! MemoryTieringManager (LRU cache → persistent store)
//!     ↓
//! PipelineEvent channel → orchestration layer
//! ```
//!
//! The crate performs no network I/O. Everything leaving the core is either a
//! returned value or a [`pipeline::PipelineEvent`] on the event channel.

pub mod analysis;
pub mod clock;
pub mod errors;
pub mod forecast;
pub mod memory;
pub mod pipeline;

pub use clock::{Clock, ManualClock};
pub use errors::{ConfigError, EstimatorError, PipelineError, PipelineResult, StorageError};
pub use pipeline::{DataPoint, PipelineConfig, PipelineEvent, PipelineRuntime};
