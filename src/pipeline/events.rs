//! Typed event channel toward the orchestration layer
//!
//! Components never call listeners directly. They push [`PipelineEvent`]s into
//! a bounded channel through an [`EventSink`]; emission never blocks and a full
//! channel drops the event.

use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::types::{DataPoint, StreamAnalysis};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-batch summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch_id: u64,
    pub processed: usize,
    pub errors: usize,
    /// Distinct streams touched by the batch
    pub streams: usize,
    pub started_at: i64,
    pub finished_at: i64,
    pub duration_ms: u64,
}

/// Signals emitted by the core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    QueueFull {
        stream_id: String,
        capacity: usize,
    },
    MemoryWarning {
        used_bytes: usize,
        ceiling_bytes: usize,
    },
    DataProcessed {
        stream_id: String,
        point: DataPoint,
    },
    BatchProcessed(BatchReport),
    MetricsUpdated(MetricsSnapshot),
    BatchDeadlineExceeded {
        batch_id: u64,
        duration_ms: u64,
        deadline_ms: u64,
    },
    AnalysisCompleted(Box<StreamAnalysis>),
    CacheHit {
        key: String,
    },
    StorageHit {
        key: String,
    },
    Miss {
        key: String,
    },
    DataPersisted {
        key: String,
        importance: f64,
        compressed: bool,
    },
    CacheCleanup {
        before: usize,
        after: usize,
    },
}

impl PipelineEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::QueueFull { .. } => "queue_full",
            PipelineEvent::MemoryWarning { .. } => "memory_warning",
            PipelineEvent::DataProcessed { .. } => "data_processed",
            PipelineEvent::BatchProcessed(_) => "batch_processed",
            PipelineEvent::MetricsUpdated(_) => "metrics_updated",
            PipelineEvent::BatchDeadlineExceeded { .. } => "batch_deadline_exceeded",
            PipelineEvent::AnalysisCompleted(_) => "analysis_completed",
            PipelineEvent::CacheHit { .. } => "cache_hit",
            PipelineEvent::StorageHit { .. } => "storage_hit",
            PipelineEvent::Miss { .. } => "miss",
            PipelineEvent::DataPersisted { .. } => "data_persisted",
            PipelineEvent::CacheCleanup { .. } => "cache_cleanup",
        }
    }
}

/// Cloneable, non-blocking sender half of the event channel.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
    metrics: Arc<MetricsCollector>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            tx: Some(tx),
            metrics,
        }
    }

    /// Create a bounded channel and the sink feeding it.
    pub fn channel(
        capacity: usize,
        metrics: Arc<MetricsCollector>,
    ) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, metrics), rx)
    }

    /// Sink that discards everything. Used when nobody subscribes.
    pub fn disabled(metrics: Arc<MetricsCollector>) -> Self {
        Self { tx: None, metrics }
    }

    pub fn emit(&self, event: PipelineEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.try_send(event) {
            let (reason, event) = match err {
                mpsc::error::TrySendError::Full(ev) => ("full", ev),
                mpsc::error::TrySendError::Closed(ev) => ("closed", ev),
            };
            self.metrics.record_event_dropped();
            log::debug!("Event channel {}, dropped {}", reason, event.name());
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("enabled", &self.tx.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_delivers_in_order() {
        let metrics = Arc::new(MetricsCollector::new());
        let (sink, mut rx) = EventSink::channel(4, metrics.clone());

        sink.emit(PipelineEvent::Miss { key: "a".into() });
        sink.emit(PipelineEvent::CacheHit { key: "b".into() });

        assert!(matches!(rx.recv().await, Some(PipelineEvent::Miss { key }) if key == "a"));
        assert!(matches!(rx.recv().await, Some(PipelineEvent::CacheHit { key }) if key == "b"));
        assert_eq!(metrics.snapshot().events_dropped, 0);
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let metrics = Arc::new(MetricsCollector::new());
        let (sink, _rx) = EventSink::channel(1, metrics.clone());

        sink.emit(PipelineEvent::Miss { key: "1".into() });
        sink.emit(PipelineEvent::Miss { key: "2".into() });
        sink.emit(PipelineEvent::Miss { key: "3".into() });

        assert_eq!(metrics.snapshot().events_dropped, 2);
    }

    #[test]
    fn test_closed_and_disabled_sinks() {
        let metrics = Arc::new(MetricsCollector::new());
        let (sink, rx) = EventSink::channel(8, metrics.clone());
        drop(rx);
        sink.emit(PipelineEvent::CacheCleanup { before: 3, after: 1 });
        assert_eq!(metrics.snapshot().events_dropped, 1);

        // Disabled sink is silent, not a drop
        let disabled = EventSink::disabled(metrics.clone());
        disabled.emit(PipelineEvent::Miss { key: "x".into() });
        assert_eq!(metrics.snapshot().events_dropped, 1);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_string(&PipelineEvent::DataPersisted {
            key: "s1/risk".into(),
            importance: 0.75,
            compressed: false,
        })
        .unwrap();
        assert!(json.contains("\"event\":\"data_persisted\""));
    }
}
