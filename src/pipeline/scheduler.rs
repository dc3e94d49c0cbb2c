//! Periodic batch scheduler
//!
//! One tick = drain up to `batch_size` points, push them into the windows,
//! then analyze every stream the batch touched. A run flag makes a tick that
//! fires while another batch is still in flight a no-op.

use super::config::PipelineConfig;
use super::engine::PipelineEngine;
use super::events::{BatchReport, EventSink, PipelineEvent};
use super::ingestion::IngestionQueue;
use super::metrics::MetricsCollector;
use crate::clock::Clock;
use crate::errors::PipelineError;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Another batch was still running
    Skipped,
    /// Queue was empty
    Idle,
    Completed(BatchReport),
}

/// Clears the run flag when the tick ends, including by unwinding.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BatchScheduler {
    queue: Arc<IngestionQueue>,
    engine: Arc<PipelineEngine>,
    events: EventSink,
    metrics: Arc<MetricsCollector>,
    clock: Clock,
    running: AtomicBool,
    next_batch_id: AtomicU64,
    batch_size: usize,
    interval: Duration,
    deadline_ms: u64,
}

impl BatchScheduler {
    pub fn new(
        config: &PipelineConfig,
        queue: Arc<IngestionQueue>,
        engine: Arc<PipelineEngine>,
        events: EventSink,
        metrics: Arc<MetricsCollector>,
        clock: Clock,
    ) -> Self {
        Self {
            queue,
            engine,
            events,
            metrics,
            clock,
            running: AtomicBool::new(false),
            next_batch_id: AtomicU64::new(1),
            batch_size: config.batch_size,
            interval: Duration::from_millis(config.processing_interval_ms),
            deadline_ms: config.batch_deadline_ms,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Process one batch now.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.metrics.record_batch_skipped();
            log::debug!("Previous batch still running, tick skipped");
            return TickOutcome::Skipped;
        }
        let _guard = RunGuard(&self.running);

        let batch = self.queue.drain(self.batch_size);
        if batch.is_empty() {
            return TickOutcome::Idle;
        }

        let batch_id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);
        let started_at = (self.clock)();
        let timer = Instant::now();

        let outcome = self.engine.process_batch(batch);

        let results = join_all(
            outcome
                .touched
                .iter()
                .map(|stream_id| self.engine.analyze_stream(stream_id)),
        )
        .await;

        for (stream_id, result) in outcome.touched.iter().zip(results) {
            match result {
                Ok(_) => {}
                Err(PipelineError::InsufficientData { .. }) => {
                    self.metrics.record_analysis_insufficient();
                }
                Err(e @ PipelineError::Timeout { .. }) => {
                    self.metrics.record_analysis_timeout();
                    log::warn!("⏱️  {} ({})", e, stream_id);
                }
                Err(e) => {
                    self.metrics.record_analysis_failure();
                    log::warn!("⚠️  Analysis of {} failed: {}", stream_id, e);
                }
            }
        }

        let duration_ms = timer.elapsed().as_millis() as u64;
        let report = BatchReport {
            batch_id,
            processed: outcome.processed,
            errors: outcome.errors,
            streams: outcome.touched.len(),
            started_at,
            finished_at: (self.clock)(),
            duration_ms,
        };

        self.metrics.record_batch(duration_ms);
        if duration_ms > self.deadline_ms {
            self.metrics.record_slow_batch();
            log::warn!(
                "🐢 Batch {} took {}ms (deadline {}ms)",
                batch_id,
                duration_ms,
                self.deadline_ms
            );
            self.events.emit(PipelineEvent::BatchDeadlineExceeded {
                batch_id,
                duration_ms,
                deadline_ms: self.deadline_ms,
            });
        }

        log::debug!(
            "✅ Batch {}: {} processed, {} errors, {} streams in {}ms",
            batch_id,
            report.processed,
            report.errors,
            report.streams,
            duration_ms
        );
        self.events.emit(PipelineEvent::BatchProcessed(report.clone()));
        self.events
            .emit(PipelineEvent::MetricsUpdated(self.metrics.snapshot()));

        TickOutcome::Completed(report)
    }

    /// `tick` with panics caught and counted. `None` means the tick panicked.
    pub async fn guarded_tick(&self) -> Option<TickOutcome> {
        match AssertUnwindSafe(self.tick()).catch_unwind().await {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                self.metrics.record_tick_panic();
                log::error!("❌ Batch tick panicked, next tick continues");
                None
            }
        }
    }

    /// Tick every `processing_interval_ms` until `shutdown` flips to true,
    /// then drain what is left in the queue.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "⏰ Starting batch scheduler (interval: {}ms, batch size: {})",
            self.interval.as_millis(),
            self.batch_size
        );

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.guarded_tick().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain_remaining().await;
        log::info!("⏰ Batch scheduler stopped");
    }

    /// Final flush: keep ticking until the queue is empty.
    async fn drain_remaining(&self) {
        let pending = self.queue.len();
        if pending > 0 {
            log::info!("🔄 Final drain of {} queued points", pending);
        }

        while !self.queue.is_empty() || self.is_running() {
            match self.guarded_tick().await {
                Some(TickOutcome::Skipped) => sleep(Duration::from_millis(5)).await,
                Some(_) => {}
                None => break,
            }
        }
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("batch_size", &self.batch_size)
            .field("interval", &self.interval)
            .field("deadline_ms", &self.deadline_ms)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::EstimatorError;
    use crate::forecast::ensemble::WeightedEstimator;
    use crate::forecast::{Estimator, PredictiveEngine};
    use crate::memory::MemoryTieringManager;
    use crate::pipeline::ingestion::MemoryGuard;
    use crate::pipeline::types::DataPoint;
    use crate::pipeline::windows::WindowBuffer;
    use tokio::sync::mpsc;

    struct Harness {
        scheduler: Arc<BatchScheduler>,
        queue: Arc<IngestionQueue>,
        metrics: Arc<MetricsCollector>,
        rx: mpsc::Receiver<PipelineEvent>,
    }

    fn make_test_scheduler(config: PipelineConfig) -> Harness {
        make_custom_scheduler(config, |engine| engine, None)
    }

    /// `customize` adjusts the engine; `scheduler_clock` replaces the clock
    /// the scheduler alone sees.
    fn make_custom_scheduler(
        config: PipelineConfig,
        customize: impl FnOnce(PipelineEngine) -> PipelineEngine,
        scheduler_clock: Option<Clock>,
    ) -> Harness {
        let clock = ManualClock::new(1_700_000_000_000).as_clock();
        let metrics = Arc::new(MetricsCollector::new());
        let (events, rx) = EventSink::channel(4_096, metrics.clone());
        let queue = Arc::new(IngestionQueue::new(
            config.max_queue_size,
            MemoryGuard::with_probe(config.memory_ceiling_bytes, Arc::new(|| 0)),
            clock.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let windows = Arc::new(WindowBuffer::new(config.window_settings(), clock.clone()));
        let memory = Arc::new(MemoryTieringManager::new(
            config.memory_config(),
            clock.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let engine = Arc::new(customize(PipelineEngine::new(
            &config,
            windows,
            memory,
            events.clone(),
            metrics.clone(),
            clock.clone(),
        )));
        let scheduler = Arc::new(BatchScheduler::new(
            &config,
            queue.clone(),
            engine,
            events,
            metrics.clone(),
            scheduler_clock.unwrap_or(clock),
        ));
        Harness {
            scheduler,
            queue,
            metrics,
            rx,
        }
    }

    /// Forecast member that takes a few milliseconds per step.
    struct Sluggish;

    impl Estimator for Sluggish {
        fn name(&self) -> &'static str {
            "sluggish"
        }

        fn estimate(&self, history: &[f64]) -> Result<f64, EstimatorError> {
            std::thread::sleep(Duration::from_millis(3));
            Ok(history.last().copied().unwrap_or(0.0))
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            batch_size: 4,
            retention_period_ms: None,
            min_points: 5,
            history_window: 10,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_tick_drains_one_batch_fifo() {
        let mut h = make_test_scheduler(small_config());
        for i in 1..=6 {
            assert!(h.queue.submit("s", DataPoint::new(i, i as f64)));
        }

        let TickOutcome::Completed(report) = h.scheduler.tick().await else {
            panic!("expected a completed batch");
        };
        assert_eq!(report.batch_id, 1);
        assert_eq!(report.processed, 4);
        assert_eq!(report.errors, 0);
        assert_eq!(report.streams, 1);
        assert_eq!(h.queue.len(), 2);

        let mut saw_batch = false;
        let mut saw_metrics = false;
        while let Ok(event) = h.rx.try_recv() {
            match event {
                PipelineEvent::BatchProcessed(r) => saw_batch = r.batch_id == 1,
                PipelineEvent::MetricsUpdated(m) => saw_metrics = m.batches_processed == 1,
                _ => {}
            }
        }
        assert!(saw_batch && saw_metrics);
        // 4 points < min_points
        assert_eq!(h.metrics.snapshot().analyses_insufficient, 1);
    }

    #[tokio::test]
    async fn test_invalid_points_do_not_abort_batch() {
        let h = make_test_scheduler(small_config());
        h.queue.submit("s", DataPoint::new(1, 1.0));
        h.queue.submit("s", DataPoint::new(-5, 2.0));
        h.queue.submit("s", DataPoint::new(3, f64::INFINITY));
        h.queue.submit("s", DataPoint::new(4, 4.0));

        let TickOutcome::Completed(report) = h.scheduler.tick().await else {
            panic!("expected a completed batch");
        };
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 2);
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let h = make_test_scheduler(small_config());
        assert_eq!(h.scheduler.tick().await, TickOutcome::Idle);
        assert!(!h.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let h = make_test_scheduler(small_config());
        h.queue.submit("s", DataPoint::new(1, 1.0));

        h.scheduler.running.store(true, Ordering::Release);
        assert_eq!(h.scheduler.tick().await, TickOutcome::Skipped);
        assert_eq!(h.queue.len(), 1);
        assert_eq!(h.metrics.snapshot().batches_skipped, 1);

        h.scheduler.running.store(false, Ordering::Release);
        assert!(matches!(h.scheduler.tick().await, TickOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_run_drains_queue_on_shutdown() {
        let config = PipelineConfig {
            processing_interval_ms: 60_000,
            ..small_config()
        };
        let h = make_test_scheduler(config);
        for i in 1..=10 {
            h.queue.submit("s", DataPoint::new(i, i as f64));
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(h.scheduler.clone().run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(h.queue.is_empty());
        assert_eq!(h.metrics.snapshot().points_processed, 10);
    }

    #[tokio::test]
    async fn test_batch_over_deadline_is_reported() {
        let config = PipelineConfig {
            batch_size: 20,
            batch_deadline_ms: 0,
            ..small_config()
        };
        let predictive = config.predictive_config();
        let mut h = make_custom_scheduler(
            config,
            |engine| {
                engine.with_predictor(PredictiveEngine::with_estimators(
                    predictive,
                    vec![WeightedEstimator::new(Sluggish, 1.0)],
                ))
            },
            None,
        );
        // 12 points covers history_window, so the forecast runs every step
        for i in 1..=12 {
            h.queue.submit("s", DataPoint::new(i, i as f64));
        }

        let TickOutcome::Completed(report) = h.scheduler.tick().await else {
            panic!("expected a completed batch");
        };
        assert!(report.duration_ms > 0);
        assert_eq!(h.metrics.snapshot().slow_batches, 1);

        let mut exceeded = None;
        while let Ok(event) = h.rx.try_recv() {
            if let PipelineEvent::BatchDeadlineExceeded {
                batch_id,
                duration_ms,
                deadline_ms,
            } = event
            {
                exceeded = Some((batch_id, duration_ms, deadline_ms));
            }
        }
        let (batch_id, duration_ms, deadline_ms) = exceeded.expect("deadline event");
        assert_eq!(batch_id, report.batch_id);
        assert_eq!(duration_ms, report.duration_ms);
        assert_eq!(deadline_ms, 0);
    }

    #[tokio::test]
    async fn test_panicking_tick_is_isolated() {
        // Clock panics exactly once, on the first batch
        let armed = Arc::new(AtomicBool::new(true));
        let clock: Clock = {
            let armed = armed.clone();
            Arc::new(move || {
                if armed.swap(false, Ordering::AcqRel) {
                    panic!("clock failure");
                }
                1_700_000_000_000
            })
        };
        let h = make_custom_scheduler(small_config(), |engine| engine, Some(clock));

        h.queue.submit("s", DataPoint::new(1, 1.0));
        assert!(h.scheduler.guarded_tick().await.is_none());
        assert_eq!(h.metrics.snapshot().tick_panics, 1);
        assert!(!h.scheduler.is_running());

        // Next tick runs normally
        h.queue.submit("s", DataPoint::new(2, 2.0));
        let Some(TickOutcome::Completed(report)) = h.scheduler.guarded_tick().await else {
            panic!("expected the following tick to complete");
        };
        assert_eq!(report.processed, 1);
        assert_eq!(h.metrics.snapshot().tick_panics, 1);
        assert_eq!(h.metrics.snapshot().batches_processed, 1);
    }
}
