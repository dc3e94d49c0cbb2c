//! Pipeline Engine - per-batch processing and per-stream analysis
//!
//! ```text
//! Vec<QueuedPoint>
//!     ↓
//! PipelineEngine::process_batch()   validate, push into windows
//!     ↓
//! touched streams
//!     ↓
//! PipelineEngine::analyze_stream()  one snapshot, two parallel tasks:
//!     ├─ PatternRecognizer   (patterns, anomalies, components)
//!     └─ PredictiveEngine    (forecast, risk, trend)
//!     ↓
//! StreamAnalysis → MemoryTieringManager + AnalysisCompleted event
//! ```

use super::config::PipelineConfig;
use super::events::{EventSink, PipelineEvent};
use super::metrics::MetricsCollector;
use super::types::{QueuedPoint, StreamAnalysis};
use super::windows::WindowBuffer;
use crate::analysis::{CorrelationResult, PatternRecognizer};
use crate::clock::Clock;
use crate::errors::{PipelineError, PipelineResult};
use crate::forecast::PredictiveEngine;
use crate::memory::{MemoryTieringManager, Payload};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

/// Memory key of one artifact of a stream, e.g. `"cpu/forecast"`.
pub fn artifact_key(stream_id: &str, artifact: &str) -> String {
    format!("{}/{}", stream_id, artifact)
}

/// Result of pushing one batch into the windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub errors: usize,
    /// Streams that received at least one valid point, in first-seen order
    pub touched: Vec<String>,
}

pub struct PipelineEngine {
    windows: Arc<WindowBuffer>,
    recognizer: Arc<PatternRecognizer>,
    predictor: Arc<PredictiveEngine>,
    memory: Arc<MemoryTieringManager>,
    events: EventSink,
    metrics: Arc<MetricsCollector>,
    clock: Clock,
    analysis_timeout: Duration,
}

impl PipelineEngine {
    pub fn new(
        config: &PipelineConfig,
        windows: Arc<WindowBuffer>,
        memory: Arc<MemoryTieringManager>,
        events: EventSink,
        metrics: Arc<MetricsCollector>,
        clock: Clock,
    ) -> Self {
        Self {
            windows,
            recognizer: Arc::new(PatternRecognizer::new(config.pattern_config())),
            predictor: Arc::new(PredictiveEngine::new(config.predictive_config())),
            memory,
            events,
            metrics,
            clock,
            analysis_timeout: Duration::from_millis(config.analysis_timeout_ms),
        }
    }

    /// Replace the predictive engine, e.g. with a custom estimator ensemble.
    pub fn with_predictor(mut self, predictor: PredictiveEngine) -> Self {
        self.predictor = Arc::new(predictor);
        self
    }

    pub fn windows(&self) -> &Arc<WindowBuffer> {
        &self.windows
    }

    pub fn memory(&self) -> &Arc<MemoryTieringManager> {
        &self.memory
    }

    /// Validate each point and push the valid ones, in order.
    ///
    /// Invalid points are counted and skipped; they never abort the batch.
    pub fn process_batch(&self, batch: Vec<QueuedPoint>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for queued in batch {
            if let Err(e) = queued.point.validate() {
                outcome.errors += 1;
                log::debug!("Skipping point for {}: {}", queued.stream_id, e);
                continue;
            }

            self.windows.push(&queued.stream_id, queued.point.clone());
            self.events.emit(PipelineEvent::DataProcessed {
                stream_id: queued.stream_id.clone(),
                point: queued.point,
            });
            outcome.processed += 1;

            if seen.insert(queued.stream_id.clone()) {
                outcome.touched.push(queued.stream_id);
            }
        }

        self.metrics.record_points(outcome.processed, outcome.errors);
        outcome
    }

    /// Analyze the current window of one stream.
    ///
    /// Pattern recognition and prediction run as parallel blocking tasks over
    /// the same snapshot, bounded together by the analysis timeout. A part
    /// whose own minimum is not met is skipped; when the window is below both
    /// minimums the whole call fails with `InsufficientData`.
    pub async fn analyze_stream(&self, stream_id: &str) -> PipelineResult<StreamAnalysis> {
        let snapshot = Arc::new(self.windows.snapshot(stream_id));
        let required = self
            .recognizer
            .config()
            .min_points
            .min(self.predictor.config().history_window);
        if snapshot.len() < required {
            return Err(PipelineError::InsufficientData {
                required,
                available: snapshot.len(),
            });
        }

        let pattern_task = {
            let recognizer = self.recognizer.clone();
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || recognizer.analyze_time_series(&snapshot))
        };
        let predict_task = {
            let predictor = self.predictor.clone();
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || {
                (
                    predictor.forecast(&snapshot),
                    predictor.analyze_risk(&snapshot),
                    predictor.predict_trend(&snapshot),
                )
            })
        };

        let joined = timeout(self.analysis_timeout, async {
            tokio::join!(pattern_task, predict_task)
        })
        .await;
        let (pattern_joined, predict_joined) = joined.map_err(|_| PipelineError::Timeout {
            operation: format!("analysis of {}", stream_id),
            timeout_ms: self.analysis_timeout.as_millis() as u64,
        })?;

        let pattern_result =
            pattern_joined.map_err(|e| PipelineError::analysis("pattern_recognition", e.to_string()))?;
        let (forecast, risk, trend) =
            predict_joined.map_err(|e| PipelineError::analysis("predictive_engine", e.to_string()))?;

        let mut analysis = StreamAnalysis::empty(stream_id, (self.clock)(), snapshot.len());

        match pattern_result {
            Ok(ts) => {
                analysis.patterns = ts.patterns;
                analysis.anomalies = ts.anomalies;
                analysis.components = Some(ts.components);
            }
            Err(e) => self.skip(&mut analysis, "patterns", e),
        }
        match forecast {
            Ok(predictions) => analysis.forecast = predictions,
            Err(e) => self.skip(&mut analysis, "forecast", e),
        }
        match risk {
            Ok(r) => analysis.risk = Some(r),
            Err(e) => self.skip(&mut analysis, "risk", e),
        }
        match trend {
            Ok(t) => analysis.trend = Some(t),
            Err(e) => self.skip(&mut analysis, "trend", e),
        }

        self.persist(&analysis);
        self.metrics.record_analysis_completed();
        self.events
            .emit(PipelineEvent::AnalysisCompleted(Box::new(analysis.clone())));
        Ok(analysis)
    }

    fn skip(&self, analysis: &mut StreamAnalysis, part: &str, err: PipelineError) {
        if matches!(err, PipelineError::AnalysisFailure { .. }) {
            self.metrics.record_analysis_failure();
            log::warn!("⚠️  {} of {} failed: {}", part, analysis.stream_id, err);
        }
        analysis.skipped.push(format!("{}: {}", part, err));
    }

    /// Hand every computed artifact to the memory tier.
    fn persist(&self, analysis: &StreamAnalysis) {
        let sid = &analysis.stream_id;
        let mut artifacts: Vec<(&str, Payload)> = Vec::new();

        if analysis.components.is_some() {
            artifacts.push(("patterns", Payload::Patterns(analysis.patterns.clone())));
            artifacts.push(("anomalies", Payload::Anomalies(analysis.anomalies.clone())));
        }
        if !analysis.forecast.is_empty() {
            artifacts.push(("forecast", Payload::Forecast(analysis.forecast.clone())));
        }
        if let Some(risk) = analysis.risk {
            artifacts.push(("risk", Payload::Risk(risk)));
        }
        if let Some(trend) = analysis.trend {
            artifacts.push(("trend", Payload::Trend(trend)));
        }

        for (artifact, payload) in artifacts {
            let key = artifact_key(sid, artifact);
            if let Err(e) = self.memory.store(&key, payload) {
                log::warn!("⚠️  Could not store {}: {}", key, e);
            }
        }
    }

    /// Lagged correlation between the live windows of two streams.
    pub fn correlate(&self, stream_a: &str, stream_b: &str) -> PipelineResult<CorrelationResult> {
        let a = self.windows.snapshot(stream_a);
        let b = self.windows.snapshot(stream_b);
        let result = self.recognizer.analyze_correlation(&a, &b)?;

        if let Some(pattern) = self.recognizer.correlation_pattern(&result) {
            log::debug!(
                "🔗 {} ~ {} correlated (r={:.3}, lag {}, confidence {:.2})",
                stream_a,
                stream_b,
                result.coefficient,
                result.lag,
                pattern.confidence
            );
        }

        let key = artifact_key(&format!("{}~{}", stream_a, stream_b), "correlation");
        if let Err(e) = self.memory.store(&key, Payload::Correlation(result.clone())) {
            log::warn!("⚠️  Could not store {}: {}", key, e);
        }
        Ok(result)
    }
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("window_settings", &self.windows.settings())
            .field("analysis_timeout", &self.analysis_timeout)
            .finish()
    }
}
