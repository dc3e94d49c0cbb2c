//! Pipeline data types
//!
//! `DataPoint` is the unit of ingestion. `QueuedPoint` pairs it with the
//! logical stream it belongs to while it waits in the ingestion queue.

use crate::analysis::{AnomalyResult, Components, Pattern};
use crate::errors::{PipelineError, PipelineResult};
use crate::forecast::{Prediction, RiskMetrics, TrendIndicator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form annotations carried alongside a value.
pub type Metadata = BTreeMap<String, String>;

/// A timestamped numeric observation.
///
/// Valid points have `timestamp > 0` and a finite `value`. Validation happens
/// when the point is processed, not when it is built, so malformed input can
/// be counted instead of silently dropped at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Unix time in milliseconds
    pub timestamp: i64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl DataPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    /// Check the point invariants.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.timestamp <= 0 {
            return Err(PipelineError::InvalidInput {
                reason: format!("timestamp must be positive, got {}", self.timestamp),
            });
        }
        if !self.value.is_finite() {
            return Err(PipelineError::InvalidInput {
                reason: format!("value must be finite, got {}", self.value),
            });
        }
        Ok(())
    }
}

/// A data point waiting in the ingestion queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedPoint {
    pub stream_id: String,
    pub point: DataPoint,
    /// Clock time at which the point was accepted
    pub enqueued_at: i64,
}

/// Everything derived from one stream during one batch.
///
/// Parts that could not be computed (window too short, estimator failure) are
/// left empty and the reason is listed in `skipped`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamAnalysis {
    pub stream_id: String,
    pub analyzed_at: i64,
    pub window_len: usize,
    pub patterns: Vec<Pattern>,
    pub anomalies: Vec<AnomalyResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    pub forecast: Vec<Prediction>,
    pub risk: Option<RiskMetrics>,
    pub trend: Option<TrendIndicator>,
    pub skipped: Vec<String>,
}

impl StreamAnalysis {
    pub fn empty(stream_id: impl Into<String>, analyzed_at: i64, window_len: usize) -> Self {
        Self {
            stream_id: stream_id.into(),
            analyzed_at,
            window_len,
            patterns: Vec::new(),
            anomalies: Vec::new(),
            components: None,
            forecast: Vec::new(),
            risk: None,
            trend: None,
            skipped: Vec::new(),
        }
    }
}

/// Extract the value series of a window snapshot.
pub fn values_of(points: &[DataPoint]) -> Vec<f64> {
    points.iter().map(|p| p.value).collect()
}
