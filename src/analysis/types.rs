//! Pattern recognition artifacts
//!
//! Everything here is a read-only value object produced from a window snapshot.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Trend,
    Cycle,
    Seasonality,
    Anomaly,
    Correlation,
}

/// Direction of a trend segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Typed per-kind details of a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternMetadata {
    Trend {
        direction: SegmentDirection,
        /// trend[end] - trend[start]
        magnitude: f64,
    },
    Periodic {
        period: usize,
        autocorrelation: f64,
    },
    Anomaly {
        score: f64,
        severity: Severity,
    },
    Correlation {
        lag: usize,
        coefficient: f64,
        significance: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    /// In [0, 1]
    pub confidence: f64,
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    pub metadata: PatternMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub index: usize,
    pub value: f64,
    pub score: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// In [-1, 1]
    pub coefficient: f64,
    /// 1 - two-sided p-value of the coefficient at the reported lag
    pub significance: f64,
    pub lag: usize,
    /// Number of paired observations behind the coefficient
    pub sample_size: usize,
}

/// Additive decomposition: `trend + seasonal + residual == original`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    /// Detected period when the seasonal component is non-trivial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesAnalysis {
    pub patterns: Vec<Pattern>,
    pub anomalies: Vec<AnomalyResult>,
    pub components: Components,
}
