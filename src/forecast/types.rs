//! Forecast, risk and trend artifacts

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub upper: f64,
    pub lower: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// One estimator's share of an ensemble step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorContribution {
    pub estimator: String,
    pub value: f64,
    /// Weight after renormalisation over the surviving estimators
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetadata {
    /// 1-based horizon step
    pub step: usize,
    pub contributions: Vec<EstimatorContribution>,
    /// Estimators that failed for this step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp: i64,
    pub value: f64,
    /// In [0, 1]
    pub confidence: f64,
    pub bounds: Bounds,
    pub metadata: PredictionMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub volatility: f64,
    pub var: f64,
    pub cvar: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendIndicator {
    pub direction: TrendDirection,
    /// In [0, 1]
    pub strength: f64,
    pub duration: usize,
    /// In [0, 1]
    pub confidence: f64,
}
