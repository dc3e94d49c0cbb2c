//! Predictive Engine
//!
//! Multi-step ensemble forecasts, risk metrics and a trend indicator over a
//! window snapshot. Every operation requires at least `history_window` points.
//!
//! Forecast steps are sequential: step `i + 1` sees step `i`'s output appended
//! to the trailing history (oldest point evicted). Inside one step the
//! estimators run in parallel.

use super::ensemble::{combine, evaluate, WeightedEstimator};
use super::estimators::{ExponentialSmoothing, LinearRegression, MovingAverage};
use super::risk::analyze_risk;
use super::trend::predict_trend;
use super::types::{Prediction, PredictionMetadata, RiskMetrics, TrendIndicator};
use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::types::{values_of, DataPoint};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Spacing used when the window carries no usable timestamp interval.
const DEFAULT_STEP_MS: i64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictiveConfig {
    pub history_window: usize,
    pub forecast_horizon: usize,
    pub smoothing_alpha: f64,
    pub ar_window: usize,
    /// Exponential smoothing, moving average, linear regression
    pub weights: [f64; 3],
    pub confidence_level: f64,
    pub risk_free_rate: f64,
    pub min_trend_duration: usize,
    pub trend_threshold: f64,
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        Self {
            history_window: 100,
            forecast_horizon: 10,
            smoothing_alpha: 0.2,
            ar_window: 5,
            weights: [0.4, 0.3, 0.3],
            confidence_level: 0.95,
            risk_free_rate: 0.02,
            min_trend_duration: 5,
            trend_threshold: 0.02,
        }
    }
}

pub struct PredictiveEngine {
    config: PredictiveConfig,
    members: Vec<WeightedEstimator>,
}

impl PredictiveEngine {
    /// Engine with the default three-estimator ensemble.
    pub fn new(config: PredictiveConfig) -> Self {
        let members = vec![
            WeightedEstimator::new(
                ExponentialSmoothing {
                    alpha: config.smoothing_alpha,
                },
                config.weights[0],
            ),
            WeightedEstimator::new(
                MovingAverage {
                    window: config.ar_window,
                },
                config.weights[1],
            ),
            WeightedEstimator::new(LinearRegression, config.weights[2]),
        ];
        Self::with_estimators(config, members)
    }

    /// Engine with a custom ensemble. `config.weights` is ignored.
    pub fn with_estimators(config: PredictiveConfig, members: Vec<WeightedEstimator>) -> Self {
        Self { config, members }
    }

    pub fn config(&self) -> &PredictiveConfig {
        &self.config
    }

    fn require(&self, available: usize) -> PipelineResult<()> {
        if available < self.config.history_window {
            return Err(PipelineError::InsufficientData {
                required: self.config.history_window,
                available,
            });
        }
        Ok(())
    }

    pub fn forecast(&self, window: &[DataPoint]) -> PipelineResult<Vec<Prediction>> {
        self.require(window.len())?;

        let values = values_of(window);
        let mut history: VecDeque<f64> = values[values.len() - self.config.history_window..]
            .iter()
            .copied()
            .collect();

        let step_ms = median_interval(window);
        let origin = window.last().map_or(0, |p| p.timestamp);
        let mut warned: HashSet<String> = HashSet::new();
        let mut predictions = Vec::with_capacity(self.config.forecast_horizon);

        for step in 1..=self.config.forecast_horizon {
            let outputs = evaluate(&self.members, history.make_contiguous());
            for o in &outputs {
                if let Err(e) = &o.result {
                    if warned.insert(o.name.to_string()) {
                        log::warn!("⚠️  Estimator {} excluded at step {}: {}", o.name, step, e);
                    }
                }
            }

            let combined = combine(&outputs)?;

            history.pop_front();
            history.push_back(combined.value);

            predictions.push(Prediction {
                timestamp: origin.saturating_add(step_ms.saturating_mul(step as i64)),
                value: combined.value,
                confidence: combined.confidence,
                bounds: combined.bounds,
                metadata: PredictionMetadata {
                    step,
                    contributions: combined.contributions,
                    excluded: combined.excluded,
                },
            });
        }

        Ok(predictions)
    }

    pub fn analyze_risk(&self, window: &[DataPoint]) -> PipelineResult<RiskMetrics> {
        self.require(window.len())?;
        Ok(analyze_risk(
            &values_of(window),
            self.config.confidence_level,
            self.config.risk_free_rate,
        ))
    }

    pub fn predict_trend(&self, window: &[DataPoint]) -> PipelineResult<TrendIndicator> {
        self.require(window.len())?;
        Ok(predict_trend(
            &values_of(window),
            self.config.min_trend_duration,
            self.config.trend_threshold,
        ))
    }
}

impl Default for PredictiveEngine {
    fn default() -> Self {
        Self::new(PredictiveConfig::default())
    }
}

impl std::fmt::Debug for PredictiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictiveEngine")
            .field("config", &self.config)
            .field("members", &self.members)
            .finish()
    }
}

/// Median positive gap between consecutive timestamps.
fn median_interval(window: &[DataPoint]) -> i64 {
    let mut gaps: Vec<i64> = window
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .filter(|g| *g > 0)
        .collect();
    if gaps.is_empty() {
        return DEFAULT_STEP_MS;
    }
    gaps.sort_unstable();
    gaps[gaps.len() / 2]
}
