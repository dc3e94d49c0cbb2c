//! Pattern Recognition Engine
//!
//! Turns a window snapshot into patterns, anomalies and additive components:
//!
//! 1. Decompose into trend / seasonal / residual
//! 2. Segment the trend into contiguous up / down runs
//! 3. Report detected periodicity as a seasonality or cycle pattern
//! 4. Flag robust z-score anomalies on the raw values
//!
//! Correlation between two windows is a separate call.

use super::correlator::cross_correlation;
use super::decomposition::decompose;
use super::detector::{detect_anomalies, MAX_ANOMALY_SCORE};
use super::stats::{mean, sample_std_dev};
use super::types::{
    CorrelationResult, Pattern, PatternMetadata, PatternType, SegmentDirection, TimeSeriesAnalysis,
};
use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::types::{values_of, DataPoint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub min_points: usize,
    /// Moving-average neighbourhood for the trend component
    pub window_size: usize,
    pub anomaly_threshold: f64,
    pub sensitivity_factor: f64,
    pub max_lag: usize,
    /// Autocorrelation at or above this is seasonality
    pub seasonality_threshold: f64,
    /// Autocorrelation at or above this (and below seasonality) is a cycle
    pub cycle_threshold: f64,
    /// |r| needed to promote a correlation result to a pattern
    pub correlation_pattern_threshold: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_points: 30,
            window_size: 10,
            anomaly_threshold: 2.5,
            sensitivity_factor: 1.5,
            max_lag: 10,
            seasonality_threshold: 0.6,
            cycle_threshold: 0.3,
            correlation_pattern_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternRecognizer {
    config: PatternConfig,
}

impl PatternRecognizer {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    fn require(&self, available: usize) -> PipelineResult<()> {
        if available < self.config.min_points {
            return Err(PipelineError::InsufficientData {
                required: self.config.min_points,
                available,
            });
        }
        Ok(())
    }

    /// Full analysis of one window. Fails before computing anything when the
    /// window holds fewer than `min_points` points.
    pub fn analyze_time_series(&self, window: &[DataPoint]) -> PipelineResult<TimeSeriesAnalysis> {
        self.require(window.len())?;
        self.analyze_values(&values_of(window))
    }

    pub fn analyze_values(&self, values: &[f64]) -> PipelineResult<TimeSeriesAnalysis> {
        self.require(values.len())?;

        let decomposition = decompose(
            values,
            self.config.window_size,
            self.config.seasonality_threshold,
            self.config.cycle_threshold,
        );
        let components = decomposition.components;

        let mut patterns = segment_trend(&components.trend);

        if let Some(p) = decomposition.periodicity {
            patterns.push(Pattern {
                pattern_type: p.kind,
                confidence: p.autocorrelation.clamp(0.0, 1.0),
                start_index: 0,
                end_index: values.len() - 1,
                metadata: PatternMetadata::Periodic {
                    period: p.period,
                    autocorrelation: p.autocorrelation,
                },
            });
        }

        let anomalies = detect_anomalies(
            values,
            self.config.anomaly_threshold,
            self.config.sensitivity_factor,
        );
        let saturation = (2.0 * self.config.anomaly_threshold).min(MAX_ANOMALY_SCORE);
        patterns.extend(anomalies.iter().map(|a| Pattern {
            pattern_type: PatternType::Anomaly,
            confidence: (a.score / saturation).clamp(0.0, 1.0),
            start_index: a.index,
            end_index: a.index,
            metadata: PatternMetadata::Anomaly {
                score: a.score,
                severity: a.severity,
            },
        }));

        Ok(TimeSeriesAnalysis {
            patterns,
            anomalies,
            components,
        })
    }

    /// Lagged correlation between two windows.
    pub fn analyze_correlation(
        &self,
        window_a: &[DataPoint],
        window_b: &[DataPoint],
    ) -> PipelineResult<CorrelationResult> {
        cross_correlation(
            &values_of(window_a),
            &values_of(window_b),
            self.config.max_lag,
            self.config.min_points,
        )
    }

    /// Correlation pattern when the result is strong and significant.
    pub fn correlation_pattern(&self, result: &CorrelationResult) -> Option<Pattern> {
        if result.coefficient.abs() < self.config.correlation_pattern_threshold
            || result.significance < 0.95
        {
            return None;
        }
        Some(Pattern {
            pattern_type: PatternType::Correlation,
            confidence: result.coefficient.abs().min(1.0) * result.significance,
            start_index: result.lag,
            end_index: result.lag + result.sample_size.saturating_sub(1),
            metadata: PatternMetadata::Correlation {
                lag: result.lag,
                coefficient: result.coefficient,
                significance: result.significance,
            },
        })
    }
}

/// Split the trend series into maximal runs of strictly rising or falling steps.
///
/// A run covering steps `s..=e` spans indices `s-1..=e`. Flat steps end a run
/// and belong to none. Confidence is a stability heuristic, `1 / (1 + cv)` of
/// the run's absolute step sizes.
pub fn segment_trend(trend: &[f64]) -> Vec<Pattern> {
    let scale = trend.iter().fold(1.0f64, |acc, v| acc.max(v.abs()));
    let eps = 1e-9 * scale;

    let step_direction = |i: usize| {
        let d = trend[i] - trend[i - 1];
        if d > eps {
            Some(SegmentDirection::Up)
        } else if d < -eps {
            Some(SegmentDirection::Down)
        } else {
            None
        }
    };

    let mut patterns = Vec::new();
    let mut run: Option<(SegmentDirection, usize)> = None;

    for i in 1..=trend.len() {
        let dir = if i < trend.len() { step_direction(i) } else { None };
        match (run, dir) {
            (Some((current, _)), Some(d)) if current == d => {}
            (Some((current, start_step)), _) => {
                patterns.push(trend_pattern(trend, current, start_step - 1, i - 1));
                run = dir.map(|d| (d, i));
            }
            (None, Some(d)) => run = Some((d, i)),
            (None, None) => {}
        }
    }
    patterns
}

fn trend_pattern(trend: &[f64], direction: SegmentDirection, start: usize, end: usize) -> Pattern {
    let steps: Vec<f64> = (start + 1..=end).map(|i| (trend[i] - trend[i - 1]).abs()).collect();
    let m = mean(&steps);
    let cv = if m > 0.0 { sample_std_dev(&steps) / m } else { 0.0 };

    Pattern {
        pattern_type: PatternType::Trend,
        confidence: 1.0 / (1.0 + cv),
        start_index: start,
        end_index: end,
        metadata: PatternMetadata::Trend {
            direction,
            magnitude: trend[end] - trend[start],
        },
    }
}
