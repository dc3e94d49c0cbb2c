//! Weighted ensemble of independent estimators
//!
//! Estimators run in parallel on the same history (rayon), then one
//! combination step folds the surviving outputs. Failed estimators are
//! excluded and the remaining weights renormalised.

use super::estimators::Estimator;
use super::types::{Bounds, EstimatorContribution};
use crate::analysis::stats::variance;
use crate::errors::{EstimatorError, PipelineError, PipelineResult};
use rayon::prelude::*;

/// z-score of a two-sided 95% normal interval
pub const BOUNDS_Z: f64 = 1.96;

pub struct WeightedEstimator {
    pub estimator: Box<dyn Estimator>,
    pub weight: f64,
}

impl WeightedEstimator {
    pub fn new(estimator: impl Estimator + 'static, weight: f64) -> Self {
        Self {
            estimator: Box::new(estimator),
            weight,
        }
    }
}

impl std::fmt::Debug for WeightedEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedEstimator")
            .field("estimator", &self.estimator.name())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Raw result of one estimator for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorOutput {
    pub name: &'static str,
    pub weight: f64,
    pub result: Result<f64, EstimatorError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleStep {
    pub value: f64,
    /// `exp(-variance)` of the surviving outputs
    pub confidence: f64,
    pub bounds: Bounds,
    pub contributions: Vec<EstimatorContribution>,
    pub excluded: Vec<String>,
}

/// Evaluate every member on `history` in parallel. Output order follows `members`.
pub fn evaluate(members: &[WeightedEstimator], history: &[f64]) -> Vec<EstimatorOutput> {
    members
        .par_iter()
        .map(|m| EstimatorOutput {
            name: m.estimator.name(),
            weight: m.weight,
            result: m.estimator.estimate(history).and_then(|v| {
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(EstimatorError::NonFinite {
                        estimator: m.estimator.name().to_string(),
                    })
                }
            }),
        })
        .collect()
}

pub fn combine(outputs: &[EstimatorOutput]) -> PipelineResult<EnsembleStep> {
    let survivors: Vec<(&'static str, f64, f64)> = outputs
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|v| (o.name, o.weight, *v)))
        .collect();
    let excluded: Vec<String> = outputs
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| o.name.to_string())
        .collect();

    if survivors.is_empty() {
        return Err(PipelineError::analysis(
            "ensemble",
            format!("all estimators failed ({})", excluded.join(", ")),
        ));
    }

    let total: f64 = survivors.iter().map(|(_, w, _)| w.max(0.0)).sum();
    let normalise = |w: f64| {
        if total > 0.0 {
            w.max(0.0) / total
        } else {
            1.0 / survivors.len() as f64
        }
    };

    let contributions: Vec<EstimatorContribution> = survivors
        .iter()
        .map(|(name, w, v)| EstimatorContribution {
            estimator: name.to_string(),
            value: *v,
            weight: normalise(*w),
        })
        .collect();

    let value: f64 = contributions.iter().map(|c| c.weight * c.value).sum();
    let values: Vec<f64> = survivors.iter().map(|(_, _, v)| *v).collect();
    let var = variance(&values);
    let spread = BOUNDS_Z * var.sqrt();

    Ok(EnsembleStep {
        value,
        confidence: (-var).exp().clamp(0.0, 1.0),
        bounds: Bounds {
            upper: value + spread,
            lower: value - spread,
        },
        contributions,
        excluded,
    })
}
