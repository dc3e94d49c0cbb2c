//! Independent one-step forecasting estimators
//!
//! Each estimator sees only the trailing history and returns a single value.
//! They share no state, so an ensemble can evaluate them in parallel.

use crate::errors::EstimatorError;

pub trait Estimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Forecast the value following `history`.
    fn estimate(&self, history: &[f64]) -> Result<f64, EstimatorError>;
}

fn finite(name: &str, value: f64) -> Result<f64, EstimatorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EstimatorError::NonFinite {
            estimator: name.to_string(),
        })
    }
}

/// Simple exponential smoothing; the level starts at the first observation.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialSmoothing {
    pub alpha: f64,
}

impl Estimator for ExponentialSmoothing {
    fn name(&self) -> &'static str {
        "exponential_smoothing"
    }

    fn estimate(&self, history: &[f64]) -> Result<f64, EstimatorError> {
        let (first, rest) = history.split_first().ok_or(EstimatorError::NotEnoughHistory {
            needed: 1,
            available: 0,
        })?;
        let level = rest
            .iter()
            .fold(*first, |level, x| self.alpha * x + (1.0 - self.alpha) * level);
        finite(self.name(), level)
    }
}

/// Mean of the last `window` points, a cheap autoregressive proxy.
#[derive(Debug, Clone, Copy)]
pub struct MovingAverage {
    pub window: usize,
}

impl Estimator for MovingAverage {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn estimate(&self, history: &[f64]) -> Result<f64, EstimatorError> {
        if self.window == 0 || history.len() < self.window {
            return Err(EstimatorError::NotEnoughHistory {
                needed: self.window.max(1),
                available: history.len(),
            });
        }
        let tail = &history[history.len() - self.window..];
        finite(self.name(), tail.iter().sum::<f64>() / self.window as f64)
    }
}

/// Least-squares line over (index, value), evaluated at the next index.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegression;

impl Estimator for LinearRegression {
    fn name(&self) -> &'static str {
        "linear_regression"
    }

    fn estimate(&self, history: &[f64]) -> Result<f64, EstimatorError> {
        let n = history.len();
        if n < 2 {
            return Err(EstimatorError::NotEnoughHistory {
                needed: 2,
                available: n,
            });
        }

        let nf = n as f64;
        let mean_x = (nf - 1.0) / 2.0;
        let mean_y = history.iter().sum::<f64>() / nf;

        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (i, y) in history.iter().enumerate() {
            let dx = i as f64 - mean_x;
            sxy += dx * (y - mean_y);
            sxx += dx * dx;
        }
        if sxx <= 0.0 {
            return Err(EstimatorError::Degenerate {
                reason: "zero index variance".to_string(),
            });
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        finite(self.name(), intercept + slope * nf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_smoothing_recursion() {
        let es = ExponentialSmoothing { alpha: 0.5 };
        // 4 -> 0.5*8 + 0.5*4 = 6 -> 0.5*2 + 0.5*6 = 4
        assert_eq!(es.estimate(&[4.0, 8.0, 2.0]).unwrap(), 4.0);
        assert_eq!(es.estimate(&[7.0]).unwrap(), 7.0);
        assert!(matches!(
            es.estimate(&[]),
            Err(EstimatorError::NotEnoughHistory { .. })
        ));
    }

    #[test]
    fn test_moving_average_uses_tail() {
        let ma = MovingAverage { window: 3 };
        assert_eq!(ma.estimate(&[100.0, 1.0, 2.0, 3.0]).unwrap(), 2.0);
        assert!(ma.estimate(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_linear_regression_extrapolates_line() {
        let history: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let next = LinearRegression.estimate(&history).unwrap();
        assert!((next - 23.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_output_is_an_error() {
        let es = ExponentialSmoothing { alpha: 0.5 };
        assert!(matches!(
            es.estimate(&[1.0, f64::NAN]),
            Err(EstimatorError::NonFinite { .. })
        ));
        assert!(matches!(
            LinearRegression.estimate(&[1.0, f64::INFINITY]),
            Err(EstimatorError::NonFinite { .. })
        ));
    }
}
