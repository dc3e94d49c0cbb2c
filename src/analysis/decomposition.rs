//! Additive trend / seasonal / residual decomposition
//!
//! The trend is a centred moving average. Periodicity is searched on the
//! de-trended interior (where the smoothing window is symmetric) by
//! autocorrelation. Strong periodicity yields a per-phase seasonal component,
//! moderate periodicity is only reported as a cycle.

use super::stats::{autocorrelation, mean, variance};
use super::types::{Components, PatternType};

const MIN_PERIOD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Periodicity {
    /// `Seasonality` or `Cycle`
    pub kind: PatternType,
    pub period: usize,
    pub autocorrelation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub components: Components,
    pub periodicity: Option<Periodicity>,
}

/// Centred moving average. Index `i` averages `values[i-half ..= i+half]`
/// with `half = window_size / 2`, clamped at the edges.
pub fn moving_average_trend(values: &[f64], window_size: usize) -> Vec<f64> {
    let n = values.len();
    let half = window_size / 2;

    // Prefix sums keep this O(n) for any window size
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64
        })
        .collect()
}

/// Strongest autocorrelation peak of `series` over lags `2..=len/2`.
pub fn dominant_period(series: &[f64]) -> Option<(usize, f64)> {
    let max_period = series.len() / 2;
    if max_period < MIN_PERIOD {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in MIN_PERIOD..=max_period {
        let acf = autocorrelation(series, lag);
        match best {
            Some((_, best_acf)) if acf <= best_acf => {}
            _ => best = Some((lag, acf)),
        }
    }
    best.filter(|(_, acf)| *acf > 0.0)
}

pub fn decompose(
    values: &[f64],
    window_size: usize,
    seasonality_threshold: f64,
    cycle_threshold: f64,
) -> Decomposition {
    let n = values.len();
    let trend = moving_average_trend(values, window_size);
    let detrended: Vec<f64> = values.iter().zip(&trend).map(|(v, t)| v - t).collect();

    let half = window_size / 2;
    let interior: &[f64] = if n > 2 * half {
        &detrended[half..n - half]
    } else {
        &[]
    };

    // A residual that is numerically zero carries no periodic signal
    let scale = variance(values).max(1.0);
    let periodicity = if variance(interior) <= 1e-12 * scale {
        None
    } else {
        dominant_period(interior).and_then(|(period, acf)| {
            let kind = if acf >= seasonality_threshold {
                PatternType::Seasonality
            } else if acf >= cycle_threshold {
                PatternType::Cycle
            } else {
                return None;
            };
            Some(Periodicity {
                kind,
                period,
                autocorrelation: acf,
            })
        })
    };

    let seasonal = match periodicity {
        Some(p) if p.kind == PatternType::Seasonality => {
            seasonal_profile(&detrended, half, n, p.period)
        }
        _ => vec![0.0; n],
    };

    let residual: Vec<f64> = (0..n).map(|i| values[i] - trend[i] - seasonal[i]).collect();

    Decomposition {
        components: Components {
            trend,
            seasonal,
            residual,
            period: periodicity
                .filter(|p| p.kind == PatternType::Seasonality)
                .map(|p| p.period),
        },
        periodicity,
    }
}

/// Per-phase mean of the de-trended interior, centred to zero and tiled over `n`.
fn seasonal_profile(detrended: &[f64], half: usize, n: usize, period: usize) -> Vec<f64> {
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for i in half..n.saturating_sub(half) {
        sums[i % period] += detrended[i];
        counts[i % period] += 1;
    }

    let phase_means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
        .collect();
    let offset = mean(&phase_means);

    (0..n).map(|i| phase_means[i % period] - offset).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_additive(values: &[f64], c: &Components) {
        for i in 0..values.len() {
            let rebuilt = c.trend[i] + c.seasonal[i] + c.residual[i];
            assert!((rebuilt - values[i]).abs() < 1e-9, "index {}", i);
        }
    }

    #[test]
    fn test_moving_average_clamps_edges() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let trend = moving_average_trend(&values, 2);
        // half = 1: [1,2] [1,2,3] [2,3,4] [3,4,5] [4,5]
        assert_eq!(trend, vec![1.5, 2.0, 3.0, 4.0, 4.5]);
    }

    #[test]
    fn test_linear_series_has_no_periodicity() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let d = decompose(&values, 10, 0.6, 0.3);
        assert!(d.periodicity.is_none());
        assert!(d.components.seasonal.iter().all(|s| *s == 0.0));
        assert_additive(&values, &d.components);
    }

    #[test]
    fn test_sine_wave_detected_as_seasonality() {
        let values: Vec<f64> = (0..120)
            .map(|i| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        let d = decompose(&values, 10, 0.6, 0.3);

        let p = d.periodicity.expect("periodicity");
        assert_eq!(p.kind, PatternType::Seasonality);
        assert_eq!(p.period, 12);
        assert_eq!(d.components.period, Some(12));
        assert!(d.components.seasonal.iter().any(|s| s.abs() > 1.0));
        assert_additive(&values, &d.components);
    }

    #[test]
    fn test_short_series_is_still_additive() {
        let values = [3.0, 1.0, 4.0];
        let d = decompose(&values, 10, 0.6, 0.3);
        assert!(d.periodicity.is_none());
        assert_additive(&values, &d.components);
    }
}
