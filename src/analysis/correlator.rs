//! Lagged cross-correlation with Student-t significance.

use super::stats::pearson;
use super::types::CorrelationResult;
use crate::errors::{PipelineError, PipelineResult};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Fewest paired observations a lag may leave for its coefficient to count.
const MIN_OVERLAP: usize = 3;

/// Pearson correlation of `a[t]` against `b[t + lag]` for `lag` in `0..=max_lag`.
///
/// Both series are truncated to the shorter length first. The lag with the
/// largest `|r|` wins; ties go to the smallest lag.
pub fn cross_correlation(
    a: &[f64],
    b: &[f64],
    max_lag: usize,
    min_points: usize,
) -> PipelineResult<CorrelationResult> {
    let n = a.len().min(b.len());
    let required = min_points.max(MIN_OVERLAP);
    if n < required {
        return Err(PipelineError::InsufficientData {
            required,
            available: n,
        });
    }
    let (a, b) = (&a[..n], &b[..n]);

    let mut best_lag = 0;
    let mut best_corr = pearson(a, b);
    for lag in 1..=max_lag {
        if n - lag < MIN_OVERLAP || lag >= n {
            break;
        }
        let corr = pearson(&a[..n - lag], &b[lag..]);
        if corr.abs() > best_corr.abs() + 1e-12 {
            best_corr = corr;
            best_lag = lag;
        }
    }

    let sample_size = n - best_lag;
    Ok(CorrelationResult {
        coefficient: best_corr,
        significance: significance(best_corr, sample_size),
        lag: best_lag,
        sample_size,
    })
}

/// `1 - p` of the two-sided t-test for a Pearson coefficient over `m` pairs.
pub fn significance(r: f64, m: usize) -> f64 {
    if m < MIN_OVERLAP {
        return 0.0;
    }
    if r.abs() >= 1.0 {
        return 1.0;
    }

    let df = (m - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => {
            let p = 2.0 * (1.0 - dist.cdf(t.abs()));
            (1.0 - p).clamp(0.0, 1.0)
        }
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| ((i * 37 + 11) % 23) as f64 + (i as f64 * 0.7).sin() * 4.0)
            .collect()
    }

    #[test]
    fn test_identical_series_lag_zero_unit_coefficient() {
        let a = make_test_series(60);
        let result = cross_correlation(&a, &a, 10, 30).unwrap();
        assert_eq!(result.lag, 0);
        assert!((result.coefficient - 1.0).abs() < 1e-9);
        assert!(result.significance > 1.0 - 1e-9);
        assert_eq!(result.sample_size, 60);
    }

    #[test]
    fn test_shifted_series_recovers_lag() {
        let base = make_test_series(80);
        // b[t + 3] == a[t]
        let mut b = vec![0.0, 0.0, 0.0];
        b.extend_from_slice(&base[..77]);

        let result = cross_correlation(&base, &b, 10, 30).unwrap();
        assert_eq!(result.lag, 3);
        assert!(result.coefficient > 0.999);
    }

    #[test]
    fn test_unequal_lengths_truncate_to_shorter() {
        let a = make_test_series(50);
        let b = make_test_series(35);
        let result = cross_correlation(&a, &b, 5, 30).unwrap();
        assert_eq!(result.lag, 0);
        assert_eq!(result.sample_size, 35);
    }

    #[test]
    fn test_insufficient_overlap() {
        let a = make_test_series(20);
        let err = cross_correlation(&a, &a, 10, 30).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                required: 30,
                available: 20
            }
        ));
    }

    #[test]
    fn test_significance_grows_with_sample_size() {
        let small = significance(0.4, 10);
        let large = significance(0.4, 200);
        assert!(large > small);
        assert!(large > 0.99);
        assert!(significance(0.0, 50) < 1e-9);
    }
}
