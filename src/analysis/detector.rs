//! Robust anomaly detection (median / MAD z-score)

use super::stats::{median, median_absolute_deviation};
use super::types::{AnomalyResult, Severity};

/// Ceiling for anomaly scores. A deviating point in a window whose MAD is
/// zero saturates here instead of going to infinity.
pub const MAX_ANOMALY_SCORE: f64 = 1_000.0;

/// `|value - median| / (MAD * sensitivity)`, clamped to [0, MAX_ANOMALY_SCORE].
pub fn robust_scores(values: &[f64], sensitivity_factor: f64) -> Vec<f64> {
    let center = median(values);
    let mad = median_absolute_deviation(values, center);
    let scale = mad * sensitivity_factor;

    values
        .iter()
        .map(|v| {
            let deviation = (v - center).abs();
            if deviation == 0.0 {
                0.0
            } else if scale <= 0.0 {
                MAX_ANOMALY_SCORE
            } else {
                (deviation / scale).min(MAX_ANOMALY_SCORE)
            }
        })
        .collect()
}

pub fn classify(score: f64, threshold: f64) -> Severity {
    if score > 2.0 * threshold {
        Severity::High
    } else if score > 1.5 * threshold {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Points whose robust score exceeds `threshold`, in index order.
pub fn detect_anomalies(
    values: &[f64],
    threshold: f64,
    sensitivity_factor: f64,
) -> Vec<AnomalyResult> {
    robust_scores(values, sensitivity_factor)
        .into_iter()
        .enumerate()
        .filter(|(_, score)| *score > threshold)
        .map(|(index, score)| AnomalyResult {
            index,
            value: values[index],
            score,
            severity: classify(score, threshold),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_spike_on_flat_series() {
        let anomalies = detect_anomalies(&[10.0, 10.0, 10.0, 10.0, 100.0], 2.5, 1.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].index, 4);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[0].score, MAX_ANOMALY_SCORE);
    }

    #[test]
    fn test_severity_tiers() {
        assert_eq!(classify(5.1, 2.5), Severity::High);
        assert_eq!(classify(5.0, 2.5), Severity::Medium);
        assert_eq!(classify(3.8, 2.5), Severity::Medium);
        assert_eq!(classify(3.75, 2.5), Severity::Low);
        assert_eq!(classify(2.6, 2.5), Severity::Low);
    }

    #[test]
    fn test_score_formula() {
        // median 3, |dev| = 2,1,0,1,2 -> MAD 1
        let scores = robust_scores(&[1.0, 2.0, 3.0, 4.0, 5.0], 2.0);
        assert_eq!(scores, vec![1.0, 0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_heavy_tail_does_not_mask_moderate_outlier() {
        let mut values: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
        values.push(1_000_000.0);
        values.push(130.0);

        let flagged: Vec<usize> = detect_anomalies(&values, 2.5, 1.5)
            .iter()
            .map(|a| a.index)
            .collect();
        assert!(flagged.contains(&40));
        assert!(flagged.contains(&41));
    }

    proptest! {
        #[test]
        fn prop_flagged_indices_scale_invariant(
            values in prop::collection::vec(-1_000.0f64..1_000.0, 5..60),
            exponent in -8i32..8,
        ) {
            // Powers of two scale exactly in binary floating point
            let factor = 2f64.powi(exponent);
            let scaled: Vec<f64> = values.iter().map(|v| v * factor).collect();

            let base: Vec<usize> = detect_anomalies(&values, 2.5, 1.5).iter().map(|a| a.index).collect();
            let after: Vec<usize> = detect_anomalies(&scaled, 2.5, 1.5).iter().map(|a| a.index).collect();
            prop_assert_eq!(base, after);
        }
    }
}
