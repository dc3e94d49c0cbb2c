//! Trend direction indicator

use super::types::{TrendDirection, TrendIndicator};
use crate::analysis::stats::percent_returns;

/// Direction, strength, duration and confidence from the recent returns.
///
/// The direction compares the compounded change over the last
/// `min_trend_duration` returns against `trend_threshold`. Strength is the
/// mean absolute recent return. Duration counts consecutive returns, newest
/// first, that agree with the direction (`|r| < threshold` for sideways).
pub fn predict_trend(values: &[f64], min_trend_duration: usize, trend_threshold: f64) -> TrendIndicator {
    let returns = percent_returns(values);
    let window = min_trend_duration.max(1).min(returns.len());
    let recent = &returns[returns.len() - window..];

    if recent.is_empty() {
        return TrendIndicator {
            direction: TrendDirection::Sideways,
            strength: 0.0,
            duration: 0,
            confidence: 0.0,
        };
    }

    let compounded = recent.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
    let direction = if compounded > trend_threshold {
        TrendDirection::Up
    } else if compounded < -trend_threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Sideways
    };

    let strength = (recent.iter().map(|r| r.abs()).sum::<f64>() / recent.len() as f64).clamp(0.0, 1.0);

    let agrees = |r: f64| match direction {
        TrendDirection::Up => r > 0.0,
        TrendDirection::Down => r < 0.0,
        TrendDirection::Sideways => r.abs() < trend_threshold,
    };
    let duration = returns.iter().rev().take_while(|r| agrees(**r)).count();

    let strength_score = if trend_threshold > 0.0 {
        (strength / trend_threshold).min(1.0)
    } else {
        1.0
    };
    let duration_score = (duration as f64 / (2 * min_trend_duration.max(1)) as f64).min(1.0);
    let confidence = match direction {
        // A flat market is most certain when nothing moves
        TrendDirection::Sideways => 0.6 * (1.0 - strength_score) + 0.4 * duration_score,
        _ => 0.6 * strength_score + 0.4 * duration_score,
    };

    TrendIndicator {
        direction,
        strength,
        duration,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_series_trends_up() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let trend = predict_trend(&values, 5, 0.02);
        assert_eq!(trend.direction, TrendDirection::Up);
        assert!(trend.strength > 0.0);
        assert_eq!(trend.duration, 99);
        assert!(trend.confidence > 0.4);
    }

    #[test]
    fn test_constant_series_is_sideways() {
        let trend = predict_trend(&[5.0; 100], 5, 0.02);
        assert_eq!(trend.direction, TrendDirection::Sideways);
        assert_eq!(trend.strength, 0.0);
        assert_eq!(trend.duration, 99);
        assert_eq!(trend.confidence, 1.0);
    }

    #[test]
    fn test_falling_series_after_rally() {
        let mut values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        values.extend((1..=6).map(|i| 119.0 * 0.95f64.powi(i)));
        let trend = predict_trend(&values, 5, 0.02);
        assert_eq!(trend.direction, TrendDirection::Down);
        assert_eq!(trend.duration, 6);
        assert!((trend.strength - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_too_short_series() {
        let trend = predict_trend(&[1.0], 5, 0.02);
        assert_eq!(trend.direction, TrendDirection::Sideways);
        assert_eq!(trend.duration, 0);
    }
}
