//! Return-based risk statistics

use super::types::RiskMetrics;
use crate::analysis::stats::{mean, percent_returns, sample_std_dev};

pub const TRADING_DAYS: f64 = 252.0;

/// Risk metrics of a value series.
///
/// Returns are simple percent changes; changes from a zero value are skipped.
/// VaR and CVaR are reported as positive losses. Max drawdown is computed on
/// the values themselves, not on returns.
pub fn analyze_risk(values: &[f64], confidence_level: f64, risk_free_rate: f64) -> RiskMetrics {
    let returns = percent_returns(values);
    let annualiser = TRADING_DAYS.sqrt();

    let volatility = sample_std_dev(&returns) * annualiser;
    let (var, cvar) = value_at_risk(&returns, confidence_level);

    let sharpe_ratio = if volatility > 0.0 {
        (mean(&returns) - risk_free_rate / TRADING_DAYS) / volatility * annualiser
    } else {
        0.0
    };

    RiskMetrics {
        volatility,
        var,
        cvar,
        sharpe_ratio,
        max_drawdown: max_drawdown(values),
    }
}

/// `(VaR, CVaR)` at `confidence_level`, both negated so losses are positive.
pub fn value_at_risk(returns: &[f64], confidence_level: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let idx = (((1.0 - confidence_level) * sorted.len() as f64).floor() as usize)
        .min(sorted.len() - 1);
    let quantile = sorted[idx];

    let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= quantile).collect();
    // 0.0 - x keeps a flat series at +0.0 rather than -0.0
    (0.0 - quantile, 0.0 - mean(&tail))
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for v in values {
        peak = peak.max(*v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}
