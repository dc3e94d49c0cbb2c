//! Importance scoring for persistence promotion
//!
//! ## Default policy
//!
//! **importance** (0-1 scale):
//! - Payload kind (40%): anomalies and risk outrank raw bytes
//! - Access frequency (30%): stores + retrievals of the key, saturating at 10
//! - Payload volatility (30%): how much the artifact says "something is moving"

use super::payload::{Payload, PayloadKind};
use crate::analysis::{PatternType, Severity};

const KIND_WEIGHT: f64 = 0.4;
const FREQUENCY_WEIGHT: f64 = 0.3;
const VOLATILITY_WEIGHT: f64 = 0.3;
const FREQUENCY_SATURATION: f64 = 10.0;

/// Per-key usage seen by the memory manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessStats {
    pub stores: u64,
    pub retrievals: u64,
    pub last_access: i64,
}

impl AccessStats {
    pub fn total(&self) -> u64 {
        self.stores + self.retrievals
    }
}

/// Decides how worth keeping a payload is. Scores are in [0, 1].
pub trait ImportancePolicy: Send + Sync {
    fn score(&self, payload: &Payload, access: &AccessStats) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultImportance;

impl DefaultImportance {
    pub fn kind_score(kind: PayloadKind) -> f64 {
        match kind {
            PayloadKind::Anomalies => 0.9,
            PayloadKind::Risk => 0.8,
            PayloadKind::Forecast => 0.7,
            PayloadKind::Trend => 0.6,
            PayloadKind::Correlation => 0.6,
            PayloadKind::Patterns => 0.5,
            PayloadKind::Raw => 0.2,
        }
    }

    /// Normalised "how much is happening" signal of the payload.
    pub fn volatility(payload: &Payload) -> f64 {
        let v = match payload {
            Payload::Anomalies(anomalies) => anomalies
                .iter()
                .map(|a| match a.severity {
                    Severity::High => 1.0,
                    Severity::Medium => 0.6,
                    Severity::Low => 0.3,
                })
                .fold(0.0, f64::max),
            Payload::Risk(risk) => risk.volatility.max(risk.max_drawdown),
            Payload::Forecast(predictions) if !predictions.is_empty() => {
                let mean_conf =
                    predictions.iter().map(|p| p.confidence).sum::<f64>() / predictions.len() as f64;
                1.0 - mean_conf
            }
            Payload::Forecast(_) => 0.0,
            Payload::Trend(trend) => trend.strength,
            Payload::Correlation(c) => c.coefficient.abs(),
            Payload::Patterns(patterns) => {
                if patterns.iter().any(|p| {
                    matches!(p.pattern_type, PatternType::Anomaly | PatternType::Seasonality)
                }) {
                    0.5
                } else {
                    0.0
                }
            }
            Payload::Raw(_) => 0.0,
        };
        if v.is_finite() {
            v.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl ImportancePolicy for DefaultImportance {
    fn score(&self, payload: &Payload, access: &AccessStats) -> f64 {
        let kind = Self::kind_score(payload.kind());
        let frequency = (access.total() as f64 / FREQUENCY_SATURATION).min(1.0);
        let volatility = Self::volatility(payload);

        (KIND_WEIGHT * kind + FREQUENCY_WEIGHT * frequency + VOLATILITY_WEIGHT * volatility)
            .clamp(0.0, 1.0)
    }
}
