//! Pipeline configuration from environment variables
//!
//! Every recognised option lives in one flat [`PipelineConfig`]. Components
//! receive narrower projections (`pattern_config()`, `predictive_config()`, ...)
//! so each subsystem only sees what it uses.

use crate::analysis::PatternConfig;
use crate::errors::ConfigError;
use crate::forecast::PredictiveConfig;
use crate::memory::MemoryConfig;
use crate::pipeline::windows::WindowSettings;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Configuration for the streaming pipeline
///
/// Loaded from environment variables with defaults matching the documented
/// behaviour of each component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Ingestion
    pub batch_size: usize,
    pub max_queue_size: usize,
    pub processing_interval_ms: u64,
    /// Ceiling on the resident memory of this process
    pub memory_ceiling_bytes: usize,
    /// Minimum gap between two process memory samples
    pub memory_probe_interval_ms: u64,
    pub batch_deadline_ms: u64,
    pub analysis_timeout_ms: u64,
    pub event_channel_capacity: usize,

    // Window buffer
    pub window_capacity: usize,
    /// `None` keeps points until capacity pressure evicts them
    pub retention_period_ms: Option<u64>,

    // Pattern recognition
    pub min_points: usize,
    pub decomposition_window: usize,
    pub anomaly_threshold: f64,
    pub sensitivity_factor: f64,
    pub max_lag: usize,

    // Forecasting
    pub history_window: usize,
    pub forecast_horizon: usize,
    pub confidence_level: f64,
    pub smoothing_alpha: f64,
    pub ar_window: usize,
    pub ensemble_weights: [f64; 3],
    pub risk_free_rate: f64,
    pub min_trend_duration: usize,
    pub trend_threshold: f64,

    // Memory tiering
    pub cache_max_size: usize,
    pub cache_ttl_ms: u64,
    pub persistence_threshold: f64,
    pub compression_threshold: usize,
    pub storage_max_size: usize,
    pub cleanup_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_queue_size: 10_000,
            processing_interval_ms: 100,
            memory_ceiling_bytes: 512 * 1024 * 1024,
            memory_probe_interval_ms: 250,
            batch_deadline_ms: 1_000,
            analysis_timeout_ms: 5_000,
            event_channel_capacity: 10_000,

            window_capacity: 1_000,
            retention_period_ms: Some(3_600_000),

            min_points: 30,
            decomposition_window: 10,
            anomaly_threshold: 2.5,
            sensitivity_factor: 1.5,
            max_lag: 10,

            history_window: 100,
            forecast_horizon: 10,
            confidence_level: 0.95,
            smoothing_alpha: 0.2,
            ar_window: 5,
            ensemble_weights: [0.4, 0.3, 0.3],
            risk_free_rate: 0.02,
            min_trend_duration: 5,
            trend_threshold: 0.02,

            cache_max_size: 1_000,
            cache_ttl_ms: 60_000,
            persistence_threshold: 0.6,
            compression_threshold: 1_024,
            storage_max_size: 10_000,
            cleanup_interval_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Every field maps to `FLOWCAST_<FIELD_NAME>` in upper snake case, e.g.
    /// `FLOWCAST_BATCH_SIZE`, `FLOWCAST_CACHE_TTL_MS`. Unset variables keep
    /// their defaults; unparsable ones are rejected. `FLOWCAST_RETENTION_PERIOD_MS`
    /// accepts `0`, `none` or `inf` for unbounded retention and
    /// `FLOWCAST_ENSEMBLE_WEIGHTS` takes three comma-separated floats.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let config = Self {
            batch_size: env_or("FLOWCAST_BATCH_SIZE", d.batch_size)?,
            max_queue_size: env_or("FLOWCAST_MAX_QUEUE_SIZE", d.max_queue_size)?,
            processing_interval_ms: env_or(
                "FLOWCAST_PROCESSING_INTERVAL_MS",
                d.processing_interval_ms,
            )?,
            memory_ceiling_bytes: env_or("FLOWCAST_MEMORY_CEILING_BYTES", d.memory_ceiling_bytes)?,
            memory_probe_interval_ms: env_or(
                "FLOWCAST_MEMORY_PROBE_INTERVAL_MS",
                d.memory_probe_interval_ms,
            )?,
            batch_deadline_ms: env_or("FLOWCAST_BATCH_DEADLINE_MS", d.batch_deadline_ms)?,
            analysis_timeout_ms: env_or("FLOWCAST_ANALYSIS_TIMEOUT_MS", d.analysis_timeout_ms)?,
            event_channel_capacity: env_or(
                "FLOWCAST_EVENT_CHANNEL_CAPACITY",
                d.event_channel_capacity,
            )?,

            window_capacity: env_or("FLOWCAST_WINDOW_CAPACITY", d.window_capacity)?,
            retention_period_ms: retention_from_env(d.retention_period_ms)?,

            min_points: env_or("FLOWCAST_MIN_POINTS", d.min_points)?,
            decomposition_window: env_or("FLOWCAST_DECOMPOSITION_WINDOW", d.decomposition_window)?,
            anomaly_threshold: env_or("FLOWCAST_ANOMALY_THRESHOLD", d.anomaly_threshold)?,
            sensitivity_factor: env_or("FLOWCAST_SENSITIVITY_FACTOR", d.sensitivity_factor)?,
            max_lag: env_or("FLOWCAST_MAX_LAG", d.max_lag)?,

            history_window: env_or("FLOWCAST_HISTORY_WINDOW", d.history_window)?,
            forecast_horizon: env_or("FLOWCAST_FORECAST_HORIZON", d.forecast_horizon)?,
            confidence_level: env_or("FLOWCAST_CONFIDENCE_LEVEL", d.confidence_level)?,
            smoothing_alpha: env_or("FLOWCAST_SMOOTHING_ALPHA", d.smoothing_alpha)?,
            ar_window: env_or("FLOWCAST_AR_WINDOW", d.ar_window)?,
            ensemble_weights: weights_from_env(d.ensemble_weights)?,
            risk_free_rate: env_or("FLOWCAST_RISK_FREE_RATE", d.risk_free_rate)?,
            min_trend_duration: env_or("FLOWCAST_MIN_TREND_DURATION", d.min_trend_duration)?,
            trend_threshold: env_or("FLOWCAST_TREND_THRESHOLD", d.trend_threshold)?,

            cache_max_size: env_or("FLOWCAST_CACHE_MAX_SIZE", d.cache_max_size)?,
            cache_ttl_ms: env_or("FLOWCAST_CACHE_TTL_MS", d.cache_ttl_ms)?,
            persistence_threshold: env_or(
                "FLOWCAST_PERSISTENCE_THRESHOLD",
                d.persistence_threshold,
            )?,
            compression_threshold: env_or(
                "FLOWCAST_COMPRESSION_THRESHOLD",
                d.compression_threshold,
            )?,
            storage_max_size: env_or("FLOWCAST_STORAGE_MAX_SIZE", d.storage_max_size)?,
            cleanup_interval_ms: env_or("FLOWCAST_CLEANUP_INTERVAL_MS", d.cleanup_interval_ms)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive_counts = [
            ("batch_size", self.batch_size),
            ("max_queue_size", self.max_queue_size),
            ("window_capacity", self.window_capacity),
            ("min_points", self.min_points),
            ("decomposition_window", self.decomposition_window),
            ("history_window", self.history_window),
            ("forecast_horizon", self.forecast_horizon),
            ("ar_window", self.ar_window),
            ("min_trend_duration", self.min_trend_duration),
            ("cache_max_size", self.cache_max_size),
            ("storage_max_size", self.storage_max_size),
            ("event_channel_capacity", self.event_channel_capacity),
        ];
        for (name, value) in positive_counts {
            if value == 0 {
                return Err(ConfigError::Constraint(format!("{} must be > 0", name)));
            }
        }

        // Both drive tokio intervals, which panic on a zero period
        let periods = [
            ("processing_interval_ms", self.processing_interval_ms),
            ("cleanup_interval_ms", self.cleanup_interval_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(ConfigError::Constraint(format!("{} must be > 0", name)));
            }
        }
        if self.window_capacity < self.min_points.max(self.history_window) {
            log::warn!(
                "window_capacity {} is below min_points/history_window; analysis will never run",
                self.window_capacity
            );
        }
        if !(self.anomaly_threshold > 0.0) || !(self.sensitivity_factor > 0.0) {
            return Err(ConfigError::Constraint(
                "anomaly_threshold and sensitivity_factor must be > 0".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ConfigError::Constraint(
                "confidence_level must lie in (0, 1)".to_string(),
            ));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::Constraint(
                "smoothing_alpha must lie in (0, 1]".to_string(),
            ));
        }
        if self.ensemble_weights.iter().any(|w| !(*w >= 0.0)) {
            return Err(ConfigError::Constraint(
                "ensemble_weights must be non-negative".to_string(),
            ));
        }
        let weight_sum: f64 = self.ensemble_weights.iter().sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Constraint(format!(
                "ensemble_weights must sum to 1, got {}",
                weight_sum
            )));
        }
        if !(self.trend_threshold > 0.0) {
            return Err(ConfigError::Constraint(
                "trend_threshold must be > 0".to_string(),
            ));
        }
        if !self.persistence_threshold.is_finite() {
            return Err(ConfigError::Constraint(
                "persistence_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn window_settings(&self) -> WindowSettings {
        WindowSettings {
            capacity: self.window_capacity,
            retention_period_ms: self.retention_period_ms,
        }
    }

    pub fn pattern_config(&self) -> PatternConfig {
        PatternConfig {
            min_points: self.min_points,
            window_size: self.decomposition_window,
            anomaly_threshold: self.anomaly_threshold,
            sensitivity_factor: self.sensitivity_factor,
            max_lag: self.max_lag,
            ..PatternConfig::default()
        }
    }

    pub fn predictive_config(&self) -> PredictiveConfig {
        PredictiveConfig {
            history_window: self.history_window,
            forecast_horizon: self.forecast_horizon,
            smoothing_alpha: self.smoothing_alpha,
            ar_window: self.ar_window,
            weights: self.ensemble_weights,
            confidence_level: self.confidence_level,
            risk_free_rate: self.risk_free_rate,
            min_trend_duration: self.min_trend_duration,
            trend_threshold: self.trend_threshold,
        }
    }

    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            cache_max_size: self.cache_max_size,
            cache_ttl_ms: self.cache_ttl_ms,
            persistence_threshold: self.persistence_threshold,
            compression_threshold: self.compression_threshold,
            storage_max_size: self.storage_max_size,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn retention_from_env(default: Option<u64>) -> Result<Option<u64>, ConfigError> {
    const KEY: &str = "FLOWCAST_RETENTION_PERIOD_MS";
    let Ok(raw) = env::var(KEY) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "0" | "none" | "inf" | "infinite" => Ok(None),
        other => other
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: KEY.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn weights_from_env(default: [f64; 3]) -> Result<[f64; 3], ConfigError> {
    const KEY: &str = "FLOWCAST_ENSEMBLE_WEIGHTS";
    let Ok(raw) = env::var(KEY) else {
        return Ok(default);
    };
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: KEY.to_string(),
        value: raw.clone(),
        reason,
    };

    let parsed = raw
        .split(',')
        .map(|s| s.trim().parse::<f64>().map_err(|e| invalid(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    match parsed.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(invalid(format!("expected 3 weights, got {}", parsed.len()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests share process state; keep them in one test so they never race.
    #[test]
    fn test_env_loading() {
        // Test: Default configuration when no env vars set
        env::remove_var("FLOWCAST_BATCH_SIZE");
        env::remove_var("FLOWCAST_RETENTION_PERIOD_MS");
        env::remove_var("FLOWCAST_ENSEMBLE_WEIGHTS");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config, PipelineConfig::default());

        // Test: Custom configuration from env vars
        env::set_var("FLOWCAST_BATCH_SIZE", "250");
        env::set_var("FLOWCAST_RETENTION_PERIOD_MS", "inf");
        env::set_var("FLOWCAST_ENSEMBLE_WEIGHTS", "0.5, 0.25, 0.25");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.retention_period_ms, None);
        assert_eq!(config.ensemble_weights, [0.5, 0.25, 0.25]);

        // Test: Unparsable value is rejected, not defaulted
        env::set_var("FLOWCAST_BATCH_SIZE", "lots");
        let err = PipelineConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FLOWCAST_BATCH_SIZE"));

        // Cleanup
        env::remove_var("FLOWCAST_BATCH_SIZE");
        env::remove_var("FLOWCAST_RETENTION_PERIOD_MS");
        env::remove_var("FLOWCAST_ENSEMBLE_WEIGHTS");
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let config = PipelineConfig {
            ensemble_weights: [0.5, 0.5, 0.5],
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Constraint(_))));
    }

    #[test]
    fn test_validate_rejects_zero_sizes_and_bad_ranges() {
        let zero_batch = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(zero_batch.validate().is_err());

        let bad_confidence = PipelineConfig {
            confidence_level: 1.0,
            ..PipelineConfig::default()
        };
        assert!(bad_confidence.validate().is_err());

        let bad_alpha = PipelineConfig {
            smoothing_alpha: 0.0,
            ..PipelineConfig::default()
        };
        assert!(bad_alpha.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        // Test: a zero cleanup period would kill the cleanup task at start
        let zero_cleanup = PipelineConfig {
            cleanup_interval_ms: 0,
            ..PipelineConfig::default()
        };
        let err = zero_cleanup.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Constraint(ref msg) if msg.contains("cleanup_interval_ms")));

        let zero_processing = PipelineConfig {
            processing_interval_ms: 0,
            ..PipelineConfig::default()
        };
        assert!(zero_processing.validate().is_err());

        // Test: zero probe interval is allowed (sample on every submit)
        let eager_probe = PipelineConfig {
            memory_probe_interval_ms: 0,
            ..PipelineConfig::default()
        };
        assert!(eager_probe.validate().is_ok());
    }

    #[test]
    fn test_projections_carry_values() {
        let config = PipelineConfig {
            min_points: 5,
            history_window: 50,
            cache_ttl_ms: 10,
            window_capacity: 64,
            retention_period_ms: None,
            ..PipelineConfig::default()
        };

        assert_eq!(config.pattern_config().min_points, 5);
        assert_eq!(config.predictive_config().history_window, 50);
        assert_eq!(config.memory_config().cache_ttl_ms, 10);
        assert_eq!(config.window_settings().capacity, 64);
        assert_eq!(config.window_settings().retention_period_ms, None);
    }
}
