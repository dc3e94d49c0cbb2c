//! # Pattern Recognition
//!
//! Structural analysis of a single window snapshot, plus lagged correlation
//! between two windows.
//!
//! ## Module Organization
//!
//! - `types` - Pattern, AnomalyResult, CorrelationResult, Components
//! - `stats` - Moments, median/MAD, Pearson, autocorrelation
//! - `decomposition` - Moving-average trend and seasonal extraction
//! - `detector` - Median/MAD robust z-score anomalies
//! - `correlator` - Lag search with t-test significance
//! - `patterns` - `PatternRecognizer` facade and trend segmentation

pub mod correlator;
pub mod decomposition;
pub mod detector;
pub mod patterns;
pub mod stats;
pub mod types;

pub use patterns::{PatternConfig, PatternRecognizer};
pub use types::{
    AnomalyResult, Components, CorrelationResult, Pattern, PatternMetadata, PatternType,
    SegmentDirection, Severity, TimeSeriesAnalysis,
};
