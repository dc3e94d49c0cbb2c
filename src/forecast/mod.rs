//! # Predictive Engine
//!
//! Ensemble forecasting with confidence bounds, return-based risk metrics
//! and a trend-direction indicator.
//!
//! ## Module Organization
//!
//! - `types` - Prediction, RiskMetrics, TrendIndicator
//! - `estimators` - `Estimator` trait and the three stock estimators
//! - `ensemble` - Parallel evaluation and weighted combination
//! - `risk` - Volatility, VaR/CVaR, Sharpe-like ratio, drawdown
//! - `trend` - Direction / strength / duration indicator
//! - `predictor` - `PredictiveEngine` facade

pub mod ensemble;
pub mod estimators;
pub mod predictor;
pub mod risk;
pub mod trend;
pub mod types;

pub use estimators::Estimator;
pub use predictor::{PredictiveConfig, PredictiveEngine};
pub use types::{
    Bounds, EstimatorContribution, Prediction, PredictionMetadata, RiskMetrics, TrendDirection,
    TrendIndicator,
};
