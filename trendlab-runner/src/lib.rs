//! # TrendLab Runner
//!
//! Parameter optimization and walk-forward testing on top of
//! `trendlab-core`'s backtest engine.
//!
//! ## Components
//!
//! - `metrics`: pure performance-metric functions over an equity curve and
//!   closed-trade list.
//! - `optimizer`: Cartesian-product grid search, evaluated in parallel and
//!   ranked by a chosen metric.
//! - `walk_forward`: rolling/anchored train/test window evaluation with
//!   overfitting-ratio computation.

pub mod metrics;
pub mod optimizer;
pub mod walk_forward;

pub use metrics::PerformanceMetrics;
pub use optimizer::{optimize, OptimizationMetric, OptimizationResult, OptimizerError, ParamSet, ParameterSpace, ParamValue};
pub use walk_forward::{run_walk_forward, WalkForwardConfig, WalkForwardError, WalkForwardMode, WalkForwardResult, Window, WindowResult};
