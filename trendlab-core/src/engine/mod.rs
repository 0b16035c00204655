//! The bar-by-bar backtest engine.

pub mod accounting;
pub mod cancel;
pub mod config;
pub mod run;
pub mod warmup;

pub use accounting::EquityTracker;
pub use cancel::CancellationToken;
pub use config::{BacktestConfig, BacktestResult, EngineError};
pub use run::run_backtest;
pub use warmup::WarmupState;
