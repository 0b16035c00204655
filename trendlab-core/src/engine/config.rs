//! Backtest configuration and result types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BreakevenConfig, Instrument, PartialLevel, Timeframe, TradeRecord, TrailingConfig};

/// Immutable-per-run configuration for a single backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub initial_balance: f64,
    pub position_size_pct: f64,
    /// Per-side, per-lot commission in account currency; charged once at
    /// open and once at close.
    pub commission: f64,
    pub slippage_pips: f64,
    pub spread_usage: bool,
    pub min_volume: f64,
    pub max_volume: f64,
    pub trailing_cfg: TrailingConfig,
    pub breakeven_cfg: BreakevenConfig,
    pub partial_levels: Vec<PartialLevel>,
    /// Overrides the built-in pip-size/pip-value/contract-size defaults
    /// table when the caller has its own symbol-info source.
    pub instrument: Option<Instrument>,
}

impl BacktestConfig {
    pub fn instrument(&self) -> Instrument {
        self.instrument
            .clone()
            .unwrap_or_else(|| Instrument::fx_by_symbol(&self.symbol))
    }
}

/// The outcome of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
    pub final_balance: f64,
    pub drawdowns: Vec<f64>,
    /// `true` if a cancellation token was observed before the run reached
    /// the end of its bar range; the result reflects only the bars
    /// processed so far.
    pub incomplete: bool,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cache error: {0}")]
    Cache(#[from] crate::data::CacheError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("strategy error: {0}")]
    StrategyError(String),
    #[error("run cancelled")]
    Cancelled,
}
