//! TradeRecord — the public projection of a closed position.

use super::ids::PositionId;
use super::position::{CloseReason, Direction};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single partial-closure event recorded against a trade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartialCloseRecord {
    pub time: NaiveDateTime,
    pub price: f64,
    pub volume_closed: f64,
    pub realized_pnl: f64,
}

/// A completed round-trip trade: the public projection of a closed position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: PositionId,
    pub symbol: String,
    pub direction: Direction,

    pub open_time: NaiveDateTime,
    pub entry_price: f64,
    /// Volume remaining at the time of final closure (after any partials).
    pub closed_volume: f64,

    pub close_time: NaiveDateTime,
    pub close_price: f64,
    pub close_reason: CloseReason,

    /// Realized profit in account currency, summing all partial closures
    /// plus the final closure.
    pub profit: f64,
    /// Realized profit in pips (final-closure reference distance).
    pub profit_pips: f64,

    pub partial_closes: Vec<PartialCloseRecord>,

    /// Maximum adverse excursion in pips (worst unrealized loss during the trade).
    pub mae_pips: f64,
    /// Maximum favorable excursion in pips (best unrealized gain during the trade).
    pub mfe_pips: f64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.profit > 0.0
    }

    pub fn duration_hours(&self) -> f64 {
        (self.close_time - self.open_time).num_seconds() as f64 / 3600.0
    }
}
