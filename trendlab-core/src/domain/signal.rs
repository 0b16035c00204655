//! Signal — the contract a strategy emits to request a new position.

use super::bar::Timeframe;
use super::position::Direction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A signal emitted by a strategy requesting entry into a new position.
///
/// Invariant: for `Buy`, `stop_loss < entry_price < take_profit`; for
/// `Sell`, `take_profit < entry_price < stop_loss`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub time: NaiveDateTime,
    pub volume: Option<f64>,
    pub comment: Option<String>,
}

impl Signal {
    /// True if the SL/TP are on the correct side of entry for `direction`.
    pub fn is_valid(&self) -> bool {
        match self.direction {
            Direction::Buy => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Direction::Sell => {
                self.take_profit < self.entry_price && self.entry_price < self.stop_loss
            }
        }
    }

    /// Risk/reward ratio `|tp - entry| / |entry - sl|`. Must be finite for a
    /// valid signal (SL can never equal entry).
    pub fn risk_reward(&self) -> f64 {
        (self.take_profit - self.entry_price).abs() / (self.entry_price - self.stop_loss).abs()
    }
}
