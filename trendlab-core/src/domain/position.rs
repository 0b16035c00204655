//! Position — a mutable record owned exclusively by the position manager
//! for its lifetime.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::PositionId;
use super::trade::PartialCloseRecord;

/// Direction of a position or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

/// Why a position (or partial slice of one) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    PartialClose,
    EndOfTest,
    Manual,
}

/// A single configured partial-closure level: take `percent` of the
/// position once profit reaches `pips_level` pips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialLevel {
    pub pips_level: f64,
    pub percent: f64,
}

/// Trailing-stop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingConfig {
    pub enabled: bool,
    pub trailing_pips: f64,
}

/// Break-even promotion configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakevenConfig {
    pub enabled: bool,
    pub trigger_pips: f64,
    pub plus_pips: f64,
}

/// An open position. Mutated only by `PositionManager::update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub open_time: NaiveDateTime,

    pub stop_loss: f64,
    pub take_profit: f64,

    /// Highest close/high observed since open (Buy trailing reference).
    pub highest_price_seen: f64,
    /// Lowest close/low observed since open (Sell trailing reference).
    pub lowest_price_seen: f64,

    pub trailing_active: bool,
    pub breakeven_armed: bool,
    pub partial_closures_done: BTreeSet<u64>,
    pub trailing_cfg: TrailingConfig,
    pub breakeven_cfg: BreakevenConfig,
    pub partial_levels: Vec<PartialLevel>,

    pub status: PositionStatus,
    pub close_price: Option<f64>,
    pub close_time: Option<NaiveDateTime>,
    pub close_reason: Option<CloseReason>,

    /// Realized P&L already booked from partial closures on this position.
    pub realized_pnl: f64,
    /// One record per partial closure taken so far, carried onto the
    /// `TradeRecord` when the position finally closes.
    pub partial_close_records: Vec<PartialCloseRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: PositionId,
        symbol: impl Into<String>,
        direction: Direction,
        volume: f64,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        open_time: NaiveDateTime,
        trailing_cfg: TrailingConfig,
        breakeven_cfg: BreakevenConfig,
        partial_levels: Vec<PartialLevel>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            direction,
            volume,
            entry_price,
            open_time,
            stop_loss,
            take_profit,
            highest_price_seen: entry_price,
            lowest_price_seen: entry_price,
            trailing_active: false,
            breakeven_armed: false,
            partial_closures_done: BTreeSet::new(),
            trailing_cfg,
            breakeven_cfg,
            partial_levels,
            status: PositionStatus::Open,
            close_price: None,
            close_time: None,
            close_reason: None,
            realized_pnl: 0.0,
            partial_close_records: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Profit in pips at `price`, signed by direction.
    pub fn profit_pips(&self, price: f64, pip_size: f64) -> f64 {
        let raw = match self.direction {
            Direction::Buy => price - self.entry_price,
            Direction::Sell => self.entry_price - price,
        };
        raw / pip_size
    }

    /// Floating P&L in account currency at `price`.
    pub fn floating_pnl(&self, price: f64, pip_size: f64, pip_value: f64) -> f64 {
        self.profit_pips(price, pip_size) * pip_value * self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample() -> Position {
        Position::open(
            PositionId(1),
            "EURUSD",
            Direction::Buy,
            1.0,
            1.1000,
            1.0900,
            1.1200,
            t(),
            TrailingConfig {
                enabled: false,
                trailing_pips: 0.0,
            },
            BreakevenConfig {
                enabled: false,
                trigger_pips: 0.0,
                plus_pips: 0.0,
            },
            vec![],
        )
    }

    #[test]
    fn profit_pips_buy() {
        let pos = sample();
        assert!((pos.profit_pips(1.1050, 0.0001) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn profit_pips_sell() {
        let mut pos = sample();
        pos.direction = Direction::Sell;
        assert!((pos.profit_pips(1.0950, 0.0001) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn floating_pnl_scales_by_volume_and_pip_value() {
        let pos = sample();
        let pnl = pos.floating_pnl(1.1050, 0.0001, 10.0);
        assert!((pnl - 500.0).abs() < 1e-9);
    }

    #[test]
    fn new_position_is_open() {
        assert!(sample().is_open());
    }
}
