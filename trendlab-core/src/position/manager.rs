//! PositionManager — owns the set of open positions and processes price
//! updates into close/partial-close/trailing events.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::{
    BreakevenConfig, CloseReason, Direction, IdGen, PartialCloseRecord, PartialLevel, Position,
    PositionId, TradeRecord, TrailingConfig,
};

use super::ratchet::RatchetState;

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("unknown position id: {0}")]
    UnknownPositionId(u64),
    #[error("invalid volume: {0}")]
    InvalidVolume(f64),
}

/// All events produced by a single `PositionManager::update` call.
#[derive(Debug, Default, Clone)]
pub struct UpdateReport {
    pub closed: Vec<TradeRecord>,
    pub partial_closes: Vec<(PositionId, PartialCloseRecord)>,
}

impl UpdateReport {
    /// Total realized P&L booked this update (closures + partials).
    ///
    /// A closed trade's `profit` already includes any partials booked on
    /// earlier updates, so only its final leg counts here; this update's own
    /// `partial_closes` are added in full.
    pub fn realized_pnl(&self) -> f64 {
        let closed: f64 = self
            .closed
            .iter()
            .map(|t| {
                let already_booked: f64 = t.partial_closes.iter().map(|p| p.realized_pnl).sum();
                t.profit - already_booked
            })
            .sum();
        let partials: f64 = self.partial_closes.iter().map(|(_, p)| p.realized_pnl).sum();
        closed + partials
    }
}

/// Owns open positions for a single symbol over the lifetime of one backtest.
pub struct PositionManager {
    positions: Vec<Position>,
    closed: Vec<TradeRecord>,
    ratchets: HashMap<u64, RatchetState>,
    id_gen: IdGen,
    pip_size: f64,
    min_volume: f64,
    max_volume: f64,
}

impl PositionManager {
    pub fn new(pip_size: f64, min_volume: f64, max_volume: f64) -> Self {
        Self {
            positions: Vec::new(),
            closed: Vec::new(),
            ratchets: HashMap::new(),
            id_gen: IdGen::default(),
            pip_size,
            min_volume,
            max_volume,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
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
    ) -> Result<PositionId, PositionError> {
        if volume <= 0.0 {
            return Err(PositionError::InvalidVolume(volume));
        }
        let clamped = volume.clamp(self.min_volume, self.max_volume);
        let id = self.id_gen.next_position_id();
        let pos = Position::open(
            id,
            symbol,
            direction,
            clamped,
            entry_price,
            stop_loss,
            take_profit,
            open_time,
            trailing_cfg,
            breakeven_cfg,
            partial_levels,
        );
        self.ratchets.insert(id.0, RatchetState::new(direction));
        self.positions.push(pos);
        Ok(id)
    }

    /// Process one price update against every open position, in id order.
    ///
    /// `prices` maps symbol to `(close, high, low)` for the bar just formed.
    /// Step order is fixed: refresh extrema, SL/TP detection (SL wins ties),
    /// partial closures, break-even promotion, trailing stop.
    pub fn update(
        &mut self,
        prices: &HashMap<String, (f64, f64, f64)>,
        time: NaiveDateTime,
        pip_value: f64,
    ) -> UpdateReport {
        let mut report = UpdateReport::default();
        let positions = std::mem::take(&mut self.positions);
        let mut still_open = Vec::with_capacity(positions.len());

        for mut pos in positions {
            let Some(&(close, high, low)) = prices.get(&pos.symbol) else {
                still_open.push(pos);
                continue;
            };

            // 1. Refresh extrema.
            match pos.direction {
                Direction::Buy => pos.highest_price_seen = pos.highest_price_seen.max(high),
                Direction::Sell => pos.lowest_price_seen = pos.lowest_price_seen.min(low),
            }

            // 2. SL/TP detection against the bar's range. SL wins on overlap.
            let (sl_hit, tp_hit) = match pos.direction {
                Direction::Buy => (low <= pos.stop_loss, high >= pos.take_profit),
                Direction::Sell => (high >= pos.stop_loss, low <= pos.take_profit),
            };
            if sl_hit || tp_hit {
                let (price, reason) = if sl_hit {
                    (pos.stop_loss, CloseReason::StopLoss)
                } else {
                    (pos.take_profit, CloseReason::TakeProfit)
                };
                self.ratchets.remove(&pos.id.0);
                let trade = finalize(pos, price, time, reason, self.pip_size, pip_value);
                report.closed.push(trade.clone());
                self.closed.push(trade);
                continue;
            }

            // 3. Partial closures: each configured level taken at most once.
            for level in pos.partial_levels.clone() {
                let key = level.pips_level.to_bits();
                if pos.partial_closures_done.contains(&key) {
                    continue;
                }
                let profit_pips = pos.profit_pips(close, self.pip_size);
                if profit_pips >= level.pips_level {
                    let volume_closed = pos.volume * level.percent;
                    let realized = profit_pips * pip_value * volume_closed;
                    pos.volume -= volume_closed;
                    pos.realized_pnl += realized;
                    pos.partial_closures_done.insert(key);
                    let record = PartialCloseRecord {
                        time,
                        price: close,
                        volume_closed,
                        realized_pnl: realized,
                    };
                    pos.partial_close_records.push(record);
                    report.partial_closes.push((pos.id, record));
                }
            }

            // 4. Break-even promotion: fires at most once, irreversible.
            if pos.breakeven_cfg.enabled && !pos.breakeven_armed {
                let profit_pips = pos.profit_pips(close, self.pip_size);
                if profit_pips >= pos.breakeven_cfg.trigger_pips {
                    let plus = pos.breakeven_cfg.plus_pips * self.pip_size;
                    pos.stop_loss = match pos.direction {
                        Direction::Buy => pos.entry_price + plus,
                        Direction::Sell => pos.entry_price - plus,
                    };
                    pos.breakeven_armed = true;
                }
            }

            // 5. Trailing stop: activates once profit reaches the trailing
            // distance, then only ever tightens.
            if pos.trailing_cfg.enabled {
                let profit_pips = pos.profit_pips(close, self.pip_size);
                if profit_pips >= pos.trailing_cfg.trailing_pips {
                    pos.trailing_active = true;
                }
                if pos.trailing_active {
                    let distance = pos.trailing_cfg.trailing_pips * self.pip_size;
                    let candidate = match pos.direction {
                        Direction::Buy => close - distance,
                        Direction::Sell => close + distance,
                    };
                    let ratchet = self
                        .ratchets
                        .entry(pos.id.0)
                        .or_insert_with(|| RatchetState::new(pos.direction));
                    pos.stop_loss = ratchet.apply(candidate);
                }
            }

            still_open.push(pos);
        }

        self.positions = still_open;
        report
    }

    /// Force-close a position at an explicit price/time/reason.
    pub fn close(
        &mut self,
        id: PositionId,
        price: f64,
        time: NaiveDateTime,
        reason: CloseReason,
        pip_value: f64,
    ) -> Result<TradeRecord, PositionError> {
        let idx = self
            .positions
            .iter()
            .position(|p| p.id == id)
            .ok_or(PositionError::UnknownPositionId(id.0))?;
        let pos = self.positions.remove(idx);
        self.ratchets.remove(&id.0);
        let trade = finalize(pos, price, time, reason, self.pip_size, pip_value);
        self.closed.push(trade.clone());
        Ok(trade)
    }

    pub fn active(&self) -> &[Position] {
        &self.positions
    }

    pub fn closed(&self) -> &[TradeRecord] {
        &self.closed
    }

    /// Sum of floating P&L across all open positions at the given prices.
    pub fn floating_profit(&self, prices: &HashMap<String, f64>, pip_value: f64) -> f64 {
        self.positions
            .iter()
            .filter_map(|pos| {
                prices
                    .get(&pos.symbol)
                    .map(|&price| pos.floating_pnl(price, self.pip_size, pip_value))
            })
            .sum()
    }

    /// Per-position floating P&L breakdown, keyed by position id.
    pub fn floating_profit_detail(
        &self,
        prices: &HashMap<String, f64>,
        pip_value: f64,
    ) -> HashMap<u64, f64> {
        self.positions
            .iter()
            .filter_map(|pos| {
                prices
                    .get(&pos.symbol)
                    .map(|&price| (pos.id.0, pos.floating_pnl(price, self.pip_size, pip_value)))
            })
            .collect()
    }
}

fn finalize(
    pos: Position,
    price: f64,
    time: NaiveDateTime,
    reason: CloseReason,
    pip_size: f64,
    pip_value: f64,
) -> TradeRecord {
    let profit_pips = pos.profit_pips(price, pip_size);
    let final_pnl = profit_pips * pip_value * pos.volume;
    let total_profit = pos.realized_pnl + final_pnl;

    let (mfe_pips, mae_pips) = match pos.direction {
        Direction::Buy => (
            (pos.highest_price_seen - pos.entry_price) / pip_size,
            (pos.lowest_price_seen - pos.entry_price) / pip_size,
        ),
        Direction::Sell => (
            (pos.entry_price - pos.lowest_price_seen) / pip_size,
            (pos.entry_price - pos.highest_price_seen) / pip_size,
        ),
    };

    TradeRecord {
        position_id: pos.id,
        symbol: pos.symbol,
        direction: pos.direction,
        open_time: pos.open_time,
        entry_price: pos.entry_price,
        closed_volume: pos.volume,
        close_time: time,
        close_price: price,
        close_reason: reason,
        profit: total_profit,
        profit_pips,
        partial_closes: pos.partial_close_records,
        mae_pips,
        mfe_pips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn no_trailing() -> TrailingConfig {
        TrailingConfig {
            enabled: false,
            trailing_pips: 0.0,
        }
    }

    fn no_breakeven() -> BreakevenConfig {
        BreakevenConfig {
            enabled: false,
            trigger_pips: 0.0,
            plus_pips: 0.0,
        }
    }

    fn prices(close: f64, high: f64, low: f64) -> HashMap<String, (f64, f64, f64)> {
        let mut m = HashMap::new();
        m.insert("EURUSD".into(), (close, high, low));
        m
    }

    #[test]
    fn sl_wins_tie_break_on_wick() {
        // Scenario 3: one open Buy SL=1.1000 TP=1.2000 entry=1.1500.
        // Next bar: high=1.2000, low=1.0900 spans both. SL must win.
        let mut pm = PositionManager::new(0.0001, 0.0, 1_000_000.0);
        pm.open(
            "EURUSD",
            Direction::Buy,
            1.0,
            1.1500,
            1.1000,
            1.2000,
            t(0),
            no_trailing(),
            no_breakeven(),
            vec![],
        )
        .unwrap();

        let report = pm.update(&prices(1.1600, 1.2000, 1.0900), t(1), 10.0);
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].close_price, 1.1000);
        assert_eq!(report.closed[0].close_reason, CloseReason::StopLoss);
    }

    #[test]
    fn trailing_tightens_only_per_spec_scenario() {
        // Scenario 4: entry=1.1000 SL=1.0900 trailing_pips=50.
        // Closes: 1.1000, 1.1100, 1.1050, 1.1200 -> SL 1.0900,1.1050,1.1050,1.1150
        let mut pm = PositionManager::new(0.0001, 0.0, 1_000_000.0);
        pm.open(
            "EURUSD",
            Direction::Buy,
            1.0,
            1.1000,
            1.0900,
            1.2000,
            t(0),
            TrailingConfig {
                enabled: true,
                trailing_pips: 50.0,
            },
            no_breakeven(),
            vec![],
        )
        .unwrap();

        let closes = [1.1000, 1.1100, 1.1050, 1.1200];
        let expected = [1.0900, 1.1050, 1.1050, 1.1150];
        for (i, (&close, &exp)) in closes.iter().zip(expected.iter()).enumerate() {
            pm.update(&prices(close, close, close), t(i as u32 + 1), 10.0);
            assert_eq!(pm.active()[0].stop_loss, exp, "bar {i}");
        }
    }

    #[test]
    fn partial_close_taken_at_most_once() {
        // Scenario 5: entry=1.1000, partial=[(50, 50%)].
        let mut pm = PositionManager::new(0.0001, 0.0, 1_000_000.0);
        pm.open(
            "EURUSD",
            Direction::Buy,
            10.0,
            1.1000,
            1.0900,
            1.2000,
            t(0),
            no_trailing(),
            no_breakeven(),
            vec![PartialLevel {
                pips_level: 50.0,
                percent: 0.5,
            }],
        )
        .unwrap();

        let r1 = pm.update(&prices(1.1050, 1.1050, 1.1050), t(1), 10.0);
        assert_eq!(r1.partial_closes.len(), 1);
        assert_eq!(pm.active()[0].volume, 5.0);

        let r2 = pm.update(&prices(1.1050, 1.1050, 1.1050), t(2), 10.0);
        assert!(r2.partial_closes.is_empty());
        assert_eq!(pm.active()[0].volume, 5.0);
    }

    #[test]
    fn breakeven_fires_once_and_is_irreversible() {
        let mut pm = PositionManager::new(0.0001, 0.0, 1_000_000.0);
        pm.open(
            "EURUSD",
            Direction::Buy,
            1.0,
            1.1000,
            1.0900,
            1.2000,
            t(0),
            no_trailing(),
            BreakevenConfig {
                enabled: true,
                trigger_pips: 30.0,
                plus_pips: 2.0,
            },
            vec![],
        )
        .unwrap();

        pm.update(&prices(1.1030, 1.1030, 1.1030), t(1), 10.0);
        assert_eq!(pm.active()[0].stop_loss, 1.1002);
        assert!(pm.active()[0].breakeven_armed);

        // Price later retreats; break-even SL must not be un-set.
        pm.update(&prices(1.1005, 1.1005, 1.1005), t(2), 10.0);
        assert_eq!(pm.active()[0].stop_loss, 1.1002);
    }

    #[test]
    fn unknown_position_id_on_close() {
        let mut pm = PositionManager::new(0.0001, 0.0, 1_000_000.0);
        let err = pm
            .close(PositionId(999), 1.0, t(0), CloseReason::Manual, 10.0)
            .unwrap_err();
        assert_eq!(err, PositionError::UnknownPositionId(999));
    }

    #[test]
    fn negative_volume_rejected_at_open() {
        let mut pm = PositionManager::new(0.0001, 0.0, 1_000_000.0);
        let err = pm
            .open(
                "EURUSD",
                Direction::Buy,
                -1.0,
                1.1000,
                1.0900,
                1.2000,
                t(0),
                no_trailing(),
                no_breakeven(),
                vec![],
            )
            .unwrap_err();
        assert_eq!(err, PositionError::InvalidVolume(-1.0));
    }

    #[test]
    fn volume_clamped_to_bounds() {
        let mut pm = PositionManager::new(0.0001, 1.0, 5.0);
        let id = pm
            .open(
                "EURUSD",
                Direction::Buy,
                100.0,
                1.1000,
                1.0900,
                1.2000,
                t(0),
                no_trailing(),
                no_breakeven(),
                vec![],
            )
            .unwrap();
        let pos = pm.active().iter().find(|p| p.id == id).unwrap();
        assert_eq!(pos.volume, 5.0);
    }
}
