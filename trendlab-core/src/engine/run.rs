//! The bar-by-bar backtest loop.

use std::collections::HashMap;

use crate::data::HistoricalDataCache;
use crate::data::provider::BrokerDataSource;
use crate::domain::CloseReason;
use crate::position::PositionManager;
use crate::strategy::Strategy;

use super::accounting::EquityTracker;
use super::cancel::CancellationToken;
use super::config::{BacktestConfig, BacktestResult, EngineError};
use super::warmup::WarmupState;

const BASELINE_WARMUP_BARS: usize = 50;
const MAX_LOOKBACK_BARS: usize = 200;

/// Run a single deterministic backtest.
///
/// Given identical inputs (bars, config, strategy state) the result is
/// bit-identical: the per-bar loop is strictly sequential and makes no use
/// of wall-clock time or unseeded randomness.
///
/// `cancel`, if given, is checked once per bar boundary. A cancelled run
/// stops after the bar it was observed on and returns whatever it has
/// accumulated so far with `incomplete` set, rather than erroring; open
/// positions are left open, not force-closed.
#[allow(clippy::too_many_arguments)]
pub fn run_backtest(
    config: &BacktestConfig,
    strategy: &dyn Strategy,
    cache: &HistoricalDataCache,
    broker: Option<&dyn BrokerDataSource>,
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
    cancel: Option<&CancellationToken>,
) -> Result<BacktestResult, EngineError> {
    let instrument = config.instrument();
    let pip_size = instrument.pip_size;
    let pip_value = instrument.pip_value;

    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(EngineError::Cancelled);
    }

    let bars = cache.get(
        &config.symbol,
        config.timeframe,
        config.start,
        config.end,
        true,
        true,
        false,
        broker,
    )?;

    if bars.is_empty() {
        return Ok(BacktestResult {
            config: config.clone(),
            trades: Vec::new(),
            equity_curve: vec![config.initial_balance],
            timestamps: vec![config.start],
            final_balance: config.initial_balance,
            drawdowns: vec![0.0],
            incomplete: false,
        });
    }

    let mut equity = EquityTracker::new(config.initial_balance);
    let mut timestamps = vec![bars[0].time];
    let mut pm = PositionManager::new(pip_size, config.min_volume, config.max_volume);
    let warmup_bars = BASELINE_WARMUP_BARS.max(strategy.warmup_bars());
    let mut warmup = WarmupState::new(warmup_bars);

    let n = bars.len();
    let mut cancelled = false;
    for i in 1..n {
        let bar = bars[i];
        let t = bar.time;

        let mut prices = HashMap::new();
        prices.insert(config.symbol.clone(), (bar.close, bar.high, bar.low));

        let report = pm.update(&prices, t, pip_value);
        for trade in &report.closed {
            equity.apply_realized(final_leg_profit(trade) - config.commission * trade.closed_volume);
        }
        for (_, partial) in &report.partial_closes {
            equity.apply_realized(partial.realized_pnl);
        }

        warmup.process_bar();
        if warmup.is_warm() {
            let window_start = i.saturating_sub(MAX_LOOKBACK_BARS.min(i));
            let window = &bars[window_start..=i];
            let signals = strategy.generate_signals(window);

            for signal in signals.into_iter().filter(|s| s.time == t) {
                if !signal.is_valid() {
                    tracing::warn!(symbol = %signal.symbol, time = %t, "skipping invalid signal");
                    continue;
                }

                let entry_price = adjust_entry_price(&signal, &bar, config, pip_size);
                let volume = strategy
                    .position_size(&signal, equity.balance())
                    .unwrap_or_else(|| {
                        risk_sized_volume(
                            equity.balance(),
                            config,
                            entry_price,
                            signal.stop_loss,
                            pip_size,
                            pip_value,
                        )
                    })
                    .clamp(config.min_volume, config.max_volume);

                match pm.open(
                    signal.symbol.clone(),
                    signal.direction,
                    volume,
                    entry_price,
                    signal.stop_loss,
                    signal.take_profit,
                    t,
                    config.trailing_cfg.clone(),
                    config.breakeven_cfg.clone(),
                    config.partial_levels.clone(),
                ) {
                    Ok(_) => equity.apply_realized(-config.commission * volume),
                    Err(e) => tracing::warn!(symbol = %signal.symbol, error = %e, "position open rejected"),
                }
            }
        }

        let floating = pm.floating_profit(
            &HashMap::from([(config.symbol.clone(), bar.close)]),
            pip_value,
        );
        equity.record_equity(floating);
        timestamps.push(t);

        if let Some(cb) = &mut progress {
            cb(i, n);
        }

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            cancelled = true;
            break;
        }
    }

    if !cancelled {
        let last = bars[n - 1];
        let open_ids: Vec<_> = pm.active().iter().map(|p| p.id).collect();
        for id in open_ids {
            if let Ok(trade) = pm.close(id, last.close, last.time, CloseReason::EndOfTest, pip_value) {
                equity.apply_realized(final_leg_profit(&trade) - config.commission * trade.closed_volume);
            }
        }
    }

    Ok(BacktestResult {
        config: config.clone(),
        trades: pm.closed().to_vec(),
        equity_curve: equity.equity_curve().to_vec(),
        timestamps,
        final_balance: equity.balance(),
        drawdowns: equity.drawdowns().to_vec(),
        incomplete: cancelled,
    })
}

/// `TradeRecord::profit` is the total realized P&L including every partial
/// closure already booked to the balance as it happened. Returns only the
/// final leg, i.e. what has not yet been applied.
fn final_leg_profit(trade: &crate::domain::TradeRecord) -> f64 {
    let already_booked: f64 = trade.partial_closes.iter().map(|p| p.realized_pnl).sum();
    trade.profit - already_booked
}

fn adjust_entry_price(
    signal: &crate::domain::Signal,
    bar: &crate::domain::Bar,
    config: &BacktestConfig,
    pip_size: f64,
) -> f64 {
    let spread_pips = if config.spread_usage { bar.spread as f64 } else { 0.0 };
    match signal.direction {
        crate::domain::Direction::Buy => {
            bar.close + (spread_pips + config.slippage_pips) * pip_size
        }
        crate::domain::Direction::Sell => bar.close - config.slippage_pips * pip_size,
    }
}

fn risk_sized_volume(
    balance: f64,
    config: &BacktestConfig,
    entry_price: f64,
    stop_loss: f64,
    pip_size: f64,
    pip_value: f64,
) -> f64 {
    let risk_amount = balance * config.position_size_pct / 100.0;
    let sl_distance_pips = (entry_price - stop_loss).abs() / pip_size;
    let risk_per_lot = sl_distance_pips * pip_value;
    if risk_per_lot <= 0.0 {
        config.min_volume
    } else {
        risk_amount / risk_per_lot
    }
}
