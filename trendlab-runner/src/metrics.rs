//! Performance metrics — pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, scalar out.
//! No dependencies on the optimizer, the cache, or the engine beyond the
//! `TradeRecord` projection.

use serde::{Deserialize, Serialize};
use trendlab_core::domain::{Direction, TradeRecord};

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub buy_trades: usize,
    pub sell_trades: usize,

    pub net_profit: f64,
    pub net_profit_percent: f64,

    pub win_rate: f64,
    pub buy_win_rate: f64,
    pub sell_win_rate: f64,

    pub avg_profit: f64,
    pub avg_loss: f64,
    pub largest_profit: f64,
    pub largest_loss: f64,

    pub profit_factor: f64,
    pub reward_risk_ratio: f64,

    pub max_drawdown: f64,
    pub avg_drawdown: f64,

    pub sharpe_ratio: f64,
    pub avg_trade_duration_hours: f64,
    pub expected_value: f64,

    // Additive, not in spec.md §4.4 but recovered from this codebase's
    // existing equity-curve analysis vocabulary.
    pub cagr: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub turnover: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics from an equity curve and closed-trade list.
    pub fn compute(equity_curve: &[f64], trades: &[TradeRecord], initial_balance: f64) -> Self {
        let total_trades = trades.len();
        let winners: Vec<&TradeRecord> = trades.iter().filter(|t| t.is_winner()).collect();
        let losers: Vec<&TradeRecord> = trades.iter().filter(|t| !t.is_winner()).collect();
        let buys: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.direction == Direction::Buy)
            .collect();
        let sells: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.direction == Direction::Sell)
            .collect();

        let win_rate = rate(winners.len(), total_trades);
        let net_profit: f64 = trades.iter().map(|t| t.profit).sum();
        let avg_profit = mean_profit(&winners);
        let avg_loss = mean_profit(&losers);

        let drawdowns = drawdown_series(equity_curve);

        Self {
            total_trades,
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            buy_trades: buys.len(),
            sell_trades: sells.len(),

            net_profit,
            net_profit_percent: if initial_balance > 0.0 {
                net_profit / initial_balance * 100.0
            } else {
                0.0
            },

            win_rate,
            buy_win_rate: rate(buys.iter().filter(|t| t.is_winner()).count(), buys.len()),
            sell_win_rate: rate(sells.iter().filter(|t| t.is_winner()).count(), sells.len()),

            avg_profit,
            avg_loss,
            largest_profit: winners.iter().map(|t| t.profit).fold(0.0, f64::max),
            largest_loss: losers.iter().map(|t| t.profit).fold(0.0, f64::min),

            profit_factor: profit_factor(trades),
            reward_risk_ratio: if avg_loss.abs() < 1e-10 {
                0.0
            } else {
                (avg_profit / avg_loss).abs()
            },

            max_drawdown: drawdowns.iter().cloned().fold(0.0, f64::max) * 100.0,
            avg_drawdown: mean_f64(&drawdowns) * 100.0,

            sharpe_ratio: sharpe_ratio(equity_curve),
            avg_trade_duration_hours: avg_trade_duration_hours(trades),
            expected_value: win_rate / 100.0 * avg_profit + (1.0 - win_rate / 100.0) * avg_loss,

            cagr: cagr(equity_curve, equity_curve.len()),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
            turnover: turnover(trades, initial_balance),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn mean_profit(trades: &[&TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.profit).sum::<f64>() / trades.len() as f64
}

/// Gross profits / gross losses. `f64::INFINITY` when there are wins and
/// no losses; 0.0 when there are no trades at all.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().filter(|t| t.profit > 0.0).map(|t| t.profit).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.profit < 0.0)
        .map(|t| t.profit.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    gross_profit / gross_loss
}

fn avg_trade_duration_hours(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.duration_hours()).sum::<f64>() / trades.len() as f64
}

/// Annual turnover: total traded notional / initial balance / years.
fn turnover(trades: &[TradeRecord], initial_balance: f64) -> f64 {
    if trades.is_empty() || initial_balance <= 0.0 {
        return 0.0;
    }
    let total_notional: f64 = trades
        .iter()
        .map(|t| t.entry_price * t.closed_volume + t.close_price * t.closed_volume)
        .sum();
    let years = trades
        .iter()
        .map(|t| t.duration_hours())
        .sum::<f64>()
        / trades.len() as f64
        / (24.0 * 365.0);
    if years <= 0.0 {
        return 0.0;
    }
    total_notional / initial_balance / years
}

/// Per-bar drawdown series as positive fractions of the running peak.
fn drawdown_series(equity_curve: &[f64]) -> Vec<f64> {
    if equity_curve.is_empty() {
        return vec![0.0];
    }
    let mut peak = equity_curve[0];
    let mut out = Vec::with_capacity(equity_curve.len());
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        out.push(if peak > 0.0 { (peak - eq) / peak } else { 0.0 });
    }
    out
}

/// Per-bar returns `r[i] = (eq[i] - eq[i-1]) / eq[i-1]`, mean / stdev * sqrt(252).
/// Zero if stdev is zero or fewer than 2 points.
pub fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns = per_bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(&returns);
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * (252.0_f64).sqrt()
}

/// Compound Annual Growth Rate, assuming 252 bars per year.
fn cagr(equity_curve: &[f64], bars: usize) -> f64 {
    if equity_curve.len() < 2 || bars < 2 {
        return 0.0;
    }
    let initial = equity_curve[0];
    let final_eq = *equity_curve.last().unwrap();
    if initial <= 0.0 || final_eq <= 0.0 {
        return 0.0;
    }
    let years = bars as f64 / 252.0;
    if years <= 0.0 {
        return 0.0;
    }
    (final_eq / initial).powf(1.0 / years) - 1.0
}

fn per_bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_consecutive(trades: &[TradeRecord], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}
