//! Bar — the fundamental market data unit, and the Timeframe it was sampled at.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// An immutable OHLCV record for one timeframe interval.
///
/// Bars in a series are strictly increasing in `time`, with no duplicates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// Spread in pips at the time this bar closed.
    pub spread: u32,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar, produced by alignment gaps).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high is the max, low is the min.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// A timeframe with a fixed minute-equivalent cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    /// Minute-equivalent cadence of this timeframe.
    pub fn minutes(self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
            Timeframe::MN1 => 43200,
        }
    }

    /// Default pip size for a symbol on this timeframe.
    ///
    /// Timeframe does not actually change pip size; this exists because the
    /// cadence and the pip convention are both properties callers look up
    /// together when sizing a trade. JPY-quoted pairs use 0.01; everything
    /// else defaults to 0.0001. Callers with symbol-specific overrides
    /// (metals, indices) should consult `Instrument::pip_size` instead.
    pub fn default_pip_size(symbol: &str) -> f64 {
        if symbol.to_ascii_uppercase().ends_with("JPY") {
            0.01
        } else {
            0.0001
        }
    }
}
