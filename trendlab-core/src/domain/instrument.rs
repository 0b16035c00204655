//! Instrument metadata: pip conventions, contract size, tick rounding.

use serde::{Deserialize, Serialize};

/// Asset classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Etf,
    Future,
    Option,
    Fx,
}

/// Instrument metadata for a tradable symbol.
///
/// Equity/ETF instruments populate `tick_size`/`lot_size`. FX instruments
/// additionally populate `pip_size`/`pip_value`/`contract_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub tick_size: f64,
    pub lot_size: f64,
    pub currency: String,
    pub asset_class: AssetClass,
    /// Smallest practical price increment, in price units (0.0001 for most FX).
    pub pip_size: f64,
    /// Currency P&L per pip per one lot.
    pub pip_value: f64,
    /// Units per one standard lot.
    pub contract_size: f64,
}

impl Instrument {
    /// Default US equity: 0.01 tick, 1-share lot, USD.
    pub fn us_equity(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size: 0.01,
            lot_size: 1.0,
            currency: "USD".into(),
            asset_class: AssetClass::Equity,
            pip_size: 0.01,
            pip_value: 0.0,
            contract_size: 1.0,
        }
    }

    /// A major FX pair (non-JPY quote): pip_size 0.0001, 100k contract, $10/pip/lot.
    pub fn fx_major(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size: 0.00001,
            lot_size: 1000.0,
            currency: "USD".into(),
            asset_class: AssetClass::Fx,
            pip_size: 0.0001,
            pip_value: 10.0,
            contract_size: 100_000.0,
        }
    }

    /// A JPY-quoted FX pair: pip_size 0.01, 100k contract.
    ///
    /// `pip_value` for JPY pairs depends on the USD/JPY cross rate; callers
    /// with a live rate should override this field. The default here assumes
    /// a rate near 150, which is the conventional textbook approximation.
    pub fn fx_jpy(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size: 0.001,
            lot_size: 1000.0,
            currency: "USD".into(),
            asset_class: AssetClass::Fx,
            pip_size: 0.01,
            pip_value: 6.7,
            contract_size: 100_000.0,
        }
    }

    /// Construct an instrument with caller-supplied symbol-info values, for
    /// callers with their own broker symbol-info source.
    #[allow(clippy::too_many_arguments)]
    pub fn custom(
        symbol: impl Into<String>,
        tick_size: f64,
        lot_size: f64,
        currency: impl Into<String>,
        asset_class: AssetClass,
        pip_size: f64,
        pip_value: f64,
        contract_size: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            lot_size,
            currency: currency.into(),
            asset_class,
            pip_size,
            pip_value,
            contract_size,
        }
    }

    /// Build an FX instrument by symbol, choosing the JPY or major default
    /// based on the quote currency suffix.
    pub fn fx_by_symbol(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        if symbol.to_ascii_uppercase().ends_with("JPY") {
            Self::fx_jpy(symbol)
        } else {
            Self::fx_major(symbol)
        }
    }
}

/// Side-aware tick rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

pub fn round_to_tick(price: f64, tick_size: f64, side: OrderSide) -> f64 {
    if tick_size <= 0.0 || price.is_nan() {
        return price;
    }
    match side {
        OrderSide::Buy => (price / tick_size).ceil() * tick_size,
        OrderSide::Sell => (price / tick_size).floor() * tick_size,
    }
}

/// Round quantity down to the nearest lot size.
pub fn round_to_lot(quantity: f64, lot_size: f64) -> f64 {
    if lot_size <= 0.0 {
        return quantity;
    }
    (quantity / lot_size).floor() * lot_size
}
