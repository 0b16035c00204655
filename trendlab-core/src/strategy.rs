//! The `Strategy` contract — the external collaborator that turns a bar
//! window into signals. Indicator math and signal logic live outside this
//! crate; this module only fixes what the engine may assume about them.

use crate::domain::{Bar, Signal};

/// A strategy consumes a look-back window of bars and emits zero or more
/// signals for the current bar. Implementations hold their own parameters
/// and indicator state.
pub trait Strategy: Send + Sync {
    /// Bars of look-back this strategy needs beyond the engine's baseline
    /// warmup (e.g. a 200-period moving average needs 200 bars before its
    /// first signal is meaningful).
    fn warmup_bars(&self) -> usize {
        0
    }

    /// Emit signals from a look-back window ending at the current bar.
    /// The engine filters to signals whose `time` equals the current bar's
    /// time; a strategy may return signals for earlier bars in the window
    /// without those being acted on twice.
    fn generate_signals(&self, window: &[Bar]) -> Vec<Signal>;

    /// Optional override of the engine's default risk-based position
    /// sizing. Returning `None` defers to the engine's formula.
    fn position_size(&self, _signal: &Signal, _balance: f64) -> Option<f64> {
        None
    }
}
