//! Position management: owns open positions, applies the per-bar update
//! algorithm (SL/TP detection, partial closures, break-even, trailing stop).

pub mod manager;
pub mod ratchet;

pub use manager::{PositionError, PositionManager, UpdateReport};
pub use ratchet::RatchetState;
