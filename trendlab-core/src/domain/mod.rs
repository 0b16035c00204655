//! Domain types for the backtesting core.

pub mod bar;
pub mod ids;
pub mod instrument;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::{Bar, Timeframe};
pub use ids::{ConfigHash, DatasetHash, FullHash, IdGen, PositionId, RunId, SignalEventId};
pub use instrument::{AssetClass, Instrument, OrderSide, round_to_lot, round_to_tick};
pub use position::{
    BreakevenConfig, CloseReason, Direction, PartialLevel, Position, PositionStatus,
    TrailingConfig,
};
pub use signal::Signal;
pub use trade::{PartialCloseRecord, TradeRecord};

/// Symbol type alias.
pub type Symbol = String;
