//! TrendLab Core — domain types, position management, the historical data
//! cache, and the bar-by-bar backtest engine.
//!
//! This crate contains:
//! - Domain types (bars, positions, trades, signals, instruments)
//! - Position management with the ratchet invariant (trailing stops tighten only)
//! - A content-addressed, range-indexed historical data cache
//! - The bar-by-bar backtest engine
//! - The `Strategy`/`BrokerDataSource` external contracts

pub mod data;
pub mod domain;
pub mod engine;
pub mod position;
pub mod rng;
pub mod strategy;
