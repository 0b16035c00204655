//! Errors produced by the historical data cache and the broker contract.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::Timeframe;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no data available for {symbol} {timeframe:?} [{start}, {end}]")]
    NoData {
        symbol: String,
        timeframe: Timeframe,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("corrupt cache file: {0}")]
    CorruptFile(String),
    #[error("cache io error: {0}")]
    Io(String),
}
