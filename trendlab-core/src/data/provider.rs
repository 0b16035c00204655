//! Broker data source contract.
//!
//! `BrokerDataSource` is the seam the cache calls out to on a miss. Concrete
//! adapters (MT5, a REST aggregator, a CSV importer) live outside this crate;
//! this module only fixes the contract they must satisfy.

use chrono::NaiveDateTime;

use crate::domain::{Bar, Timeframe};

use super::error::CacheError;

/// Supplies bars for a symbol/timeframe/range when the cache cannot.
pub trait BrokerDataSource: Send + Sync {
    /// Human-readable name, used in log lines and error messages.
    fn name(&self) -> &str;

    /// Fetch bars for `symbol` at `timeframe` covering `[start, end]` inclusive.
    ///
    /// Implementations should return bars sorted ascending by time; the
    /// cache re-sorts and deduplicates regardless.
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, CacheError>;
}
