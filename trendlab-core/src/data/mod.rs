//! Historical data cache and the broker data source contract it calls out to.

pub mod cache;
pub mod error;
pub mod provider;

pub use cache::{CacheStats, HistoricalDataCache};
pub use error::CacheError;
pub use provider::BrokerDataSource;
