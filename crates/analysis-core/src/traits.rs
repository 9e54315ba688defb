use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{FundamentalSnapshot, NewsItem, PriceRow, SignalError};

/// Source of daily prices and valuation snapshots
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily rows between `start` and `end` inclusive, oldest first.
    async fn get_ohlcv(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, SignalError>;

    /// Valuation snapshot for one day, `None` when that day has no data.
    async fn get_fundamentals(
        &self,
        ticker: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FundamentalSnapshot>, SignalError>;

    /// Listing market of the ticker, if the provider knows it.
    async fn market_of(&self, _ticker: &str) -> Option<String> {
        None
    }
}

/// Source of news text
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<NewsItem>, SignalError>;
}
