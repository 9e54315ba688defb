//! In-memory providers for engine tests.

use analysis_core::{
    FundamentalSnapshot, MarketDataProvider, NewsItem, PriceRow, SignalError,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use feature_pipeline::{FeatureEnrichmentPipeline, NewsArchive};
use std::collections::HashMap;
use std::sync::Arc;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
}

/// Deterministic pseudo-random walk of `n` daily rows ending yesterday.
pub fn random_walk(n: usize, seed: u64) -> Vec<PriceRow> {
    let mut state = seed;
    let mut close = 100.0;
    (0..n)
        .map(|i| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let u = (state >> 11) as f64 / (1u64 << 53) as f64;
            close *= 1.0 + (u - 0.5) * 0.03;
            PriceRow {
                date: today() - Duration::days((n - i) as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000_000.0 + (i % 7) as f64 * 10_000.0,
            }
        })
        .collect()
}

pub struct FakeMarket {
    pub series: HashMap<String, Vec<PriceRow>>,
}

#[async_trait]
impl MarketDataProvider for FakeMarket {
    async fn get_ohlcv(&self, ticker: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<PriceRow>, SignalError> {
        Ok(self.series.get(ticker).cloned().unwrap_or_default())
    }

    async fn get_fundamentals(&self, ticker: &str, _: NaiveDate) -> Result<Option<FundamentalSnapshot>, SignalError> {
        Ok(self.series.contains_key(ticker).then_some(FundamentalSnapshot {
            per: 15.0,
            pbr: 2.0,
            eps: 6.0,
            bps: 40.0,
        }))
    }
}

pub fn pipeline(series: &[(&str, Vec<PriceRow>)]) -> FeatureEnrichmentPipeline {
    let market = FakeMarket {
        series: series.iter().map(|(t, rows)| (t.to_string(), rows.clone())).collect(),
    };
    let news = NewsArchive::from_items(vec![NewsItem {
        title: "GOOD posts record profit".into(),
        summary: String::new(),
    }]);
    FeatureEnrichmentPipeline::new(Arc::new(market), Arc::new(news)).with_as_of(today())
}
