//! Feature enrichment: fetch prices, fundamentals and news for one ticker and
//! turn them into a chronologically ordered feature table with next-day labels.
//!
//! Price history is mandatory; every other collaborator degrades to a neutral
//! value when it fails.

pub mod news_archive;
pub mod stages;

pub use news_archive::NewsArchive;
pub use stages::*;

use analysis_core::{
    FeatureRow, Fundamentals, MarketDataProvider, NewsItem, NewsProvider, PriceRow, RetryPolicy,
    SentimentSnapshot, SignalError,
};
use chrono::{Duration, NaiveDate, Utc};
use sentiment_analysis::SentimentScorer;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Calendar-day probes when walking back to the most recent fundamentals
pub const FUNDAMENTALS_LOOKBACK_DAYS: u32 = 7;
/// Extra days fetched beyond `years * 365` so the window covers whole years
const HISTORY_PADDING_DAYS: i64 = 30;

/// Everything one pipeline run produces for a ticker
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub ticker: String,
    pub name: String,
    pub market: String,
    pub feature_table: Vec<FeatureRow>,
    pub fundamentals: Fundamentals,
    pub sentiment: SentimentSnapshot,
}

pub struct FeatureEnrichmentPipeline {
    market: Arc<dyn MarketDataProvider>,
    news: Arc<dyn NewsProvider>,
    scorer: SentimentScorer,
    fundamentals_retry: RetryPolicy,
    news_retry: RetryPolicy,
    as_of: Option<NaiveDate>,
}

impl FeatureEnrichmentPipeline {
    pub fn new(market: Arc<dyn MarketDataProvider>, news: Arc<dyn NewsProvider>) -> Self {
        Self {
            market,
            news,
            scorer: SentimentScorer::new(),
            fundamentals_retry: RetryPolicy::new(FUNDAMENTALS_LOOKBACK_DAYS, std::time::Duration::ZERO),
            news_retry: RetryPolicy::fail_fast(),
            as_of: None,
        }
    }

    /// Pins "today" instead of reading the clock, for reproducible runs.
    pub fn with_as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    pub fn with_news_retry(mut self, policy: RetryPolicy) -> Self {
        self.news_retry = policy;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Ordered daily rows covering at least `years` years up to today.
    /// Zero-volume rows are dropped. No retry.
    pub async fn fetch_price_history(&self, ticker: &str, years: u32) -> Result<Vec<PriceRow>, SignalError> {
        let end = self.today();
        let start = end - Duration::days(365 * i64::from(years) + HISTORY_PADDING_DAYS);

        let mut rows = self.market.get_ohlcv(ticker, start, end).await?;
        rows.retain(|r| r.volume > 0.0);
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);

        match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => {
                tracing::info!("{}: {} daily rows ({} ~ {})", ticker, rows.len(), first.date, last.date);
                Ok(rows)
            }
            _ => Err(SignalError::DataUnavailable(format!("{ticker}: no price history"))),
        }
    }

    /// Most recent fundamentals, walking back one calendar day per probe.
    /// Empty on total failure.
    pub async fn fetch_fundamentals(&self, ticker: &str) -> Fundamentals {
        let today = self.today();
        let found = self
            .fundamentals_retry
            .run("fundamentals", |days_back| {
                let day = today - Duration::days(i64::from(days_back));
                async move { self.market.get_fundamentals(ticker, day).await }
            })
            .await;

        match found {
            Ok(Some(snapshot)) => Fundamentals::from(snapshot),
            Ok(None) => {
                tracing::warn!("{}: no fundamentals in the last {} days", ticker, FUNDAMENTALS_LOOKBACK_DAYS);
                Fundamentals::default()
            }
            Err(e) => {
                tracing::warn!("{}: fundamentals lookup failed: {}", ticker, e);
                Fundamentals::default()
            }
        }
    }

    /// Scores news matching the ticker or company name. No matches is neutral.
    pub async fn fetch_sentiment(&self, ticker: &str, name: &str) -> SentimentSnapshot {
        let mut seen: HashSet<String> = HashSet::new();
        let mut articles: Vec<NewsItem> = Vec::new();

        for query in [ticker, name].into_iter().filter(|q| !q.is_empty()) {
            let result = self
                .news_retry
                .run("news", |_| async move { self.news.search(query).await.map(Some) })
                .await;

            match result {
                Ok(items) => {
                    for item in items.unwrap_or_default() {
                        if seen.insert(item.title.clone()) {
                            articles.push(item);
                        }
                    }
                }
                Err(e) => tracing::warn!("{}: news search for '{}' failed: {}", ticker, query, e),
            }
        }

        if articles.is_empty() {
            tracing::debug!("{}: no related news, using neutral sentiment", ticker);
        }
        self.scorer.score_articles(&articles)
    }

    /// Collects, cleans and enriches data for one ticker.
    pub async fn full_pipeline(&self, ticker: &str, name: &str, years: u32) -> Result<PipelineOutput, SignalError> {
        tracing::info!("[{}] Feature pipeline started", ticker);

        let prices = self
            .fetch_price_history(ticker, years)
            .await
            .map_err(|e| SignalError::pipeline(ticker, e))?;

        let fundamentals = self.fetch_fundamentals(ticker).await;
        let sentiment = self.fetch_sentiment(ticker, name).await;
        let market = self
            .market
            .market_of(ticker)
            .await
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let cleaned = preprocess(&prices);
        if cleaned.is_empty() {
            return Err(SignalError::pipeline(
                ticker,
                SignalError::DataUnavailable(format!("{ticker}: no rows left after preprocessing")),
            ));
        }

        let mut table = compute_technicals(&cleaned);
        add_fundamental_features(&mut table, &fundamentals);
        add_sentiment_features(&mut table, &sentiment);
        add_combo_features(&mut table);
        create_labels(&mut table);

        tracing::info!("[{}] Feature pipeline finished: {} rows, market={}", ticker, table.len(), market);

        Ok(PipelineOutput {
            ticker: ticker.to_string(),
            name: name.to_string(),
            market,
            feature_table: table,
            fundamentals,
            sentiment,
        })
    }
}
