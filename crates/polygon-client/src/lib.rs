use analysis_core::{
    FundamentalSnapshot, MarketDataProvider, NewsItem, NewsProvider, PriceRow, SignalError,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";
const MAX_429_RETRIES: u32 = 3;
const NEWS_LIMIT: u32 = 50;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).duration_since(now) + Duration::from_millis(50),
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Connection settings for [`PolygonClient`]
#[derive(Debug, Clone)]
pub struct PolygonSettings {
    /// Requests per minute
    pub rate_limit: usize,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for PolygonSettings {
    fn default() -> Self {
        Self {
            rate_limit: 5,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Polygon.io REST client serving prices, valuation snapshots and news.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String, settings: PolygonSettings) -> Self {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(settings.rate_limit, Duration::from_secs(60)),
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, SignalError> {
        let request = builder.build().map_err(|e| SignalError::Provider(e.to_string()))?;

        for attempt in 0..MAX_429_RETRIES {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| SignalError::Provider("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| SignalError::Provider(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(
                "Polygon 429 rate limited, waiting {}s before retry {}/{}",
                wait_secs,
                attempt + 1,
                MAX_429_RETRIES
            );
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(SignalError::Provider(format!(
            "Rate limited by Polygon after {} retries",
            MAX_429_RETRIES
        )))
    }

    /// Sends the request and decodes a successful JSON body.
    /// 401/403 (plan does not include the endpoint) decode as `None`.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<Option<T>, SignalError> {
        let response = self.send_request(builder).await?;
        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            tracing::warn!("Polygon {} not available on this plan (HTTP {})", what, status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SignalError::Provider(format!(
                "{} HTTP {}: {}",
                what,
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| SignalError::Provider(format!("{} decode: {}", what, e)))
    }

    /// Daily bars between two dates, inclusive
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceRow>, SignalError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            BASE_URL,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let body: Option<AggregateResponse> = self
            .get_json(
                self.client.get(&url).query(&[
                    ("apiKey", self.api_key.as_str()),
                    ("adjusted", "true"),
                    ("sort", "asc"),
                    ("limit", "50000"),
                ]),
                "aggregates",
            )
            .await?;

        Ok(body
            .map(|b| b.results)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let date = DateTime::from_timestamp_millis(r.t)?.date_naive();
                Some(PriceRow {
                    date,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect())
    }

    /// Quarterly filings published on or before `as_of`, most recent first
    async fn get_quarterly_financials(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<FinancialResult>, SignalError> {
        let url = format!("{}/vX/reference/financials", BASE_URL);
        let as_of = as_of.format("%Y-%m-%d").to_string();

        let body: Option<FinancialsResponse> = self
            .get_json(
                self.client.get(&url).query(&[
                    ("ticker", symbol),
                    ("timeframe", "quarterly"),
                    ("filing_date.lte", as_of.as_str()),
                    ("order", "desc"),
                    ("sort", "filing_date"),
                    ("limit", "4"),
                    ("apiKey", self.api_key.as_str()),
                ]),
                "financials",
            )
            .await?;

        Ok(body.map(|b| b.results).unwrap_or_default())
    }

    /// Ticker reference data, optionally as of a date
    pub async fn get_ticker_details(
        &self,
        symbol: &str,
        as_of: Option<NaiveDate>,
    ) -> Result<Option<TickerDetails>, SignalError> {
        let url = format!("{}/v3/reference/tickers/{}", BASE_URL, symbol);
        let mut query = vec![("apiKey", self.api_key.clone())];
        if let Some(date) = as_of {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }

        let body: Option<TickerDetailsResponse> = self
            .get_json(self.client.get(&url).query(&query), "ticker details")
            .await?;
        Ok(body.map(|b| b.results))
    }

    /// Recent news articles, optionally filtered by ticker
    pub async fn get_news(&self, symbol: Option<&str>, limit: u32) -> Result<Vec<NewsItem>, SignalError> {
        let url = format!("{}/v2/reference/news", BASE_URL);

        let mut query = vec![("apiKey", self.api_key.clone()), ("limit", limit.to_string())];
        if let Some(sym) = symbol {
            query.push(("ticker", sym.to_string()));
        }

        let body: Option<NewsResponse> = self
            .get_json(self.client.get(&url).query(&query), "news")
            .await?;

        Ok(body
            .map(|b| b.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| NewsItem {
                title: r.title,
                summary: r.description.unwrap_or_default(),
            })
            .collect())
    }
}

/// Trailing-twelve-month EPS from up to four quarters, annualising a shorter history.
fn trailing_eps(quarters: &[FinancialResult]) -> Option<f64> {
    let eps: Vec<f64> = quarters
        .iter()
        .filter_map(|q| statement_value(&q.financials.income_statement, "basic_earnings_per_share"))
        .collect();
    if eps.is_empty() {
        return None;
    }
    Some(eps.iter().sum::<f64>() * 4.0 / eps.len() as f64)
}

fn statement_value(statement: &HashMap<String, serde_json::Value>, key: &str) -> Option<f64> {
    statement.get(key).and_then(|v| v.get("value")).and_then(|v| v.as_f64())
}

/// Builds a valuation snapshot from a closing price, TTM EPS and book value per share.
fn valuation(close: f64, eps: f64, bps: f64) -> FundamentalSnapshot {
    FundamentalSnapshot {
        per: if eps > 0.0 { close / eps } else { 0.0 },
        pbr: if bps > 0.0 { close / bps } else { 0.0 },
        eps,
        bps,
    }
}

/// Ticker-like queries (e.g. `AAPL`, `BRK.B`) use the ticker filter; anything
/// else is matched against headlines of the general feed.
fn is_ticker_like(query: &str) -> bool {
    !query.is_empty()
        && query.len() <= 6
        && query.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.')
}

#[async_trait]
impl MarketDataProvider for PolygonClient {
    async fn get_ohlcv(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, SignalError> {
        self.get_daily_bars(ticker, start, end).await
    }

    async fn get_fundamentals(
        &self,
        ticker: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FundamentalSnapshot>, SignalError> {
        // A missing bar means `as_of` was not a trading day
        let close = match self.get_daily_bars(ticker, as_of, as_of).await?.last() {
            Some(bar) => bar.close,
            None => return Ok(None),
        };

        let quarters = self.get_quarterly_financials(ticker, as_of).await?;
        let Some(latest) = quarters.first() else {
            return Ok(None);
        };
        let eps = trailing_eps(&quarters).unwrap_or(0.0);
        let equity = statement_value(&latest.financials.balance_sheet, "equity").unwrap_or(0.0);

        let shares = self
            .get_ticker_details(ticker, Some(as_of))
            .await?
            .and_then(|d| d.weighted_shares_outstanding.or(d.share_class_shares_outstanding))
            .unwrap_or(0.0);
        let bps = if shares > 0.0 { equity / shares } else { 0.0 };

        Ok(Some(valuation(close, eps, bps)))
    }

    async fn market_of(&self, ticker: &str) -> Option<String> {
        match self.get_ticker_details(ticker, None).await {
            Ok(details) => details.map(|d| d.primary_exchange),
            Err(e) => {
                tracing::warn!("Market lookup failed for {}: {}", ticker, e);
                None
            }
        }
    }
}

#[async_trait]
impl NewsProvider for PolygonClient {
    async fn search(&self, query: &str) -> Result<Vec<NewsItem>, SignalError> {
        if is_ticker_like(query) {
            return self.get_news(Some(query), NEWS_LIMIT).await;
        }
        let needle = query.to_lowercase();
        Ok(self
            .get_news(None, NEWS_LIMIT)
            .await?
            .into_iter()
            .filter(|a| a.title.to_lowercase().contains(&needle))
            .collect())
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
}

#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<FinancialResult>,
}

#[derive(Debug, Deserialize)]
struct FinancialResult {
    financials: FinancialStatements,
}

#[derive(Debug, Deserialize)]
struct FinancialStatements {
    #[serde(default)]
    income_statement: HashMap<String, serde_json::Value>,
    #[serde(default)]
    balance_sheet: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    title: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerDetails {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub primary_exchange: String,
    pub share_class_shares_outstanding: Option<f64>,
    pub weighted_shares_outstanding: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter(eps: f64, equity: f64) -> FinancialResult {
        let json = serde_json::json!({
            "financials": {
                "income_statement": { "basic_earnings_per_share": { "value": eps } },
                "balance_sheet": { "equity": { "value": equity } }
            }
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_trailing_eps_sums_four_quarters() {
        let quarters = vec![quarter(1.0, 0.0), quarter(1.5, 0.0), quarter(0.5, 0.0), quarter(1.0, 0.0)];
        assert!((trailing_eps(&quarters).unwrap() - 4.0).abs() < 1e-12);

        // Two quarters are annualised
        let short = vec![quarter(1.0, 0.0), quarter(2.0, 0.0)];
        assert!((trailing_eps(&short).unwrap() - 6.0).abs() < 1e-12);
        assert!(trailing_eps(&[]).is_none());
    }

    #[test]
    fn test_valuation_guards_non_positive_denominators() {
        let v = valuation(100.0, 5.0, 50.0);
        assert!((v.per - 20.0).abs() < 1e-12);
        assert!((v.pbr - 2.0).abs() < 1e-12);

        let loss_making = valuation(100.0, -2.0, 0.0);
        assert_eq!(loss_making.per, 0.0);
        assert_eq!(loss_making.pbr, 0.0);
    }

    #[test]
    fn test_ticker_like_queries() {
        assert!(is_ticker_like("AAPL"));
        assert!(is_ticker_like("BRK.B"));
        assert!(is_ticker_like("005930"));
        assert!(!is_ticker_like("Apple"));
        assert!(!is_ticker_like(""));
    }

    #[test]
    fn test_aggregate_decoding() {
        let body: AggregateResponse = serde_json::from_str(
            r#"{"results":[{"t":1704153600000,"o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":100.0}]}"#,
        )
        .unwrap();
        assert_eq!(body.results.len(), 1);
        let empty: AggregateResponse = serde_json::from_str(r#"{"status":"OK"}"#).unwrap();
        assert!(empty.results.is_empty());
    }
}
