use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use strategy_engine::WatchItem;

const DEFAULT_RATE_LIMIT: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_YEARS: u32 = 3;

const DEFAULT_WATCHLIST: &[(&str, &str)] = &[
    ("AAPL", "Apple"),
    ("MSFT", "Microsoft"),
    ("NVDA", "NVIDIA"),
    ("GOOGL", "Alphabet"),
    ("AMZN", "Amazon"),
    ("META", "Meta Platforms"),
    ("TSLA", "Tesla"),
    ("JPM", "JPMorgan Chase"),
];

/// Runtime settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct QuantConfig {
    pub polygon_api_key: Option<String>,
    /// Polygon requests per minute
    pub rate_limit: usize,
    pub http_timeout: Duration,
    pub state_dir: PathBuf,
    pub news_file: Option<PathBuf>,
    pub watchlist: Vec<WatchItem>,
    pub batch_concurrency: usize,
    pub years: u32,
    pub json_logs: bool,
}

impl QuantConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let watchlist = match var("QUANT_WATCHLIST") {
            Some(raw) => parse_watchlist(&raw)?,
            None => DEFAULT_WATCHLIST
                .iter()
                .map(|(ticker, name)| WatchItem::new(*ticker, *name))
                .collect(),
        };

        Ok(Self {
            polygon_api_key: var("POLYGON_API_KEY"),
            rate_limit: parse_or(var("POLYGON_RATE_LIMIT"), "POLYGON_RATE_LIMIT", DEFAULT_RATE_LIMIT)?,
            http_timeout: Duration::from_secs(parse_or(
                var("QUANT_HTTP_TIMEOUT_SECS"),
                "QUANT_HTTP_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            state_dir: var("QUANT_STATE_DIR").map(PathBuf::from).unwrap_or_else(default_state_dir),
            news_file: var("QUANT_NEWS_FILE").map(PathBuf::from),
            watchlist,
            batch_concurrency: parse_or(var("QUANT_BATCH_CONCURRENCY"), "QUANT_BATCH_CONCURRENCY", DEFAULT_CONCURRENCY)?
                .max(1),
            years: parse_or(var("QUANT_YEARS"), "QUANT_YEARS", DEFAULT_YEARS)?,
            json_logs: var("QUANT_LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw.parse().with_context(|| format!("{key}: invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("quant-signal"))
        .unwrap_or_else(|| PathBuf::from("output").join("quant"))
}

/// Parses `TICKER[:Name]` items separated by commas.
pub fn parse_watchlist(raw: &str) -> Result<Vec<WatchItem>> {
    let items: Vec<WatchItem> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once(':') {
            Some((ticker, name)) => WatchItem::new(ticker.trim().to_uppercase(), name.trim()),
            None => WatchItem::new(item.to_uppercase(), ""),
        })
        .collect();

    if items.iter().any(|i| i.ticker.is_empty()) {
        bail!("QUANT_WATCHLIST contains an item without a ticker: '{raw}'");
    }
    if items.is_empty() {
        bail!("QUANT_WATCHLIST is set but lists no tickers");
    }
    Ok(items)
}
