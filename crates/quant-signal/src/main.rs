//! quant-signal: per-ticker BUY/HOLD/SELL signals with a self-evolving model.
//!
//! Usage:
//!   quant-signal                                   # analyse the watch-list
//!   quant-signal --evolve                          # one self-evolution step
//!   quant-signal analyze --ticker AAPL --name Apple --years 3
//!   quant-signal settle --ticker AAPL --actual-return 0.012

mod cli;
mod config;

use analysis_core::{FundamentalSnapshot, MarketDataProvider, NewsProvider, PriceRow, SignalError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use cli::{Cli, Command};
use config::QuantConfig;
use feature_pipeline::{FeatureEnrichmentPipeline, NewsArchive};
use polygon_client::{PolygonClient, PolygonSettings};
use std::sync::Arc;
use strategy_engine::{save_batch_output, StrategyEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "quant_signal=info,strategy_engine=info,feature_pipeline=info,model_trainer=info,polygon_client=warn";

/// Stands in for the market provider when no Polygon key is configured, so
/// ledger-only commands still work.
struct OfflineMarket;

#[async_trait]
impl MarketDataProvider for OfflineMarket {
    async fn get_ohlcv(&self, ticker: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<PriceRow>, SignalError> {
        Err(SignalError::DataUnavailable(format!(
            "{ticker}: POLYGON_API_KEY is not set"
        )))
    }

    async fn get_fundamentals(&self, _: &str, _: NaiveDate) -> Result<Option<FundamentalSnapshot>, SignalError> {
        Ok(None)
    }
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_pipeline(config: &QuantConfig) -> Result<FeatureEnrichmentPipeline> {
    let polygon = config.polygon_api_key.clone().map(|key| {
        Arc::new(PolygonClient::new(
            key,
            PolygonSettings {
                rate_limit: config.rate_limit,
                timeout: config.http_timeout,
            },
        ))
    });

    let market: Arc<dyn MarketDataProvider> = match &polygon {
        Some(client) => client.clone(),
        None => {
            tracing::warn!("POLYGON_API_KEY is not set; analyses will fail until it is configured");
            Arc::new(OfflineMarket)
        }
    };

    let news: Arc<dyn NewsProvider> = match (&config.news_file, &polygon) {
        (Some(path), _) => Arc::new(
            NewsArchive::load(path).with_context(|| format!("loading news archive {}", path.display()))?,
        ),
        (None, Some(client)) => client.clone(),
        (None, None) => Arc::new(NewsArchive::default()),
    };

    Ok(FeatureEnrichmentPipeline::new(market, news))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = QuantConfig::from_env()?;
    if let Some(years) = cli.years {
        config.years = years;
    }
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    init_tracing(config.json_logs);

    let pipeline = build_pipeline(&config)?;
    let mut engine = StrategyEngine::open(pipeline, &config.state_dir)
        .with_context(|| format!("opening state in {}", config.state_dir.display()))?;

    match cli.command {
        Some(Command::Analyze {
            ticker,
            name,
            no_record,
        }) => {
            let result = engine.analyze(&ticker.to_uppercase(), &name, config.years).await?;
            if !no_record {
                engine.record_trade(&result, None)?;
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(Command::Settle {
            ticker,
            actual_return,
        }) => {
            let entry = engine.settle_trade(&ticker.to_uppercase(), actual_return)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Some(Command::Evolve) => evolve(&mut engine)?,
        None if cli.evolve => evolve(&mut engine)?,
        None => {
            let entries = engine
                .run_batch(&config.watchlist, config.years, config.batch_concurrency)
                .await;
            let path = save_batch_output(&config.state_dir, &entries, Utc::now())?;
            let ok = entries.iter().filter(|e| e.is_success()).count();
            println!("{}/{} tickers analysed, results in {}", ok, entries.len(), path.display());
        }
    }

    Ok(())
}

fn evolve(engine: &mut StrategyEngine) -> Result<()> {
    match engine.self_improve()? {
        Some(record) => println!(
            "Generation {}: accuracy={:.4} mdd={:.4} trades={} conservative={}",
            record.generation,
            record.accuracy,
            record.mdd,
            record.n_trades,
            engine.state().conservative_mode()
        ),
        None => println!(
            "Not enough completed trades to evolve (generation {})",
            engine.state().generation
        ),
    }
    Ok(())
}
