//! Watch-list batch runs with per-ticker failure isolation.

use crate::engine::{AnalysisResult, StrategyEngine};
use crate::store::save_json_atomic;
use analysis_core::SignalError;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchItem {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
}

impl WatchItem {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
        }
    }
}

/// Outcome for one ticker of a batch
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Success { ticker: String, result: Box<AnalysisResult> },
    Failure { ticker: String, error: String, kind: String },
}

impl BatchEntry {
    pub fn ticker(&self) -> &str {
        match self {
            BatchEntry::Success { ticker, .. } | BatchEntry::Failure { ticker, .. } => ticker,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchEntry::Success { .. })
    }

    fn failure(ticker: &str, err: &SignalError) -> Self {
        BatchEntry::Failure {
            ticker: ticker.to_string(),
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

impl StrategyEngine {
    /// Evolves once, analyses every ticker with at most `concurrency` in
    /// flight, then records a ledger entry for each success. Entries come back
    /// in watch-list order.
    pub async fn run_batch(&mut self, watchlist: &[WatchItem], years: u32, concurrency: usize) -> Vec<BatchEntry> {
        if let Err(e) = self.self_improve() {
            tracing::error!("Evolution step failed, continuing with current state: {}", e);
        }
        tracing::info!(
            tickers = watchlist.len(),
            generation = self.state().generation,
            "Batch analysis started"
        );

        let outcomes: Vec<(&WatchItem, Result<AnalysisResult, SignalError>)> = {
            let engine = &*self;
            stream::iter(watchlist)
                .map(|item| async move { (item, engine.analyze(&item.ticker, &item.name, years).await) })
                .buffered(concurrency.max(1))
                .collect()
                .await
        };

        let mut entries = Vec::with_capacity(outcomes.len());
        for (item, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    if let Err(e) = self.record_trade(&result, None) {
                        tracing::warn!(ticker = %item.ticker, "Could not record trade: {}", e);
                    }
                    entries.push(BatchEntry::Success {
                        ticker: item.ticker.clone(),
                        result: Box::new(result),
                    });
                }
                Err(e) => {
                    tracing::error!(ticker = %item.ticker, kind = e.kind(), "Analysis failed: {}", e);
                    entries.push(BatchEntry::failure(&item.ticker, &e));
                }
            }
        }

        let ok = entries.iter().filter(|e| e.is_success()).count();
        tracing::info!("Batch finished: {}/{} succeeded", ok, entries.len());
        entries
    }
}

/// Writes batch entries to `<dir>/quant_analysis_<YYYYmmdd_HHMMSS>.json`.
pub fn save_batch_output(dir: &Path, entries: &[BatchEntry], at: DateTime<Utc>) -> Result<PathBuf, SignalError> {
    let path = dir.join(format!("quant_analysis_{}.json", at.format("%Y%m%d_%H%M%S")));
    save_json_atomic(&path, &entries)?;
    tracing::info!("Batch results saved to {}", path.display());
    Ok(path)
}
