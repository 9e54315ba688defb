use crate::store::{load_json, save_json_atomic};
use analysis_core::{Decision, SignalError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub decision: Decision,
    pub p_up: f64,
    pub expected_return: f64,
    /// Realised return, filled in once the outcome is known
    pub actual_return: Option<f64>,
}

impl TradeLedgerEntry {
    pub fn is_completed(&self) -> bool {
        self.actual_return.is_some()
    }
}

/// Append-only trade history backed by a JSON array file.
#[derive(Debug, Clone)]
pub struct TradeLedger {
    path: PathBuf,
    entries: Vec<TradeLedgerEntry>,
}

impl TradeLedger {
    /// Loads the ledger at `path`; a missing file starts an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SignalError> {
        let path = path.into();
        let entries = load_json(&path)?.unwrap_or_default();
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[TradeLedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with a realised return, in ledger order.
    pub fn completed(&self) -> Vec<&TradeLedgerEntry> {
        self.entries.iter().filter(|e| e.is_completed()).collect()
    }

    pub fn record(&mut self, entry: TradeLedgerEntry) -> Result<(), SignalError> {
        tracing::debug!(ticker = %entry.ticker, decision = %entry.decision, "Recording trade");
        self.entries.push(entry);
        self.save()
    }

    /// Fills the most recent pending entry for `ticker`.
    pub fn settle(&mut self, ticker: &str, actual_return: f64) -> Result<&TradeLedgerEntry, SignalError> {
        if !actual_return.is_finite() {
            return Err(SignalError::InvalidInput(format!(
                "actual return must be finite, got {actual_return}"
            )));
        }
        let idx = self
            .entries
            .iter()
            .rposition(|e| e.ticker == ticker && !e.is_completed())
            .ok_or_else(|| SignalError::InvalidInput(format!("no pending trade for {ticker}")))?;

        self.entries[idx].actual_return = Some(actual_return);
        self.save()?;
        tracing::info!(ticker, actual_return, "Trade settled");
        Ok(&self.entries[idx])
    }

    fn save(&self) -> Result<(), SignalError> {
        save_json_atomic(&self.path, &self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ticker: &str) -> TradeLedgerEntry {
        TradeLedgerEntry {
            timestamp: Utc::now(),
            ticker: ticker.to_string(),
            decision: Decision::Hold,
            p_up: 0.5,
            expected_return: 0.0,
            actual_return: None,
        }
    }

    #[test]
    fn test_record_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade_history.json");

        let mut ledger = TradeLedger::open(&path).unwrap();
        assert!(ledger.is_empty());
        ledger.record(entry("AAPL")).unwrap();
        ledger.record(entry("MSFT")).unwrap();

        let reloaded = TradeLedger::open(&path).unwrap();
        assert_eq!(reloaded.entries(), ledger.entries());

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw[0]["actual_return"].is_null());
        assert_eq!(raw[1]["decision"], "HOLD");
    }

    #[test]
    fn test_settle_fills_latest_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path().join("ledger.json")).unwrap();
        ledger.record(entry("AAPL")).unwrap();
        ledger.record(entry("AAPL")).unwrap();

        ledger.settle("AAPL", 0.02).unwrap();
        assert_eq!(ledger.entries()[0].actual_return, None);
        assert_eq!(ledger.entries()[1].actual_return, Some(0.02));

        ledger.settle("AAPL", -0.01).unwrap();
        assert_eq!(ledger.completed().len(), 2);

        let err = ledger.settle("AAPL", 0.01).unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
        assert!(ledger.settle("NVDA", 0.01).is_err());
    }
}
