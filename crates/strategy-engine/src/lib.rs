//! Decision layer: turns a trained model's P(up) into BUY/HOLD/SELL, keeps the
//! trade ledger and evolves feature usage and risk posture between runs.

pub mod batch;
pub mod engine;
pub mod evolution;
pub mod ledger;
pub mod policy;
pub mod store;

#[cfg(test)]
mod test_support;

pub use batch::{save_batch_output, BatchEntry, WatchItem};
pub use engine::{select_feature_columns, AnalysisResult, StrategyEngine, EVOLUTION_FILE, LEDGER_FILE};
pub use evolution::{derive_active_features, drawdown, EvolutionState, MddTracker, PerformanceRecord};
pub use ledger::{TradeLedger, TradeLedgerEntry};
pub use policy::{decide, expected_return, expected_return_from, ExpectedReturn, Signals, Thresholds};
