use crate::evolution::{EvolutionState, PerformanceRecord, MIN_COMPLETED_TRADES};
use crate::ledger::{TradeLedger, TradeLedgerEntry};
use crate::policy::{decide, expected_return, Signals, Thresholds};
use crate::store::{load_json, save_json_atomic};
use analysis_core::stats::round_to;
use analysis_core::{
    Decision, Feature, FeatureRow, Fundamentals, SentimentSnapshot, SignalError,
};
use chrono::{NaiveDate, Utc};
use feature_pipeline::{FeatureEnrichmentPipeline, PipelineOutput};
use model_trainer::{ClassificationMetrics, ModelTrainer, TrainingReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const EVOLUTION_FILE: &str = "evolution_state.json";
pub const LEDGER_FILE: &str = "trade_history.json";

/// Full output of one `analyze` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ticker: String,
    pub name: String,
    pub market: String,
    pub data_start: NaiveDate,
    pub data_end: NaiveDate,
    pub rows: usize,
    pub feature_columns: Vec<Feature>,
    pub selected_model: String,
    pub model_metrics: BTreeMap<String, ClassificationMetrics>,
    /// Selected model scored on the held-out test block
    pub test_metrics: Option<ClassificationMetrics>,
    pub p_up: f64,
    pub expected_return: f64,
    pub avg_gain: f64,
    pub avg_loss: f64,
    pub rsi: f64,
    pub ma20_ratio: Option<f64>,
    pub ma60_ratio: Option<f64>,
    pub fundamentals: Fundamentals,
    pub sentiment: SentimentSnapshot,
    pub decision: Decision,
    pub conservative_mode: bool,
    pub evolution_gen: u64,
}

struct ModelOutcome {
    report: TrainingReport,
    test_metrics: Option<ClassificationMetrics>,
    p_up: f64,
}

/// Per-ticker decision engine with a self-evolving feature set.
///
/// `analyze` only reads the evolution state; `self_improve` is the single
/// writer and must not run while analyses are in flight.
pub struct StrategyEngine {
    pipeline: Arc<FeatureEnrichmentPipeline>,
    state: EvolutionState,
    state_path: PathBuf,
    ledger: TradeLedger,
}

impl StrategyEngine {
    /// Loads evolution state and trade ledger from `state_dir`, starting fresh
    /// when the files do not exist yet.
    pub fn open(pipeline: FeatureEnrichmentPipeline, state_dir: impl AsRef<Path>) -> Result<Self, SignalError> {
        let dir = state_dir.as_ref();
        let state_path = dir.join(EVOLUTION_FILE);

        let state = match load_json::<EvolutionState>(&state_path)? {
            Some(state) => {
                tracing::info!(
                    "Loaded evolution state: generation {}, {} active features, conservative={}",
                    state.generation,
                    state.active_features.len(),
                    state.conservative_mode()
                );
                state
            }
            None => {
                tracing::info!("No evolution state at {}, starting at generation 0", state_path.display());
                EvolutionState::default()
            }
        };
        let ledger = TradeLedger::open(dir.join(LEDGER_FILE))?;

        Ok(Self {
            pipeline: Arc::new(pipeline),
            state,
            state_path,
            ledger,
        })
    }

    pub fn state(&self) -> &EvolutionState {
        &self.state
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::for_mode(self.state.conservative_mode())
    }

    /// Runs the pipeline, trains the candidates and decides for one ticker.
    pub async fn analyze(&self, ticker: &str, name: &str, years: u32) -> Result<AnalysisResult, SignalError> {
        tracing::info!(ticker, name, "Quant analysis started");
        self.analyze_inner(ticker, name, years)
            .await
            .map_err(|e| SignalError::analysis(ticker, e))
    }

    async fn analyze_inner(&self, ticker: &str, name: &str, years: u32) -> Result<AnalysisResult, SignalError> {
        let PipelineOutput {
            market,
            feature_table,
            fundamentals,
            sentiment,
            ..
        } = self.pipeline.full_pipeline(ticker, name, years).await?;

        let columns = select_feature_columns(&self.state.active_features, &feature_table);
        tracing::debug!(ticker, columns = columns.len(), "Training on active features");

        let table = Arc::new(feature_table);
        let outcome = {
            let table = Arc::clone(&table);
            let columns = columns.clone();
            tokio::task::spawn_blocking(move || train_and_predict(&table, &columns))
                .await
                .map_err(|e| SignalError::ModelTrainingFailure(format!("training task failed: {e}")))??
        };

        let (Some(first), Some(latest)) = (table.first(), table.last()) else {
            return Err(SignalError::DataUnavailable(format!("{ticker}: empty feature table")));
        };

        let er = expected_return(&table, outcome.p_up);
        let signals = Signals {
            p_up: outcome.p_up,
            expected_return: er.expected_return,
            rsi14: latest.rsi14,
            sentiment_score: latest.sentiment_score,
            negative_surge: latest.negative_surge > 0.5,
        };
        let decision = decide(&signals, &self.thresholds());

        tracing::info!(
            ticker,
            p_up = outcome.p_up,
            expected_return = er.expected_return,
            decision = %decision,
            "P(up)={:.4} E[R]={:.4}% -> {}",
            outcome.p_up,
            er.expected_return * 100.0,
            decision
        );

        Ok(AnalysisResult {
            ticker: ticker.to_string(),
            name: name.to_string(),
            market,
            data_start: first.date,
            data_end: latest.date,
            rows: table.len(),
            feature_columns: columns,
            selected_model: outcome.report.selected_model,
            model_metrics: outcome.report.metrics,
            test_metrics: outcome.test_metrics,
            p_up: round_to(outcome.p_up, 4),
            expected_return: round_to(er.expected_return, 6),
            avg_gain: round_to(er.avg_gain, 4),
            avg_loss: round_to(er.avg_loss, 4),
            rsi: round_to(latest.rsi14, 2),
            ma20_ratio: latest.ma20_ratio.map(|v| round_to(v, 4)),
            ma60_ratio: latest.ma60_ratio.map(|v| round_to(v, 4)),
            fundamentals,
            sentiment,
            decision,
            conservative_mode: self.state.conservative_mode(),
            evolution_gen: self.state.generation,
        })
    }

    /// Appends a ledger entry for `result`; the realised return usually
    /// arrives later through [`StrategyEngine::settle_trade`].
    pub fn record_trade(&mut self, result: &AnalysisResult, actual_return: Option<f64>) -> Result<(), SignalError> {
        self.ledger.record(TradeLedgerEntry {
            timestamp: Utc::now(),
            ticker: result.ticker.clone(),
            decision: result.decision,
            p_up: result.p_up,
            expected_return: result.expected_return,
            actual_return,
        })
    }

    pub fn settle_trade(&mut self, ticker: &str, actual_return: f64) -> Result<TradeLedgerEntry, SignalError> {
        self.ledger.settle(ticker, actual_return).cloned()
    }

    /// Evolves weights, active features and risk mode from completed trades.
    ///
    /// Too few completed trades is a normal steady state: logged, state
    /// untouched, `Ok(None)`.
    pub fn self_improve(&mut self) -> Result<Option<PerformanceRecord>, SignalError> {
        let completed = self.ledger.completed();
        if completed.len() < MIN_COMPLETED_TRADES {
            tracing::info!(
                "Evolution skipped: {} completed trades (need {})",
                completed.len(),
                MIN_COMPLETED_TRADES
            );
            return Ok(None);
        }

        let mut next = self.state.clone();
        let record = next.evolve(&completed, Utc::now());
        if record.is_some() {
            save_json_atomic(&self.state_path, &next)?;
            self.state = next;
        }
        Ok(record)
    }
}

/// Active features that have at least one value in the table; the base set
/// when fewer than three of them remain.
pub fn select_feature_columns(active: &[Feature], rows: &[FeatureRow]) -> Vec<Feature> {
    let available = |f: &Feature| rows.iter().any(|r| r.feature(*f).is_some());

    let columns: Vec<Feature> = active.iter().copied().filter(available).collect();
    if columns.len() >= 3 {
        return columns;
    }
    tracing::warn!("Only {} active features available, using the base feature set", columns.len());
    Feature::BASE.iter().copied().filter(available).collect()
}

fn train_and_predict(table: &[FeatureRow], columns: &[Feature]) -> Result<ModelOutcome, SignalError> {
    let mut trainer = ModelTrainer::new();
    let split = trainer.time_series_split(table, columns);
    let report = trainer.train_and_select(&split.train, &split.validation)?;

    let test_metrics = if split.test.is_empty() {
        None
    } else {
        let m = trainer.evaluate(&split.test)?;
        tracing::info!("  Test AUC={:.4} ({} rows)", m.roc_auc, split.test.len());
        Some(m)
    };

    let latest = table
        .last()
        .and_then(|row| row.feature_vector(columns))
        .ok_or_else(|| SignalError::DataUnavailable("latest row is missing feature values".into()))?;
    let p_up = trainer.predict_p_up(&latest)?;

    Ok(ModelOutcome {
        report,
        test_metrics,
        p_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::MDD_LIMIT;
    use crate::test_support::{pipeline, random_walk};

    fn settled(ticker: &str, decision: Decision, actual: f64) -> TradeLedgerEntry {
        TradeLedgerEntry {
            timestamp: Utc::now(),
            ticker: ticker.to_string(),
            decision,
            p_up: 0.6,
            expected_return: 0.001,
            actual_return: Some(actual),
        }
    }

    fn seed_ledger(dir: &Path, entries: Vec<TradeLedgerEntry>) {
        let mut ledger = TradeLedger::open(dir.join(LEDGER_FILE)).unwrap();
        for e in entries {
            ledger.record(e).unwrap();
        }
    }

    #[tokio::test]
    async fn test_analyze_produces_consistent_result() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StrategyEngine::open(pipeline(&[("GOOD", random_walk(400, 7))]), dir.path()).unwrap();

        let result = engine.analyze("GOOD", "Good Corp", 2).await.unwrap();
        assert_eq!(result.rows, 400);
        assert_eq!(result.market, "UNKNOWN");
        assert_eq!(result.feature_columns, Feature::BASE.to_vec());
        assert!(result.model_metrics.contains_key("lr"));
        assert!(result.model_metrics.contains_key("rf"));
        assert!(result.model_metrics.contains_key(&result.selected_model));
        assert!(result.test_metrics.is_some());
        assert!((0.0..=1.0).contains(&result.p_up));
        assert_eq!(result.evolution_gen, 0);
        assert!(!result.conservative_mode);
        assert_eq!(result.fundamentals.roe, Some(15.0));
        assert!(result.sentiment.sentiment_score > 0.0);

        // the decision follows the normal-mode rules
        if result.p_up < Thresholds::NORMAL.sell_p_up {
            assert_eq!(result.decision, Decision::Sell);
        } else if result.decision == Decision::Buy {
            assert!(result.expected_return >= 0.0 && result.rsi <= 70.0);
        }
    }

    #[tokio::test]
    async fn test_analyze_wraps_pipeline_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StrategyEngine::open(pipeline(&[]), dir.path()).unwrap();

        let err = engine.analyze("NONE", "", 3).await.unwrap_err();
        assert_eq!(err.kind(), "AnalysisError");
        assert!(matches!(err.root_cause(), SignalError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_analyze_short_history_is_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StrategyEngine::open(pipeline(&[("SHORT", random_walk(150, 3))]), dir.path()).unwrap();

        let err = engine.analyze("SHORT", "", 1).await.unwrap_err();
        assert_eq!(err.kind(), "AnalysisError");
        assert!(matches!(
            err.root_cause(),
            SignalError::InsufficientTrainingData { .. }
        ));
    }

    #[test]
    fn test_self_improve_rewards_and_promotes_combo() {
        let dir = tempfile::tempdir().unwrap();
        // 13 of 20 directional calls right: accuracy 0.65
        let mut entries = Vec::new();
        for i in 0..20 {
            let right = i < 13;
            let actual = if i % 2 == 0 { 0.004 } else { -0.003 };
            let decision = match (actual > 0.0, right) {
                (true, true) | (false, false) => Decision::Buy,
                _ => Decision::Sell,
            };
            entries.push(settled("AAA", decision, actual));
        }
        seed_ledger(dir.path(), entries);

        let mut engine = StrategyEngine::open(pipeline(&[]), dir.path()).unwrap();
        let record = engine.self_improve().unwrap().unwrap();

        assert!((record.accuracy - 0.65).abs() < 1e-12);
        assert_eq!(engine.state().generation, 1);
        assert!(engine.state().feature_weights.values().all(|w| (*w - 1.1).abs() < 1e-12));
        assert!(engine.state().active_features.contains(&Feature::Ma20SentCombo));

        // persisted state reloads identically
        let reopened = StrategyEngine::open(pipeline(&[]), dir.path()).unwrap();
        assert_eq!(reopened.state(), engine.state());
    }

    #[test]
    fn test_self_improve_noop_below_five_completed() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries: Vec<TradeLedgerEntry> = (0..4).map(|_| settled("AAA", Decision::Buy, 0.01)).collect();
        let mut pending = settled("AAA", Decision::Buy, 0.0);
        pending.actual_return = None;
        entries.push(pending);
        seed_ledger(dir.path(), entries);

        let mut engine = StrategyEngine::open(pipeline(&[]), dir.path()).unwrap();
        let before = engine.state().clone();

        assert!(engine.self_improve().unwrap().is_none());
        assert_eq!(engine.state(), &before);
        assert!(!engine.state_path().exists());
    }

    #[test]
    fn test_drawdown_switches_to_conservative() {
        let dir = tempfile::tempdir().unwrap();
        let path = [0.10, -0.05, -0.20, 0.05, 0.0];
        seed_ledger(
            dir.path(),
            path.iter().map(|r| settled("AAA", Decision::Hold, *r)).collect(),
        );

        let mut engine = StrategyEngine::open(pipeline(&[]), dir.path()).unwrap();
        assert_eq!(engine.thresholds(), Thresholds::NORMAL);
        let record = engine.self_improve().unwrap().unwrap();

        assert!((record.mdd - 0.24).abs() < 1e-12);
        assert!(record.mdd >= MDD_LIMIT);
        assert!(engine.state().conservative_mode());
        assert_eq!(engine.thresholds(), Thresholds::CONSERVATIVE);
        // all HOLD: accuracy 0 shrinks the weights
        assert!(engine.state().feature_weights.values().all(|w| (*w - 0.9).abs() < 1e-12));
    }

    #[test]
    fn test_select_feature_columns_fallback() {
        let rows = random_walk(10, 1)
            .iter()
            .map(FeatureRow::from_price)
            .collect::<Vec<_>>();

        // MA ratios are undefined on a bare table
        let active = [Feature::Ma20Ratio, Feature::Ma60Ratio, Feature::Rsi14];
        let columns = select_feature_columns(&active, &rows);
        assert!(columns.contains(&Feature::Rsi14));
        assert!(!columns.contains(&Feature::Ma20Ratio));
        assert!(columns.len() >= 3);

        let active = [Feature::Rsi14, Feature::RoeZ, Feature::SentimentScore];
        assert_eq!(select_feature_columns(&active, &rows), active.to_vec());
    }

    #[tokio::test]
    async fn test_record_and_settle_trade() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StrategyEngine::open(pipeline(&[("GOOD", random_walk(400, 11))]), dir.path()).unwrap();
        let result = engine.analyze("GOOD", "", 2).await.unwrap();

        engine.record_trade(&result, None).unwrap();
        assert_eq!(engine.ledger().len(), 1);
        assert!(engine.ledger().completed().is_empty());

        let settled = engine.settle_trade("GOOD", 0.012).unwrap();
        assert_eq!(settled.decision, result.decision);
        assert_eq!(TradeLedger::open(dir.path().join(LEDGER_FILE)).unwrap().completed().len(), 1);
    }
}
