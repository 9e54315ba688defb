//! Persisted self-evolution state and the pure steps that update it.

use crate::ledger::TradeLedgerEntry;
use analysis_core::stats::round_to;
use analysis_core::{Decision, Feature};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Drawdown at or above which the engine turns conservative
pub const MDD_LIMIT: f64 = 0.15;
/// Features below this weight are deactivated
pub const WEIGHT_FLOOR: f64 = 0.30;
/// The active set never shrinks below this many features
pub const MIN_ACTIVE_FEATURES: usize = 3;
/// Completed trades required before an evolution step runs
pub const MIN_COMPLETED_TRADES: usize = 5;

const REWARD_ACCURACY: f64 = 0.60;
const PENALTY_ACCURACY: f64 = 0.40;
const COMBO_ACCURACY: f64 = 0.55;
const REWARD_SCALE: f64 = 1.10;
const PENALTY_SCALE: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MddTracker {
    pub peak: f64,
    pub current: f64,
    pub max_drawdown: f64,
    pub conservative_mode: bool,
}

impl Default for MddTracker {
    fn default() -> Self {
        Self {
            peak: 1.0,
            current: 1.0,
            max_drawdown: 0.0,
            conservative_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    #[serde(alias = "gen")]
    pub generation: u64,
    pub accuracy: f64,
    pub mdd: f64,
    pub n_trades: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionState {
    pub generation: u64,
    pub feature_weights: BTreeMap<Feature, f64>,
    pub active_features: Vec<Feature>,
    pub mdd_tracker: MddTracker,
    #[serde(default)]
    pub performance_history: Vec<PerformanceRecord>,
    pub last_updated: DateTime<Utc>,
}

impl Default for EvolutionState {
    fn default() -> Self {
        Self::initial(Utc::now())
    }
}

impl EvolutionState {
    /// Generation 0: every weight 1.0, base features active, normal mode.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            generation: 0,
            feature_weights: Feature::ALL.iter().map(|f| (*f, 1.0)).collect(),
            active_features: Feature::BASE.to_vec(),
            mdd_tracker: MddTracker::default(),
            performance_history: Vec::new(),
            last_updated: now,
        }
    }

    pub fn conservative_mode(&self) -> bool {
        self.mdd_tracker.conservative_mode
    }

    pub fn weight(&self, feature: Feature) -> f64 {
        self.feature_weights.get(&feature).copied().unwrap_or(1.0)
    }

    /// One evolution step over the completed ledger entries.
    ///
    /// Returns `None` without touching the state when fewer than
    /// [`MIN_COMPLETED_TRADES`] entries are given.
    pub fn evolve(&mut self, completed: &[&TradeLedgerEntry], now: DateTime<Utc>) -> Option<PerformanceRecord> {
        if completed.len() < MIN_COMPLETED_TRADES {
            return None;
        }

        let returns: Vec<f64> = completed.iter().filter_map(|t| t.actual_return).collect();
        let tracker = drawdown(&returns);
        self.mdd_tracker = MddTracker {
            peak: round_to(tracker.peak, 6),
            current: round_to(tracker.current, 6),
            max_drawdown: round_to(tracker.max_drawdown, 4),
            conservative_mode: tracker.conservative_mode,
        };
        tracing::info!(
            mdd = tracker.max_drawdown,
            conservative = tracker.conservative_mode,
            "Evolution: MDD {:.2}%",
            tracker.max_drawdown * 100.0
        );

        let accuracy = decision_accuracy(completed);
        tracing::info!(accuracy, trades = completed.len(), "Evolution: accuracy {:.2}%", accuracy * 100.0);

        let scale = weight_scale(accuracy);
        for w in self.feature_weights.values_mut() {
            *w = round_to(*w * scale, 3);
        }

        let promoted: Vec<Feature> = self.active_features.iter().copied().filter(Feature::is_combo).collect();
        let mut active = derive_active_features(&self.feature_weights, &promoted);
        if accuracy > COMBO_ACCURACY {
            for combo in Feature::COMBO {
                if !active.contains(&combo) {
                    tracing::info!("Evolution: activating combination feature {}", combo);
                    active.push(combo);
                }
            }
        }
        self.active_features = active;

        self.generation += 1;
        let record = PerformanceRecord {
            generation: self.generation,
            accuracy: round_to(accuracy, 4),
            mdd: round_to(tracker.max_drawdown, 4),
            n_trades: completed.len(),
            timestamp: now,
        };
        self.performance_history.push(record.clone());
        self.last_updated = now;

        tracing::info!(
            generation = self.generation,
            "Evolution: generation {} complete, active features: {}",
            self.generation,
            self.active_features.iter().map(Feature::as_str).collect::<Vec<_>>().join(", ")
        );
        Some(record)
    }
}

/// Compounds returns from 1.0 and tracks the running peak.
pub fn drawdown(returns: &[f64]) -> MddTracker {
    let mut tracker = MddTracker::default();
    for r in returns {
        tracker.current *= 1.0 + r;
        tracker.peak = tracker.peak.max(tracker.current);
        if tracker.peak > 0.0 {
            tracker.max_drawdown = tracker.max_drawdown.max((tracker.peak - tracker.current) / tracker.peak);
        }
    }
    tracker.conservative_mode = tracker.max_drawdown >= MDD_LIMIT;
    tracker
}

/// Share of completed trades whose direction was right. HOLD never counts as
/// correct but stays in the denominator.
pub fn decision_accuracy(completed: &[&TradeLedgerEntry]) -> f64 {
    if completed.is_empty() {
        return 0.0;
    }
    let correct = completed
        .iter()
        .filter(|t| match (t.decision, t.actual_return) {
            (Decision::Buy, Some(r)) => r > 0.0,
            (Decision::Sell, Some(r)) => r < 0.0,
            _ => false,
        })
        .count();
    correct as f64 / completed.len() as f64
}

pub fn weight_scale(accuracy: f64) -> f64 {
    if accuracy > REWARD_ACCURACY {
        REWARD_SCALE
    } else if accuracy < PENALTY_ACCURACY {
        PENALTY_SCALE
    } else {
        1.0
    }
}

/// Active set as a pure function of the weights: base features plus already
/// promoted combination features whose weight clears [`WEIGHT_FLOOR`]. Falls
/// back to the [`MIN_ACTIVE_FEATURES`] heaviest candidates, ties broken by
/// declaration order. Output is in declaration order.
pub fn derive_active_features(weights: &BTreeMap<Feature, f64>, promoted: &[Feature]) -> Vec<Feature> {
    let weight = |f: &Feature| weights.get(f).copied().unwrap_or(1.0);
    let candidates: Vec<Feature> = Feature::ALL
        .iter()
        .copied()
        .filter(|f| !f.is_combo() || promoted.contains(f))
        .collect();

    let mut active: Vec<Feature> = candidates.iter().copied().filter(|f| weight(f) >= WEIGHT_FLOOR).collect();
    if active.len() < MIN_ACTIVE_FEATURES {
        let mut ranked = candidates;
        ranked.sort_by(|a, b| {
            weight(b)
                .total_cmp(&weight(a))
                .then(a.declaration_index().cmp(&b.declaration_index()))
        });
        active = ranked.into_iter().take(MIN_ACTIVE_FEATURES).collect();
        active.sort_by_key(Feature::declaration_index);
    }
    active
}
