use super::tree::{RegressionTree, TreeParams, TreeTargets};
use super::{check_inputs, sigmoid, Classifier, TrainingData};
use analysis_core::SignalError;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingConfig {
    pub n_rounds: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample: f64,
    pub min_samples_leaf: usize,
    pub lambda: f64,
    /// Rounds without validation improvement before stopping
    pub early_stopping: usize,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_rounds: 200,
            max_depth: 3,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample: 0.8,
            min_samples_leaf: 5,
            lambda: 1.0,
            early_stopping: 20,
            seed: 42,
        }
    }
}

/// Gradient-boosted trees on the logistic loss with Newton leaf values.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    config: BoostingConfig,
    base_score: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            base_score: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn raw_score(&self, row: &[f64]) -> f64 {
        self.base_score
            + self.config.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    fn log_loss(y: &[bool], raw: &[f64]) -> f64 {
        let eps = 1e-15;
        let total: f64 = y
            .iter()
            .zip(raw)
            .map(|(&label, &f)| {
                let p = sigmoid(f).clamp(eps, 1.0 - eps);
                if label {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            })
            .sum();
        total / y.len().max(1) as f64
    }
}

impl Default for GradientBoosting {
    fn default() -> Self {
        Self::new(BoostingConfig::default())
    }
}

impl Classifier for GradientBoosting {
    fn fit(&mut self, data: &TrainingData<'_>) -> Result<(), SignalError> {
        let (n, n_features) = check_inputs(data)?;
        let cfg = self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let target: Vec<f64> = data.y.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let w_sum: f64 = data.weights.iter().sum();
        let prior = (target.iter().zip(data.weights).map(|(t, w)| t * w).sum::<f64>() / w_sum).clamp(1e-6, 1.0 - 1e-6);
        self.base_score = (prior / (1.0 - prior)).ln();
        self.trees.clear();

        let mut train_raw = vec![self.base_score; n];
        let validation = data.validation.filter(|(vx, vy)| !vx.is_empty() && vx.len() == vy.len());
        let mut val_raw: Vec<f64> = validation.map_or_else(Vec::new, |(vx, _)| vec![self.base_score; vx.len()]);

        let rows_per_round = ((n as f64 * cfg.subsample).round() as usize).clamp(1, n);
        let cols_per_tree = ((n_features as f64 * cfg.colsample).ceil() as usize).clamp(1, n_features);
        let params = TreeParams {
            max_depth: cfg.max_depth,
            min_samples_leaf: cfg.min_samples_leaf,
            max_features: None,
            lambda: cfg.lambda,
        };

        let mut best_loss = f64::INFINITY;
        let mut best_rounds = 0;

        for round in 0..cfg.n_rounds {
            let grad: Vec<f64> = target.iter().zip(&train_raw).map(|(t, f)| t - sigmoid(*f)).collect();
            let hess: Vec<f64> = train_raw
                .iter()
                .map(|f| {
                    let p = sigmoid(*f);
                    p * (1.0 - p)
                })
                .collect();
            let targets = TreeTargets {
                grad: &grad,
                hess: &hess,
                weights: data.weights,
            };

            let rows = index::sample(&mut rng, n, rows_per_round).into_vec();
            let cols = index::sample(&mut rng, n_features, cols_per_tree).into_vec();
            let tree = RegressionTree::fit(data.x, &rows, &targets, &cols, params, &mut rng);

            for (f, row) in train_raw.iter_mut().zip(data.x) {
                *f += cfg.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);

            let Some((vx, vy)) = validation else {
                continue;
            };
            if let Some(tree) = self.trees.last() {
                for (f, row) in val_raw.iter_mut().zip(vx) {
                    *f += cfg.learning_rate * tree.predict(row);
                }
            }
            let loss = Self::log_loss(vy, &val_raw);
            if !loss.is_finite() {
                return Err(SignalError::ModelTrainingFailure(format!(
                    "gradient boosting: validation loss diverged at round {round}"
                )));
            }
            if loss < best_loss {
                best_loss = loss;
                best_rounds = self.trees.len();
            } else if self.trees.len() - best_rounds >= cfg.early_stopping {
                tracing::debug!("Gradient boosting stopped early at round {}, best {}", round, best_rounds);
                break;
            }
        }

        if validation.is_some() {
            self.trees.truncate(best_rounds);
        }
        tracing::debug!("Gradient boosting fitted: {} trees on {} rows", self.trees.len(), n);
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.raw_score(row))
    }
}
