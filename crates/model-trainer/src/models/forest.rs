use super::tree::{RegressionTree, TreeParams, TreeTargets};
use super::{check_inputs, Classifier, TrainingData};
use analysis_core::SignalError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_leaf: 10,
            seed: 42,
        }
    }
}

/// Bagged classification trees; P(up) is the mean leaf positive fraction.
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, data: &TrainingData<'_>) -> Result<(), SignalError> {
        let (n, n_features) = check_inputs(data)?;

        let grad: Vec<f64> = data.y.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let hess = vec![1.0; n];
        let targets = TreeTargets {
            grad: &grad,
            hess: &hess,
            weights: data.weights,
        };
        let allowed: Vec<usize> = (0..n_features).collect();
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: Some(((n_features as f64).sqrt().ceil() as usize).max(1)),
            lambda: 0.0,
        };
        let config = self.config;

        self.trees = (0..config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(data.x, &bootstrap, &targets, &allowed, params, &mut rng)
            })
            .collect();

        tracing::debug!("Random forest fitted: {} trees on {} rows", self.trees.len(), n);
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        (total / self.trees.len() as f64).clamp(0.0, 1.0)
    }
}
