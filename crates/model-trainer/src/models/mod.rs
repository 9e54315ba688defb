//! Candidate classifiers behind one fit/predict interface.

#[cfg(feature = "gradient-boosting")]
pub mod boosting;
pub mod forest;
pub mod logistic;
pub mod tree;

#[cfg(feature = "gradient-boosting")]
pub use boosting::{BoostingConfig, GradientBoosting};
pub use forest::{ForestConfig, RandomForest};
pub use logistic::LogisticRegression;

use analysis_core::SignalError;

/// Standardised training rows plus optional held-out rows for early stopping
#[derive(Debug, Clone, Copy)]
pub struct TrainingData<'a> {
    pub x: &'a [Vec<f64>],
    pub y: &'a [bool],
    pub weights: &'a [f64],
    pub validation: Option<(&'a [Vec<f64>], &'a [bool])>,
}

impl<'a> TrainingData<'a> {
    pub fn new(x: &'a [Vec<f64>], y: &'a [bool], weights: &'a [f64]) -> Self {
        Self {
            x,
            y,
            weights,
            validation: None,
        }
    }

    pub fn with_validation(mut self, x: &'a [Vec<f64>], y: &'a [bool]) -> Self {
        self.validation = Some((x, y));
        self
    }
}

pub trait Classifier: Send + Sync {
    fn fit(&mut self, data: &TrainingData<'_>) -> Result<(), SignalError>;

    /// P(label = up) for one standardised row.
    fn predict_proba(&self, row: &[f64]) -> f64;
}

/// The closed set of model variants the trainer compares
#[derive(Debug, Clone)]
pub enum Model {
    Logistic(LogisticRegression),
    Forest(RandomForest),
    #[cfg(feature = "gradient-boosting")]
    Boosting(GradientBoosting),
}

impl Model {
    /// Fresh, unfitted candidates in selection-priority order.
    pub fn candidates() -> Vec<Model> {
        let mut models = vec![
            Model::Logistic(LogisticRegression::default()),
            Model::Forest(RandomForest::default()),
        ];
        #[cfg(feature = "gradient-boosting")]
        models.push(Model::Boosting(GradientBoosting::default()));
        models
    }

    pub fn name(&self) -> &'static str {
        match self {
            Model::Logistic(_) => "lr",
            Model::Forest(_) => "rf",
            #[cfg(feature = "gradient-boosting")]
            Model::Boosting(_) => "gbm",
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Model::Logistic(m) => m,
            Model::Forest(m) => m,
            #[cfg(feature = "gradient-boosting")]
            Model::Boosting(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Model::Logistic(m) => m,
            Model::Forest(m) => m,
            #[cfg(feature = "gradient-boosting")]
            Model::Boosting(m) => m,
        }
    }
}

impl Classifier for Model {
    fn fit(&mut self, data: &TrainingData<'_>) -> Result<(), SignalError> {
        self.inner_mut().fit(data)
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        self.inner().predict_proba(row)
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Returns `(rows, features)` after checking shapes and values.
pub(crate) fn check_inputs(data: &TrainingData<'_>) -> Result<(usize, usize), SignalError> {
    let n = data.x.len();
    if n == 0 {
        return Err(SignalError::ModelTrainingFailure("no training rows".into()));
    }
    if data.y.len() != n || data.weights.len() != n {
        return Err(SignalError::ModelTrainingFailure(format!(
            "shape mismatch: {} rows, {} labels, {} weights",
            n,
            data.y.len(),
            data.weights.len()
        )));
    }

    let n_features = data.x[0].len();
    if n_features == 0 {
        return Err(SignalError::ModelTrainingFailure("no feature columns".into()));
    }
    if data.x.iter().any(|row| row.len() != n_features || row.iter().any(|v| !v.is_finite())) {
        return Err(SignalError::ModelTrainingFailure(
            "ragged or non-finite feature matrix".into(),
        ));
    }
    if data.weights.iter().any(|w| !w.is_finite() || *w < 0.0) || data.weights.iter().sum::<f64>() <= 0.0 {
        return Err(SignalError::ModelTrainingFailure("invalid sample weights".into()));
    }

    Ok((n, n_features))
}
