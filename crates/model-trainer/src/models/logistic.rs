use super::{check_inputs, sigmoid, Classifier, TrainingData};
use analysis_core::SignalError;

/// L2-regularised logistic regression fit by full-batch gradient descent on
/// the sample-weighted log-loss.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Inverse regularisation strength
    c: f64,
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    coefficients: Vec<f64>,
    intercept: f64,
    pub cost_history: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LogisticRegression {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-6,
            coefficients: Vec::new(),
            intercept: 0.0,
            cost_history: Vec::new(),
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    fn linear(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, v)| b * v)
                .sum::<f64>()
    }

    fn weighted_log_loss(y: &[bool], p: &[f64], w: &[f64]) -> f64 {
        let eps = 1e-15;
        let n = y.len() as f64;
        -y.iter()
            .zip(p)
            .zip(w)
            .map(|((&label, &prob), &weight)| {
                let prob = prob.clamp(eps, 1.0 - eps);
                weight * if label { prob.ln() } else { (1.0 - prob).ln() }
            })
            .sum::<f64>()
            / n
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, data: &TrainingData<'_>) -> Result<(), SignalError> {
        if self.c <= 0.0 {
            return Err(SignalError::ModelTrainingFailure(format!(
                "logistic regression: C must be positive, got {}",
                self.c
            )));
        }
        let (n, n_features) = check_inputs(data)?;
        let n_f = n as f64;
        let alpha = 1.0 / (self.c * n_f);

        self.coefficients = vec![0.0; n_features];
        self.intercept = 0.0;
        self.cost_history.clear();

        for iter in 0..self.max_iter {
            let predictions: Vec<f64> = data.x.iter().map(|row| sigmoid(self.linear(row))).collect();

            let mut dw = vec![0.0; n_features];
            let mut db = 0.0;
            for ((row, &p), (&label, &w)) in data.x.iter().zip(&predictions).zip(data.y.iter().zip(data.weights)) {
                let err = w * (p - if label { 1.0 } else { 0.0 });
                for (d, v) in dw.iter_mut().zip(row) {
                    *d += err * v;
                }
                db += err;
            }

            let penalty: f64 = self.coefficients.iter().map(|b| b * b).sum::<f64>() * alpha / 2.0;
            for (b, d) in self.coefficients.iter_mut().zip(&dw) {
                *b -= self.learning_rate * (d / n_f + alpha * *b);
            }
            self.intercept -= self.learning_rate * db / n_f;

            let cost = Self::weighted_log_loss(data.y, &predictions, data.weights) + penalty;
            if !cost.is_finite() {
                return Err(SignalError::ModelTrainingFailure(format!(
                    "logistic regression diverged at iteration {iter}"
                )));
            }
            self.cost_history.push(cost);

            if iter > 0 && (self.cost_history[iter - 1] - cost).abs() < self.tolerance {
                tracing::debug!("Logistic regression converged at iteration {}", iter);
                break;
            }
        }

        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.linear(row))
    }
}
