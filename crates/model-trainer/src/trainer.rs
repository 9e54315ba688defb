use crate::metrics::ClassificationMetrics;
use crate::models::{Classifier, Model, TrainingData};
use crate::scaler::StandardScaler;
use crate::split::{sample_weights, time_series_split, ChronoSplit, Dataset, DEFAULT_DECAY};
use analysis_core::{Feature, FeatureRow, SignalError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Minimum training rows before any model is fitted
pub const MIN_TRAIN_ROWS: usize = 120;

/// Outcome of one `train_and_select` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub selected_model: String,
    /// Validation metrics of every candidate that trained successfully
    pub metrics: BTreeMap<String, ClassificationMetrics>,
}

impl TrainingReport {
    pub fn selected_metrics(&self) -> Option<&ClassificationMetrics> {
        self.metrics.get(&self.selected_model)
    }
}

/// Fits the candidate models for one analysis and keeps the best one.
///
/// A trainer lives for a single `analyze()` call: scaler and model are fitted
/// from scratch and never persisted.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    decay: f64,
    min_train_rows: usize,
    scaler: Option<StandardScaler>,
    selected: Option<Model>,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelTrainer {
    pub fn new() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            min_train_rows: MIN_TRAIN_ROWS,
            scaler: None,
            selected: None,
        }
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn time_series_split(&self, rows: &[FeatureRow], columns: &[Feature]) -> ChronoSplit {
        time_series_split(rows, columns)
    }

    pub fn selected_model(&self) -> Option<&'static str> {
        self.selected.as_ref().map(Model::name)
    }

    pub fn train_and_select(&mut self, train: &Dataset, validation: &Dataset) -> Result<TrainingReport, SignalError> {
        let classes = train.classes();
        if train.len() < self.min_train_rows || classes < 2 {
            return Err(SignalError::InsufficientTrainingData {
                rows: train.len(),
                required: self.min_train_rows,
                classes,
            });
        }

        let scaler = StandardScaler::fit(&train.x);
        let x_train = scaler.transform(&train.x);
        let x_val = scaler.transform(&validation.x);
        let weights = sample_weights(train.len(), self.decay);
        let data = TrainingData::new(&x_train, &train.y, &weights).with_validation(&x_val, &validation.y);

        let mut best: Option<(Model, ClassificationMetrics)> = None;
        let mut metrics = BTreeMap::new();

        for mut model in Model::candidates() {
            let name = model.name();
            if let Err(e) = model.fit(&data) {
                tracing::error!("  {} training failed: {}", name, e);
                continue;
            }

            let proba: Vec<f64> = x_val.iter().map(|row| model.predict_proba(row)).collect();
            let m = ClassificationMetrics::evaluate(&validation.y, &proba);
            tracing::info!(
                "  {}: AUC={:.4} Prec={:.4} Rec={:.4}",
                name,
                m.roc_auc,
                m.precision,
                m.recall
            );
            metrics.insert(name.to_string(), m);

            if best.as_ref().map_or(true, |(_, b)| m.roc_auc > b.roc_auc) {
                best = Some((model, m));
            }
        }

        let Some((model, m)) = best else {
            return Err(SignalError::ModelTrainingFailure(
                "every candidate model failed to train".into(),
            ));
        };

        tracing::info!("  Selected model: {} (AUC={:.4})", model.name(), m.roc_auc);
        let report = TrainingReport {
            selected_model: model.name().to_string(),
            metrics,
        };
        self.scaler = Some(scaler);
        self.selected = Some(model);
        Ok(report)
    }

    /// P(next period up) for one raw, unscaled feature vector.
    pub fn predict_p_up(&self, features: &[f64]) -> Result<f64, SignalError> {
        let (Some(scaler), Some(model)) = (&self.scaler, &self.selected) else {
            return Err(SignalError::ModelNotTrained);
        };
        if features.len() != scaler.n_features() {
            return Err(SignalError::InvalidInput(format!(
                "expected {} features, got {}",
                scaler.n_features(),
                features.len()
            )));
        }
        Ok(model.predict_proba(&scaler.transform_row(features)))
    }

    /// Scores the selected model on held-out rows (normally the test block).
    pub fn evaluate(&self, data: &Dataset) -> Result<ClassificationMetrics, SignalError> {
        let proba = data
            .x
            .iter()
            .map(|row| self.predict_p_up(row))
            .collect::<Result<Vec<f64>, SignalError>>()?;
        Ok(ClassificationMetrics::evaluate(&data.y, &proba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn dataset(n: usize, offset: usize) -> Dataset {
        let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let mut d = Dataset::default();
        for i in offset..offset + n {
            let signal = ((i * 37) % 100) as f64 / 100.0;
            let noise = ((i * 13) % 17) as f64;
            d.dates.push(start + Duration::days(i as i64));
            d.x.push(vec![signal, noise, 1.0]);
            d.y.push(signal > 0.5);
        }
        d
    }

    #[test]
    fn test_train_and_select_reports_every_candidate() {
        let train = dataset(180, 0);
        let validation = dataset(60, 180);
        let mut trainer = ModelTrainer::new();

        let report = trainer.train_and_select(&train, &validation).unwrap();
        assert_eq!(report.metrics.len(), Model::candidates().len());
        assert!(report.metrics.contains_key("lr"));
        assert!(report.metrics.contains_key("rf"));
        assert_eq!(trainer.selected_model(), Some(report.selected_model.as_str()));

        let best = report.selected_metrics().unwrap().roc_auc;
        assert!(report.metrics.values().all(|m| m.roc_auc <= best));
        assert!(best > 0.9);

        let up = trainer.predict_p_up(&[0.95, 3.0, 1.0]).unwrap();
        let down = trainer.predict_p_up(&[0.05, 3.0, 1.0]).unwrap();
        assert!((0.0..=1.0).contains(&up) && (0.0..=1.0).contains(&down));
        assert!(up > down);
    }

    #[test]
    fn test_too_few_rows() {
        let mut trainer = ModelTrainer::new();
        let err = trainer.train_and_select(&dataset(119, 0), &dataset(40, 119)).unwrap_err();
        assert!(matches!(
            err,
            SignalError::InsufficientTrainingData { rows: 119, required: 120, .. }
        ));
    }

    #[test]
    fn test_single_class_labels() {
        let mut train = dataset(150, 0);
        train.y.iter_mut().for_each(|l| *l = true);
        let mut trainer = ModelTrainer::new();

        let err = trainer.train_and_select(&train, &dataset(40, 150)).unwrap_err();
        assert!(matches!(err, SignalError::InsufficientTrainingData { classes: 1, .. }));
    }

    #[test]
    fn test_single_class_validation_scores_half() {
        let train = dataset(150, 0);
        let mut validation = dataset(30, 150);
        validation.y.iter_mut().for_each(|l| *l = false);
        let mut trainer = ModelTrainer::new();

        let report = trainer.train_and_select(&train, &validation).unwrap();
        assert!(report.metrics.values().all(|m| m.roc_auc == 0.5));
        // ties keep the first candidate
        assert_eq!(report.selected_model, "lr");
    }

    #[test]
    fn test_predict_before_training() {
        let trainer = ModelTrainer::new();
        assert!(matches!(trainer.predict_p_up(&[0.1]), Err(SignalError::ModelNotTrained)));
    }

    #[test]
    fn test_predict_checks_width() {
        let mut trainer = ModelTrainer::new();
        trainer.train_and_select(&dataset(150, 0), &dataset(40, 150)).unwrap();
        assert_eq!(trainer.predict_p_up(&[0.5]).unwrap_err().kind(), "InvalidInput");
        assert!(trainer.evaluate(&dataset(40, 190)).unwrap().roc_auc > 0.5);
    }
}
