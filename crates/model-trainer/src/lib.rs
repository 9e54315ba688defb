//! Per-run model fitting: chronological split, recency weights, candidate
//! classifiers and validation-based selection.

pub mod metrics;
pub mod models;
pub mod scaler;
pub mod split;
pub mod trainer;

pub use metrics::{roc_auc, ClassificationMetrics};
pub use models::{Classifier, Model, TrainingData};
pub use scaler::StandardScaler;
pub use split::{sample_weights, time_series_split, ChronoSplit, Dataset, DEFAULT_DECAY};
pub use trainer::{ModelTrainer, TrainingReport, MIN_TRAIN_ROWS};
