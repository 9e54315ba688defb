use analysis_core::{Feature, FeatureRow};
use chrono::NaiveDate;

/// Recency decay per row used by [`sample_weights`]
pub const DEFAULT_DECAY: f64 = 0.005;

const TRAIN_SHARE: f64 = 0.6;
const VALIDATION_SHARE: f64 = 0.8;

/// One contiguous block of labelled rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub dates: Vec<NaiveDate>,
    pub x: Vec<Vec<f64>>,
    pub y: Vec<bool>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Number of distinct label values present (0, 1 or 2).
    pub fn classes(&self) -> usize {
        let ups = self.y.iter().any(|&l| l);
        let downs = self.y.iter().any(|&l| !l);
        usize::from(ups) + usize::from(downs)
    }

    fn push(&mut self, date: NaiveDate, features: Vec<f64>, label: bool) {
        self.dates.push(date);
        self.x.push(features);
        self.y.push(label);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChronoSplit {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

impl ChronoSplit {
    pub fn total_rows(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Drops unlabelled rows and rows missing any of `columns`, then cuts the
/// remainder, in order, into 60% train / 20% validation / 20% test.
pub fn time_series_split(rows: &[FeatureRow], columns: &[Feature]) -> ChronoSplit {
    let usable: Vec<(NaiveDate, Vec<f64>, bool)> = rows
        .iter()
        .filter_map(|row| {
            let label = row.label?;
            let features = row.feature_vector(columns)?;
            Some((row.date, features, label))
        })
        .collect();

    let n = usable.len();
    let t1 = (n as f64 * TRAIN_SHARE).floor() as usize;
    let t2 = (n as f64 * VALIDATION_SHARE).floor() as usize;

    let mut split = ChronoSplit::default();
    for (i, (date, features, label)) in usable.into_iter().enumerate() {
        let block = if i < t1 {
            &mut split.train
        } else if i < t2 {
            &mut split.validation
        } else {
            &mut split.test
        };
        block.push(date, features, label);
    }

    tracing::debug!(
        "Split {} rows: train={} validation={} test={}",
        n,
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );
    split
}

/// `w[i] = exp(decay * i)` rescaled to sum to `n`; index 0 is the oldest row.
pub fn sample_weights(n: usize, decay: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let raw: Vec<f64> = (0..n).map(|i| (decay * i as f64).exp()).collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w * n as f64 / total).collect()
}
