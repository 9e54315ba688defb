use analysis_core::stats::round_to;
use serde::{Deserialize, Serialize};

/// Probability at or above which a row is predicted "up"
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Validation scores of one candidate, rounded to 4 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub roc_auc: f64,
    pub precision: f64,
    pub recall: f64,
}

impl ClassificationMetrics {
    pub fn evaluate(y_true: &[bool], y_proba: &[f64]) -> Self {
        Self {
            roc_auc: round_to(roc_auc(y_true, y_proba), 4),
            precision: round_to(precision(y_true, y_proba), 4),
            recall: round_to(recall(y_true, y_proba), 4),
        }
    }
}

/// Area under the ROC curve by the trapezoid rule, grouping tied scores.
/// Returns 0.5 when only one class is present.
pub fn roc_auc(y_true: &[bool], y_proba: &[f64]) -> f64 {
    let mut pairs: Vec<(f64, bool)> = y_proba.iter().copied().zip(y_true.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let n_pos = pairs.iter().filter(|(_, t)| *t).count() as f64;
    let n_neg = pairs.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return 0.5;
    }

    let (mut tp, mut fp) = (0.0, 0.0);
    let (mut tpr_prev, mut fpr_prev) = (0.0, 0.0);
    let mut auc = 0.0;

    let mut i = 0;
    while i < pairs.len() {
        let score = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == score {
            if pairs[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }

        let tpr = tp / n_pos;
        let fpr = fp / n_neg;
        auc += (fpr - fpr_prev) * (tpr + tpr_prev) / 2.0;
        tpr_prev = tpr;
        fpr_prev = fpr;
    }

    auc
}

fn confusion(y_true: &[bool], y_proba: &[f64]) -> (f64, f64, f64) {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut fn_ = 0.0;
    for (&truth, &p) in y_true.iter().zip(y_proba) {
        match (p >= DECISION_THRESHOLD, truth) {
            (true, true) => tp += 1.0,
            (true, false) => fp += 1.0,
            (false, true) => fn_ += 1.0,
            (false, false) => {}
        }
    }
    (tp, fp, fn_)
}

/// 0 when nothing is predicted up.
pub fn precision(y_true: &[bool], y_proba: &[f64]) -> f64 {
    let (tp, fp, _) = confusion(y_true, y_proba);
    if tp + fp == 0.0 {
        0.0
    } else {
        tp / (tp + fp)
    }
}

/// 0 when there are no up rows.
pub fn recall(y_true: &[bool], y_proba: &[f64]) -> f64 {
    let (tp, _, fn_) = confusion(y_true, y_proba);
    if tp + fn_ == 0.0 {
        0.0
    } else {
        tp / (tp + fn_)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = [false, false, true, true];
        assert!((roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]) - 1.0).abs() < 1e-12);
        assert!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]).abs() < 1e-12);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let y = [false, true];
        assert!((roc_auc(&y, &[0.5, 0.5]) - 0.5).abs() < 1e-12);

        // one positive ranked above both negatives, one tied with a negative
        let y = [true, true, false, false];
        let p = [0.9, 0.4, 0.4, 0.1];
        assert!((roc_auc(&y, &p) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class_is_neutral() {
        assert_eq!(roc_auc(&[true, true], &[0.2, 0.9]), 0.5);
        assert_eq!(roc_auc(&[], &[]), 0.5);
    }

    #[test]
    fn test_precision_recall() {
        let y = [true, false, true, false];
        let p = [0.7, 0.6, 0.3, 0.2];
        assert!((precision(&y, &p) - 0.5).abs() < 1e-12);
        assert!((recall(&y, &p) - 0.5).abs() < 1e-12);

        assert_eq!(precision(&y, &[0.1; 4]), 0.0);
        assert_eq!(recall(&[false, false], &[0.9, 0.9]), 0.0);
    }

    #[test]
    fn test_metrics_are_rounded() {
        let y = [true, false, false];
        let m = ClassificationMetrics::evaluate(&y, &[0.9, 0.6, 0.1]);
        assert_eq!(m.precision, 0.5);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.roc_auc, 1.0);
    }
}
