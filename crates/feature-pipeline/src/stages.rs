//! Pure transformation stages of the feature pipeline.
//!
//! Stages run in order: [`preprocess`], [`compute_technicals`],
//! [`add_fundamental_features`], [`add_sentiment_features`],
//! [`add_combo_features`], [`create_labels`].

use analysis_core::stats::quantile;
use analysis_core::{FeatureRow, Fundamentals, PriceRow, SentimentSnapshot};
use technical_analysis::{pct_change, rolling_mean, rsi};

/// Lower/upper close percentiles used as the outlier fence base
const FENCE_LOW_Q: f64 = 0.01;
const FENCE_HIGH_Q: f64 = 0.99;
const FENCE_K: f64 = 1.5;

const MA_SHORT: usize = 20;
const MA_LONG: usize = 60;
const RSI_PERIOD: usize = 14;
const VOLUME_WINDOW: usize = 20;

const ROE_CAP: f64 = 30.0;
const PER_CAP: f64 = 50.0;
const NEUTRAL_Z: f64 = 0.5;

/// Drops incomplete rows, then rows whose close lies outside
/// `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]` with Q1/Q3 taken at the 1st/99th percentile.
pub fn preprocess(rows: &[PriceRow]) -> Vec<PriceRow> {
    let complete: Vec<PriceRow> = rows.iter().copied().filter(PriceRow::is_complete).collect();

    let closes: Vec<f64> = complete.iter().map(|r| r.close).collect();
    let (Some(q1), Some(q3)) = (quantile(&closes, FENCE_LOW_Q), quantile(&closes, FENCE_HIGH_Q)) else {
        return complete;
    };
    let iqr = q3 - q1;
    let (low, high) = (q1 - FENCE_K * iqr, q3 + FENCE_K * iqr);

    let kept: Vec<PriceRow> = complete
        .into_iter()
        .filter(|r| r.close >= low && r.close <= high)
        .collect();
    if kept.len() < rows.len() {
        tracing::debug!("Preprocess dropped {} of {} rows", rows.len() - kept.len(), rows.len());
    }
    kept
}

/// Returns, moving-average ratios, RSI(14) and volume ratio, all from rows `<= t`.
pub fn compute_technicals(rows: &[PriceRow]) -> Vec<FeatureRow> {
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<f64> = rows.iter().map(|r| r.volume).collect();

    let return_1d = pct_change(&closes, 1);
    let return_5d = pct_change(&closes, 5);
    let ma20 = rolling_mean(&closes, MA_SHORT);
    let ma60 = rolling_mean(&closes, MA_LONG);
    let rsi14 = rsi(&closes, RSI_PERIOD);
    let volume_ma = rolling_mean(&volumes, VOLUME_WINDOW);

    let ratio = |num: f64, den: Option<f64>| den.filter(|d| *d != 0.0).map(|d| num / d);

    rows.iter()
        .enumerate()
        .map(|(t, price)| {
            let mut row = FeatureRow::from_price(price);
            row.return_1d = return_1d[t];
            row.return_5d = return_5d[t];
            row.ma20 = ma20[t];
            row.ma60 = ma60[t];
            row.ma20_ratio = ratio(price.close, ma20[t]);
            row.ma60_ratio = ratio(price.close, ma60[t]);
            row.rsi14 = rsi14[t];
            row.volume_ratio = ratio(price.volume, volume_ma[t]);
            row
        })
        .collect()
}

/// Maps fundamentals onto [0, 1]. Growth and leverage data are not available
/// point-in-time, so PER stands in for operating-income quality and the other
/// two scores stay neutral.
pub fn add_fundamental_features(rows: &mut [FeatureRow], fundamentals: &Fundamentals) {
    let roe = fundamentals.roe.unwrap_or(0.0);
    let roe_z = roe.clamp(0.0, ROE_CAP) / ROE_CAP;

    let per = fundamentals.per.unwrap_or(0.0);
    let op_income_growth_z = if per > 0.0 {
        per.min(PER_CAP) / PER_CAP
    } else {
        NEUTRAL_Z
    };

    for row in rows.iter_mut() {
        row.roe_z = roe_z;
        row.op_income_growth_z = op_income_growth_z;
        row.revenue_growth_z = NEUTRAL_Z;
        row.debt_ratio_z = NEUTRAL_Z;
    }
}

/// Broadcasts the run's sentiment snapshot onto every row.
pub fn add_sentiment_features(rows: &mut [FeatureRow], snapshot: &SentimentSnapshot) {
    for row in rows.iter_mut() {
        row.sentiment_score = snapshot.sentiment_score;
        row.positive_ratio = snapshot.positive_ratio;
        row.negative_surge = f64::from(snapshot.negative_surge);
    }
}

/// Combination features are always computed; whether they are trained on is
/// decided by the active feature set.
pub fn add_combo_features(rows: &mut [FeatureRow]) {
    for row in rows.iter_mut() {
        row.ma20_sent_combo = row.ma20_ratio.map(|r| r * row.sentiment_score);
    }
}

/// `label[t] = close[t+1] > close[t]`. The last row has no label.
pub fn create_labels(rows: &mut [FeatureRow]) {
    let n = rows.len();
    for t in 0..n {
        if t + 1 < n && rows[t].close != 0.0 {
            let next_return = rows[t + 1].close / rows[t].close - 1.0;
            rows[t].next_return = Some(next_return);
            rows[t].label = Some(next_return > 0.0);
        } else {
            rows[t].next_return = None;
            rows[t].label = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn price_rows(closes: &[f64]) -> Vec<PriceRow> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceRow {
                date: start + Duration::days(i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: 1000.0 + (i % 7) as f64 * 100.0,
            })
            .collect()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05)
            .collect()
    }

    #[test]
    fn test_preprocess_drops_incomplete_and_extreme_rows() {
        let mut closes = vec![100.0; 200];
        closes[50] = 5000.0;
        let mut rows = price_rows(&closes);
        rows[10].open = f64::NAN;

        let cleaned = preprocess(&rows);
        assert_eq!(cleaned.len(), 198);
        assert!(cleaned.iter().all(|r| r.close == 100.0));
    }

    #[test]
    fn test_preprocess_keeps_normal_volatility() {
        let rows = price_rows(&wave(300));
        assert_eq!(preprocess(&rows).len(), 300);
    }

    #[test]
    fn test_technicals_warm_up_windows() {
        let rows = compute_technicals(&price_rows(&wave(80)));

        assert!(rows[0].return_1d.is_none());
        assert!(rows[1].return_1d.is_some());
        assert!(rows[4].return_5d.is_none());
        assert!(rows[5].return_5d.is_some());
        assert!(rows[18].ma20_ratio.is_none());
        assert!(rows[19].ma20_ratio.is_some());
        assert!(rows[58].ma60_ratio.is_none());
        assert!(rows[59].ma60_ratio.is_some());
        assert!(rows[19].volume_ratio.is_some());
        assert_eq!(rows[0].rsi14, 50.0);
    }

    #[test]
    fn test_technicals_have_no_look_ahead() {
        let prices = price_rows(&wave(120));
        let full = compute_technicals(&prices);

        for cut in [1, 20, 61, 100] {
            let truncated = compute_technicals(&prices[..cut]);
            assert_eq!(&truncated[..], &full[..cut]);
        }
    }

    #[test]
    fn test_fundamental_scaling() {
        let mut rows = compute_technicals(&price_rows(&wave(5)));

        let f = Fundamentals {
            per: Some(25.0),
            roe: Some(45.0),
            ..Default::default()
        };
        add_fundamental_features(&mut rows, &f);
        assert_eq!(rows[0].roe_z, 1.0);
        assert_eq!(rows[0].op_income_growth_z, 0.5);
        assert_eq!(rows[0].revenue_growth_z, 0.5);
        assert_eq!(rows[0].debt_ratio_z, 0.5);

        add_fundamental_features(&mut rows, &Fundamentals::default());
        assert_eq!(rows[4].roe_z, 0.0);
        assert_eq!(rows[4].op_income_growth_z, 0.5);

        let negative_per = Fundamentals {
            per: Some(-3.0),
            roe: Some(6.0),
            ..Default::default()
        };
        add_fundamental_features(&mut rows, &negative_per);
        assert!((rows[2].roe_z - 0.2).abs() < 1e-12);
        assert_eq!(rows[2].op_income_growth_z, 0.5);
    }

    #[test]
    fn test_sentiment_broadcast_and_combo() {
        let mut rows = compute_technicals(&price_rows(&wave(30)));
        let snap = SentimentSnapshot {
            sentiment_score: -0.4,
            positive_ratio: 0.25,
            negative_surge: 1,
        };
        add_sentiment_features(&mut rows, &snap);
        add_combo_features(&mut rows);

        assert!(rows.iter().all(|r| r.sentiment_score == -0.4 && r.negative_surge == 1.0));
        assert!(rows[0].ma20_sent_combo.is_none());
        let expected = rows[25].ma20_ratio.unwrap() * -0.4;
        assert!((rows[25].ma20_sent_combo.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_labels_shifted_and_last_row_null() {
        let mut rows = compute_technicals(&price_rows(&[10.0, 11.0, 11.0, 9.0]));
        create_labels(&mut rows);

        assert_eq!(rows[0].label, Some(true));
        assert!((rows[0].next_return.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(rows[1].label, Some(false)); // unchanged close is not "up"
        assert_eq!(rows[2].label, Some(false));
        assert_eq!(rows[3].label, None);
        assert_eq!(rows[3].next_return, None);
    }
}
