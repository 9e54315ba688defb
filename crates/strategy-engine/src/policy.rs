//! Expected return and the BUY/HOLD/SELL rules.

use analysis_core::stats::mean;
use analysis_core::{Decision, FeatureRow};
use serde::Serialize;

/// Rows looked back on for average gain/loss
pub const AVG_WINDOW: usize = 60;
/// Used for AvgGain/AvgLoss when the window has no such returns
pub const DEFAULT_AVG_MOVE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub sell_p_up: f64,
    pub buy_p_up: f64,
    pub buy_rsi_ceiling: f64,
    pub buy_sentiment_floor: f64,
}

impl Thresholds {
    pub const NORMAL: Thresholds = Thresholds {
        sell_p_up: 0.45,
        buy_p_up: 0.60,
        buy_rsi_ceiling: 70.0,
        buy_sentiment_floor: 0.0,
    };

    pub const CONSERVATIVE: Thresholds = Thresholds {
        sell_p_up: 0.50,
        buy_p_up: 0.65,
        buy_rsi_ceiling: 65.0,
        buy_sentiment_floor: 0.0,
    };

    pub fn for_mode(conservative: bool) -> Self {
        if conservative {
            Self::CONSERVATIVE
        } else {
            Self::NORMAL
        }
    }
}

/// Everything the decision rules look at for the latest row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub p_up: f64,
    pub expected_return: f64,
    pub rsi14: f64,
    pub sentiment_score: f64,
    pub negative_surge: bool,
}

/// SELL on risk first, BUY only when every condition holds, else HOLD.
pub fn decide(signals: &Signals, th: &Thresholds) -> Decision {
    if signals.p_up < th.sell_p_up || signals.negative_surge {
        return Decision::Sell;
    }

    if signals.p_up >= th.buy_p_up
        && signals.expected_return > 0.0
        && signals.rsi14 < th.buy_rsi_ceiling
        && signals.sentiment_score >= th.buy_sentiment_floor
    {
        return Decision::Buy;
    }

    Decision::Hold
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExpectedReturn {
    pub avg_gain: f64,
    pub avg_loss: f64,
    pub expected_return: f64,
}

/// `E[R] = p_up * AvgGain - (1 - p_up) * AvgLoss` over the given daily returns.
pub fn expected_return_from(returns: &[f64], p_up: f64) -> ExpectedReturn {
    let gains: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r <= 0.0).collect();

    let avg_gain = if gains.is_empty() { DEFAULT_AVG_MOVE } else { mean(&gains) };
    let avg_loss = if losses.is_empty() {
        DEFAULT_AVG_MOVE
    } else {
        mean(&losses).abs()
    };

    ExpectedReturn {
        avg_gain,
        avg_loss,
        expected_return: p_up * avg_gain - (1.0 - p_up) * avg_loss,
    }
}

/// Expected return from the day-over-day close changes inside the last
/// [`AVG_WINDOW`] rows.
pub fn expected_return(rows: &[FeatureRow], p_up: f64) -> ExpectedReturn {
    let window = &rows[rows.len().saturating_sub(AVG_WINDOW)..];
    let returns: Vec<f64> = window
        .windows(2)
        .filter(|pair| pair[0].close != 0.0)
        .map(|pair| pair[1].close / pair[0].close - 1.0)
        .collect();
    expected_return_from(&returns, p_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::PriceRow;
    use chrono::{Duration, NaiveDate};

    fn signals(p_up: f64) -> Signals {
        Signals {
            p_up,
            expected_return: 0.01,
            rsi14: 50.0,
            sentiment_score: 0.2,
            negative_surge: false,
        }
    }

    #[test]
    fn test_expected_return_formula() {
        let er = expected_return_from(&[0.02, -0.01], 0.7);
        assert!((er.avg_gain - 0.02).abs() < 1e-12);
        assert!((er.avg_loss - 0.01).abs() < 1e-12);
        assert!((er.expected_return - 0.011).abs() < 1e-12);
    }

    #[test]
    fn test_expected_return_defaults() {
        let er = expected_return_from(&[], 0.5);
        assert_eq!(er.avg_gain, DEFAULT_AVG_MOVE);
        assert_eq!(er.avg_loss, DEFAULT_AVG_MOVE);
        assert!(er.expected_return.abs() < 1e-15);

        // a flat day counts as a loss of zero
        let er = expected_return_from(&[0.0, 0.03], 0.5);
        assert_eq!(er.avg_loss, 0.0);
    }

    #[test]
    fn test_expected_return_uses_recent_window() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows: Vec<FeatureRow> = (0..100)
            .map(|i| {
                // early rows fall, the last 60 rise by 1% a day
                let close = if i < 40 { 100.0 - i as f64 } else { 60.0 * 1.01f64.powi(i - 39) };
                FeatureRow::from_price(&PriceRow {
                    date: start + Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                })
            })
            .collect();

        let er = expected_return(&rows, 0.6);
        assert!((er.avg_gain - 0.01).abs() < 1e-9);
        assert_eq!(er.avg_loss, DEFAULT_AVG_MOVE);
    }

    #[test]
    fn test_negative_surge_overrides_buy() {
        let mut s = signals(0.40);
        s.negative_surge = true;
        assert_eq!(decide(&s, &Thresholds::NORMAL), Decision::Sell);

        let mut s = signals(0.90);
        s.negative_surge = true;
        assert_eq!(decide(&s, &Thresholds::NORMAL), Decision::Sell);
    }

    #[test]
    fn test_buy_requires_every_condition() {
        assert_eq!(decide(&signals(0.62), &Thresholds::NORMAL), Decision::Buy);

        let mut s = signals(0.62);
        s.rsi14 = 72.0;
        assert_eq!(decide(&s, &Thresholds::NORMAL), Decision::Hold);

        let mut s = signals(0.62);
        s.expected_return = 0.0;
        assert_eq!(decide(&s, &Thresholds::NORMAL), Decision::Hold);

        let mut s = signals(0.62);
        s.sentiment_score = -0.1;
        assert_eq!(decide(&s, &Thresholds::NORMAL), Decision::Hold);
    }

    #[test]
    fn test_conservative_thresholds_are_stricter() {
        let th = Thresholds::for_mode(true);
        assert_eq!(decide(&signals(0.62), &th), Decision::Hold);
        assert_eq!(decide(&signals(0.47), &th), Decision::Sell);
        assert_eq!(decide(&signals(0.47), &Thresholds::for_mode(false)), Decision::Hold);

        let mut s = signals(0.70);
        s.rsi14 = 67.0;
        assert_eq!(decide(&s, &th), Decision::Hold);
        assert_eq!(decide(&s, &Thresholds::NORMAL), Decision::Buy);
    }
}
