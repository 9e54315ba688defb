#[cfg(test)]
mod tests {
    use super::super::indicators::*;

    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    #[test]
    fn test_pct_change_basic() {
        let data = vec![100.0, 110.0, 99.0];
        let result = pct_change(&data, 1);

        assert_eq!(result[0], None);
        assert!((result[1].unwrap() - 0.10).abs() < 1e-12);
        assert!((result[2].unwrap() + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_pct_change_five_periods() {
        let prices = sample_prices();
        let result = pct_change(&prices, 5);

        assert!(result[..5].iter().all(|v| v.is_none()));
        let expected = 44.83 / 44.34 - 1.0;
        assert!((result[5].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_mean_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = rolling_mean(&data, 3);

        assert_eq!(result.len(), 5);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!((result[2].unwrap() - 2.0).abs() < 0.001);
        assert!((result[3].unwrap() - 3.0).abs() < 0.001);
        assert!((result[4].unwrap() - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_rolling_mean_insufficient_data() {
        let data = vec![1.0, 2.0];
        assert!(rolling_mean(&data, 5).iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_ewm_mean_recursion() {
        let data = vec![None, Some(1.0), Some(3.0)];
        let result = ewm_mean(&data, 0.5);

        assert_eq!(result[0], None);
        assert_eq!(result[1], Some(1.0));
        assert_eq!(result[2], Some(2.0));
    }

    #[test]
    fn test_alpha_from_com() {
        assert!((alpha_from_com(13.0) - 1.0 / 14.0).abs() < 1e-15);
    }

    #[test]
    fn test_rsi_bounds() {
        let prices = sample_prices();
        let result = rsi(&prices, 14);

        assert_eq!(result.len(), prices.len());
        assert_eq!(result[0], 50.0);
        for value in &result {
            assert!(*value >= 0.0 && *value <= 100.0);
        }
    }

    #[test]
    fn test_rsi_direction() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(*rsi(&rising, 14).last().unwrap(), 100.0);

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(*rsi(&falling, 14).last().unwrap() < 1.0);

        let flat = vec![100.0; 30];
        assert!(rsi(&flat, 14).iter().all(|v| *v == 50.0));
    }

    #[test]
    fn test_indicators_ignore_future_rows() {
        let prices = sample_prices();
        let full_rsi = rsi(&prices, 14);
        let full_ma = rolling_mean(&prices, 5);
        let full_ret = pct_change(&prices, 1);

        for cut in 1..prices.len() {
            let head = &prices[..cut];
            assert_eq!(&rsi(head, 14)[..], &full_rsi[..cut]);
            assert_eq!(&rolling_mean(head, 5)[..], &full_ma[..cut]);
            assert_eq!(&pct_change(head, 1)[..], &full_ret[..cut]);
        }
    }
}
