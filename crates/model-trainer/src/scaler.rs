use analysis_core::stats::{mean, population_std_dev};

/// Per-column standardisation fitted on training rows only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut means = Vec::with_capacity(n_features);
        let mut stds = Vec::with_capacity(n_features);

        for j in 0..n_features {
            let column: Vec<f64> = x.iter().map(|row| row[j]).collect();
            means.push(mean(&column));
            stds.push(population_std_dev(&column));
        }

        Self { means, stds }
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    /// Zero-variance columns and non-finite results map to 0.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(&v, (&m, &s))| {
                let z = if s > 0.0 { (v - m) / s } else { f64::NAN };
                if z.is_finite() {
                    z
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        x.iter().map(|row| self.transform_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardises_columns() {
        let x = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&x);
        let t = scaler.transform(&x);

        assert!((t[0][0] + 1.0).abs() < 1e-12);
        assert!((t[1][0] - 1.0).abs() < 1e-12);
        // constant column
        assert_eq!(t[0][1], 0.0);
        assert_eq!(t[1][1], 0.0);
    }

    #[test]
    fn test_uses_training_statistics() {
        let scaler = StandardScaler::fit(&[vec![0.0], vec![2.0]]);
        assert!((scaler.transform_row(&[4.0])[0] - 3.0).abs() < 1e-12);
        assert_eq!(scaler.transform_row(&[f64::NAN])[0], 0.0);
    }
}
