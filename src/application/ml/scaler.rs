use crate::domain::errors::InferenceError;
use crate::domain::ports::FeatureScaler;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Per-feature standardization: `(x - mean) / scale`.
///
/// `scale` is the population standard deviation of the training column; a
/// constant column keeps scale 1.0 so it maps to zero instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fits on row-major samples. Returns `None` for an empty sample set.
    pub fn fit(rows: &[Vec<f64>]) -> Option<Self> {
        let width = rows.first()?.len();
        let mut mean = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);
        for j in 0..width {
            let column = rows.iter().map(|r| r[j]);
            mean.push(column.clone().mean());
            let std = column.population_std_dev();
            scale.push(if std > 0.0 && std.is_finite() { std } else { 1.0 });
        }
        Some(Self { mean, scale })
    }

    pub fn transform_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, InferenceError> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if row.len() != self.mean.len() {
            return Err(InferenceError::DimensionMismatch {
                expected: self.mean.len(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_and_transform() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        assert_relative_eq!(scaler.mean[0], 2.0);
        assert_relative_eq!(scaler.scale[0], 1.0);
        // Constant column keeps unit scale
        assert_eq!(scaler.scale[1], 1.0);

        let scaled = scaler.transform(&[3.0, 5.0]).unwrap();
        assert_relative_eq!(scaled[0], 1.0);
        assert_relative_eq!(scaled[1], 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&[1.0]),
            Err(InferenceError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_empty_fit() {
        assert!(StandardScaler::fit(&[]).is_none());
    }
}
