use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardization fitted once on the training matrix.
///
/// Columns with zero variance are only centered: their scale is stored as 1.0,
/// so every training value of such a column maps to 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl StandardScaler {
    /// Compute column means and population standard deviations
    pub fn fit(features: &Array2<f64>) -> Result<Self> {
        if features.nrows() == 0 {
            return Err(AppError::TrainingData(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let means = features
            .mean_axis(Axis(0))
            .ok_or_else(|| AppError::TrainingData("empty feature matrix".to_string()))?;
        let scales = features
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > 0.0 && std.is_finite() { std } else { 1.0 });

        Ok(Self { means, scales })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn scales(&self) -> &Array1<f64> {
        &self.scales
    }

    /// Apply the stored statistics to every row of `features`
    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.n_features() {
            return Err(AppError::EnsembleInput(format!(
                "scaler expects {} columns, got {}",
                self.n_features(),
                features.ncols()
            )));
        }

        Ok((features - &self.means) / &self.scales)
    }

    /// Apply the stored statistics to a single row
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        if row.len() != self.n_features() {
            return Err(AppError::EnsembleInput(format!(
                "scaler expects {} values, got {}",
                self.n_features(),
                row.len()
            )));
        }

        Ok((&row - &self.means) / &self.scales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_transformed_training_set_is_standardized() {
        let x = array![
            [110.0, 70.0, 36.5],
            [140.0, 90.0, 37.2],
            [95.0, 60.0, 38.9],
            [160.0, 100.0, 36.8],
            [120.0, 75.0, 37.0],
        ];
        let scaler = StandardScaler::fit(&x).unwrap();
        let z = scaler.transform(&x).unwrap();

        for col in z.columns() {
            let mean = col.mean().unwrap();
            let std = col.std(0.0);
            assert!(mean.abs() < 1e-12, "mean {mean}");
            assert!((std - 1.0).abs() < 1e-12, "std {std}");
        }
    }

    #[test]
    fn test_constant_column_is_centered_only() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(scaler.scales()[1], 1.0);

        let z = scaler.transform(&x).unwrap();
        assert!(z.column(1).iter().all(|v| *v == 0.0));

        let row = scaler.transform_row(array![2.0, 7.0].view()).unwrap();
        assert_eq!(row[1], 2.0);
        assert!(row.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&array![[1.0, 2.0, 3.0]]),
            Err(AppError::EnsembleInput(_))
        ));
        assert!(scaler.transform_row(array![1.0].view()).is_err());
    }

    #[test]
    fn test_live_rows_use_training_statistics() {
        let x = array![[0.0], [10.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let row = scaler.transform_row(array![20.0].view()).unwrap();
        assert!((row[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_rejects_empty_matrix() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(StandardScaler::fit(&x).is_err());
    }
}
