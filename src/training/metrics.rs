//! Regression metrics

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Held-out evaluation metrics, always reported together
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl EvaluationMetrics {
    /// Compute MAE, MSE, RMSE and R² for aligned truth/prediction vectors
    ///
    /// With a constant target, R² is 1.0 for a perfect fit and 0.0 otherwise.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let n = y_true.len().max(1) as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let ss_res: f64 = errors.iter().map(|e| e * e).sum();
        let mse = ss_res / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean = y_true.sum() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            mae,
            mse,
            rmse: mse.sqrt(),
            r2,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.mae.is_finite() && self.mse.is_finite() && self.rmse.is_finite() && self.r2.is_finite()
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE: {:.3}s  MSE: {:.3}  RMSE: {:.3}s  R²: {:.3}",
            self.mae, self.mse, self.rmse, self.r2
        )
    }
}
