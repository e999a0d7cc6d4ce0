//! Median imputation
//!
//! Missing values are encoded as NaN. Column medians are learned once by
//! [`MedianImputer::fit`]; [`MedianImputer::transform`] only applies them.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

use super::TrainingError;

/// Check if value is missing (NaN)
#[inline]
pub fn is_missing(v: f64) -> bool {
    v.is_nan()
}

/// Column-wise median imputer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Option<Vec<f64>>,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.medians.is_some()
    }

    /// Learned medians, one per column
    pub fn statistics(&self) -> Option<&[f64]> {
        self.medians.as_deref()
    }

    /// Learn the median of each column, ignoring missing values
    ///
    /// A column with no observed values imputes to 0.0.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<(), TrainingError> {
        if x.nrows() == 0 {
            return Err(TrainingError::EmptyDataset);
        }

        let medians = x
            .columns()
            .into_iter()
            .enumerate()
            .map(|(j, column)| {
                let observed: Vec<f64> = column.iter().copied().filter(|v| !is_missing(*v)).collect();
                median(observed).unwrap_or_else(|| {
                    warn!("Column {} has no observed values; imputing 0.0", j);
                    0.0
                })
            })
            .collect();

        self.medians = Some(medians);
        Ok(())
    }

    /// Replace missing values with the learned medians
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, TrainingError> {
        let medians = self.medians.as_ref().ok_or(TrainingError::NotFitted)?;
        if x.ncols() != medians.len() {
            return Err(TrainingError::ShapeMismatch {
                expected: format!("{} columns", medians.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (mut column, &fill) in out.columns_mut().into_iter().zip(medians.iter()) {
            column.mapv_inplace(|v| if is_missing(v) { fill } else { v });
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>, TrainingError> {
        self.fit(x)?;
        self.transform(x)
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
