//! Gradient Boosting implementation
//!
//! Least-squares gradient boosted regression trees: start from the target
//! mean, then fit each tree to the current residuals and add it with
//! shrinkage.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::tree::RegressionTree;
use super::{check_shapes, Regressor, TrainingError};

/// Gradient Boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples to split a node
    pub min_samples_split: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each tree
    pub subsample: f64,
    /// Random seed
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: 37,
        }
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    trees: Vec<RegressionTree>,
    initial_prediction: f64,
    fitted: bool,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_prediction: 0.0,
            fitted: false,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn subsample_indices(&self, n_samples: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.config.subsample < 1.0 {
            let k = ((n_samples as f64 * self.config.subsample).ceil() as usize).clamp(1, n_samples);
            indices.shuffle(rng);
            indices.truncate(k);
            indices.sort_unstable();
        }
        indices
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        _feature_names: &[String],
    ) -> Result<(), TrainingError> {
        check_shapes(x, y)?;
        if self.config.learning_rate.is_nan() || self.config.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.config.learning_rate
            )));
        }

        let n_samples = x.nrows();
        self.initial_prediction = y.mean().unwrap_or(0.0);
        self.trees.clear();

        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        for _ in 0..self.config.n_estimators {
            let residuals: Array1<f64> = y
                .iter()
                .zip(predictions.iter())
                .map(|(yi, pi)| yi - pi)
                .collect();

            let sample_indices = self.subsample_indices(n_samples, &mut rng);

            let mut tree = RegressionTree::new()
                .with_max_depth(Some(self.config.max_depth))
                .with_min_samples_split(self.config.min_samples_split)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit_indices(x, &residuals, &sample_indices);

            for (i, row) in x.rows().into_iter().enumerate() {
                predictions[i] += self.config.learning_rate * tree.predict_row(row);
            }

            self.trees.push(tree);
        }

        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        if !self.fitted {
            return Err(TrainingError::NotFitted);
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.initial_prediction
                    + self
                        .trees
                        .iter()
                        .map(|t| self.config.learning_rate * t.predict_row(row))
                        .sum::<f64>()
            })
            .collect())
    }
}
