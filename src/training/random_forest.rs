//! Random Forest implementation

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::tree::RegressionTree;
use super::{check_shapes, Regressor, TrainingError};

/// Random Forest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub random_state: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(10),
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            random_state: 37,
        }
    }
}

/// Random Forest regressor: mean of bagged regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: RandomForestConfig,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn bootstrap_indices(&self, n_samples: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.bootstrap {
            (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
        } else {
            (0..n_samples).collect()
        }
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        _feature_names: &[String],
    ) -> Result<(), TrainingError> {
        check_shapes(x, y)?;
        if self.config.n_estimators == 0 {
            return Err(TrainingError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }

        let n_samples = x.nrows();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        self.trees = (0..self.config.n_estimators)
            .map(|_| {
                let indices = self.bootstrap_indices(n_samples, &mut rng);
                let mut tree = RegressionTree::new()
                    .with_max_depth(self.config.max_depth)
                    .with_min_samples_split(self.config.min_samples_split)
                    .with_min_samples_leaf(self.config.min_samples_leaf);
                tree.fit_indices(x, y, &indices);
                tree
            })
            .collect();

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        if self.trees.is_empty() {
            return Err(TrainingError::NotFitted);
        }

        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }
}
