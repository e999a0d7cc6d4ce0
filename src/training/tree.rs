//! CART regression tree
//!
//! Shared base learner for gradient boosting and the random forest. Trees are
//! fitted on a subset of row indices so ensembles can bag or subsample without
//! copying the feature matrix.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Minimum squared-error reduction for a split to be kept
const MIN_GAIN: f64 = 1e-12;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node; rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Regression tree fitted on squared error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Option<TreeNode>,
    /// Maximum depth (`None` grows until leaves are pure or too small)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl RegressionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    /// Depth of the fitted tree (0 for a single leaf)
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    /// Fit on all rows
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.fit_indices(x, y, &indices);
    }

    /// Fit on the given rows; indices may repeat (bootstrap samples)
    pub fn fit_indices(&mut self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) {
        self.root = Some(self.build(x, y, indices, 0));
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.root.as_ref().map_or(0.0, |root| root.predict(row))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    fn build(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize], depth: usize) -> TreeNode {
        let n_samples = indices.len();
        let value = mean(y, indices);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || is_constant(y, indices);

        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        match self.find_best_split(x, y, indices) {
            Some((feature, threshold)) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature]] <= threshold);

                TreeNode::Split {
                    feature,
                    threshold,
                    left: Box::new(self.build(x, y, &left, depth + 1)),
                    right: Box::new(self.build(x, y, &right, depth + 1)),
                    n_samples,
                }
            }
            None => TreeNode::Leaf { value, n_samples },
        }
    }

    /// Best (feature, threshold) by squared-error reduction
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
    ) -> Option<(usize, f64)> {
        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let parent_score = total_sum * total_sum / n as f64;

        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..x.ncols() {
            let mut sorted: Vec<(f64, f64)> =
                indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
            sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += sorted[pos].1;
                let left_count = pos + 1;
                let right_count = n - left_count;

                if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                    continue;
                }
                if sorted[pos].0 == sorted[pos + 1].0 {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let gain = left_sum * left_sum / left_count as f64
                    + right_sum * right_sum / right_count as f64
                    - parent_score;

                if gain > MIN_GAIN && best.map_or(true, |(_, _, g)| gain > g) {
                    let threshold = (sorted[pos].0 + sorted[pos + 1].0) / 2.0;
                    best = Some((feature, threshold, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

fn mean(y: &Array1<f64>, indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn is_constant(y: &Array1<f64>, indices: &[usize]) -> bool {
    match indices.first() {
        Some(&first) => indices.iter().all(|&i| y[i] == y[first]),
        None => true,
    }
}
