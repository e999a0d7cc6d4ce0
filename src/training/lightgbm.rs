//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! Features are bucketed into histogram bins once per fit. Each tree grows
//! best-first: the leaf with the largest gradient/hessian gain is split next,
//! up to `num_leaves` leaves. Only compiled with the `lightgbm` feature; the
//! config is always available so settings files stay portable.

use serde::{Deserialize, Serialize};

/// LightGBM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightGbmConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Maximum tree depth (`None` for unlimited)
    pub max_depth: Option<usize>,
    /// Maximum leaves per tree
    pub num_leaves: usize,
    /// Minimum rows in each child of a split
    pub min_child_samples: usize,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Maximum histogram bins per feature
    pub max_bins: usize,
    pub random_state: u64,
}

impl Default for LightGbmConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            num_leaves: 31,
            min_child_samples: 20,
            reg_lambda: 0.0,
            max_bins: 255,
            random_state: 37,
        }
    }
}

/// Characters rejected in feature names
pub const FORBIDDEN_NAME_CHARS: [char; 7] = ['"', ',', ':', '[', ']', '{', '}'];

/// Whether the booster accepts a feature name
pub fn is_valid_feature_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || FORBIDDEN_NAME_CHARS.contains(&c))
}

#[cfg(feature = "lightgbm")]
pub use booster::LightGbmRegressor;

#[cfg(feature = "lightgbm")]
mod booster {
    use ndarray::{Array1, Array2, ArrayView1};
    use serde::{Deserialize, Serialize};
    use std::cmp::Ordering;

    use super::{is_valid_feature_name, LightGbmConfig};
    use crate::training::{check_shapes, Regressor, TrainingError};

    /// Bin upper bounds for one feature; bin `b` holds `(t[b-1], t[b]]`
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct FeatureBins {
        thresholds: Vec<f64>,
    }

    impl FeatureBins {
        fn build(values: impl Iterator<Item = f64>, max_bins: usize) -> Self {
            let mut distinct: Vec<f64> = values.filter(|v| !v.is_nan()).collect();
            distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            distinct.dedup();

            let max_bins = max_bins.max(2);
            let thresholds = if distinct.len() <= max_bins {
                distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
            } else {
                let mut cuts: Vec<f64> = (1..max_bins)
                    .map(|k| {
                        let idx = k * distinct.len() / max_bins;
                        (distinct[idx - 1] + distinct[idx]) / 2.0
                    })
                    .collect();
                cuts.dedup();
                cuts
            };

            Self { thresholds }
        }

        fn n_bins(&self) -> usize {
            self.thresholds.len() + 1
        }

        fn bin_of(&self, value: f64) -> usize {
            self.thresholds.partition_point(|&t| t < value)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum Node {
        Leaf {
            value: f64,
        },
        Split {
            feature: usize,
            threshold: f64,
            left: usize,
            right: usize,
        },
    }

    /// Arena-allocated tree; node 0 is the root
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tree {
        nodes: Vec<Node>,
    }

    impl Tree {
        fn predict(&self, row: ArrayView1<f64>) -> f64 {
            let mut idx = 0;
            loop {
                match &self.nodes[idx] {
                    Node::Leaf { value } => return *value,
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        idx = if row[*feature] <= *threshold {
                            *left
                        } else {
                            *right
                        };
                    }
                }
            }
        }
    }

    struct Candidate {
        gain: f64,
        feature: usize,
        bin: usize,
    }

    struct PendingLeaf {
        node: usize,
        depth: usize,
        rows: Vec<usize>,
        best: Option<Candidate>,
    }

    fn leaf_score(g: f64, h: f64, lambda: f64) -> f64 {
        g * g / (h + lambda)
    }

    fn leaf_weight(g: f64, h: f64, lambda: f64) -> f64 {
        if h + lambda > 0.0 {
            -g / (h + lambda)
        } else {
            0.0
        }
    }

    /// LightGBM-style regressor (squared loss)
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LightGbmRegressor {
        pub config: LightGbmConfig,
        trees: Vec<Tree>,
        base_prediction: f64,
        feature_names: Vec<String>,
        fitted: bool,
    }

    impl LightGbmRegressor {
        pub fn new(config: LightGbmConfig) -> Self {
            Self {
                config,
                trees: Vec::new(),
                base_prediction: 0.0,
                feature_names: Vec::new(),
                fitted: false,
            }
        }

        /// Names the booster was fitted with
        pub fn feature_names(&self) -> &[String] {
            &self.feature_names
        }

        pub fn n_trees(&self) -> usize {
            self.trees.len()
        }

        /// Best histogram split of `rows` across all features
        fn best_split(
            &self,
            binned: &[Vec<usize>],
            bins: &[FeatureBins],
            gradients: &[f64],
            rows: &[usize],
        ) -> Option<Candidate> {
            let lambda = self.config.reg_lambda;
            let min_child = self.config.min_child_samples.max(1);
            if rows.len() < 2 * min_child {
                return None;
            }

            let total_g: f64 = rows.iter().map(|&i| gradients[i]).sum();
            let total_h = rows.len() as f64;
            let parent = leaf_score(total_g, total_h, lambda);

            let mut best: Option<Candidate> = None;
            for (feature, feature_bins) in bins.iter().enumerate() {
                let n_bins = feature_bins.n_bins();
                let mut hist_g = vec![0.0; n_bins];
                let mut hist_n = vec![0usize; n_bins];
                for &i in rows {
                    let b = binned[feature][i];
                    hist_g[b] += gradients[i];
                    hist_n[b] += 1;
                }

                let mut left_g = 0.0;
                let mut left_n = 0usize;
                for b in 0..n_bins - 1 {
                    left_g += hist_g[b];
                    left_n += hist_n[b];
                    let right_n = rows.len() - left_n;
                    if left_n < min_child || right_n < min_child {
                        continue;
                    }

                    let right_g = total_g - left_g;
                    let gain = leaf_score(left_g, left_n as f64, lambda)
                        + leaf_score(right_g, right_n as f64, lambda)
                        - parent;

                    if gain > 0.0 && best.as_ref().map_or(true, |c| gain > c.gain) {
                        best = Some(Candidate { gain, feature, bin: b });
                    }
                }
            }
            best
        }

        fn grow_tree(
            &self,
            binned: &[Vec<usize>],
            bins: &[FeatureBins],
            gradients: &[f64],
            n_rows: usize,
        ) -> Tree {
            let max_depth = self.config.max_depth.unwrap_or(usize::MAX);
            let lambda = self.config.reg_lambda;

            let mut nodes = vec![Node::Leaf { value: 0.0 }];
            let rows: Vec<usize> = (0..n_rows).collect();
            let best = if max_depth > 0 {
                self.best_split(binned, bins, gradients, &rows)
            } else {
                None
            };
            let mut pending = vec![PendingLeaf {
                node: 0,
                depth: 0,
                rows,
                best,
            }];

            let mut n_leaves = 1;
            while n_leaves < self.config.num_leaves.max(1) {
                // leaf with the largest gain goes next
                let next = pending
                    .iter()
                    .enumerate()
                    .filter_map(|(i, leaf)| leaf.best.as_ref().map(|c| (i, c.gain)))
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                    .map(|(i, _)| i);

                let Some(pos) = next else { break };
                let mut leaf = pending.swap_remove(pos);
                let Some(split) = leaf.best.take() else {
                    pending.push(leaf);
                    break;
                };

                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                    .rows
                    .iter()
                    .partition(|&&i| binned[split.feature][i] <= split.bin);

                let left = nodes.len();
                let right = left + 1;
                nodes.push(Node::Leaf { value: 0.0 });
                nodes.push(Node::Leaf { value: 0.0 });
                nodes[leaf.node] = Node::Split {
                    feature: split.feature,
                    threshold: bins[split.feature].thresholds[split.bin],
                    left,
                    right,
                };
                n_leaves += 1;

                let depth = leaf.depth + 1;
                for (node, child_rows) in [(left, left_rows), (right, right_rows)] {
                    let best = if depth < max_depth {
                        self.best_split(binned, bins, gradients, &child_rows)
                    } else {
                        None
                    };
                    pending.push(PendingLeaf {
                        node,
                        depth,
                        rows: child_rows,
                        best,
                    });
                }
            }

            for leaf in &pending {
                let g: f64 = leaf.rows.iter().map(|&i| gradients[i]).sum();
                nodes[leaf.node] = Node::Leaf {
                    value: leaf_weight(g, leaf.rows.len() as f64, lambda),
                };
            }

            Tree { nodes }
        }
    }

    impl Regressor for LightGbmRegressor {
        fn fit(
            &mut self,
            x: &Array2<f64>,
            y: &Array1<f64>,
            feature_names: &[String],
        ) -> Result<(), TrainingError> {
            check_shapes(x, y)?;
            if feature_names.len() != x.ncols() {
                return Err(TrainingError::ShapeMismatch {
                    expected: format!("{} feature names", x.ncols()),
                    actual: format!("{} feature names", feature_names.len()),
                });
            }
            if let Some(bad) = feature_names.iter().find(|n| !is_valid_feature_name(n)) {
                return Err(TrainingError::InvalidFeatureName(bad.clone()));
            }

            let n = x.nrows();
            let bins: Vec<FeatureBins> = x
                .columns()
                .into_iter()
                .map(|c| FeatureBins::build(c.iter().copied(), self.config.max_bins))
                .collect();
            let binned: Vec<Vec<usize>> = x
                .columns()
                .into_iter()
                .zip(bins.iter())
                .map(|(c, b)| c.iter().map(|&v| b.bin_of(v)).collect())
                .collect();

            self.base_prediction = y.mean().unwrap_or(0.0);
            self.trees.clear();
            let mut predictions = Array1::from_elem(n, self.base_prediction);

            for _ in 0..self.config.n_estimators {
                let gradients: Vec<f64> = predictions
                    .iter()
                    .zip(y.iter())
                    .map(|(&p, &yi)| p - yi)
                    .collect();

                let tree = self.grow_tree(&binned, &bins, &gradients, n);
                for (i, row) in x.rows().into_iter().enumerate() {
                    predictions[i] += self.config.learning_rate * tree.predict(row);
                }
                self.trees.push(tree);
            }

            self.feature_names = feature_names.to_vec();
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
                    self.base_prediction
                        + self
                            .trees
                            .iter()
                            .map(|t| self.config.learning_rate * t.predict(row))
                            .sum::<f64>()
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_name_rules() {
        assert!(is_valid_feature_name("QualifyingTime_s_"));
        assert!(is_valid_feature_name("Temperature"));
        assert!(!is_valid_feature_name("QualifyingTime (s)"));
        assert!(!is_valid_feature_name("a:b"));
        assert!(!is_valid_feature_name("{x}"));
        assert!(!is_valid_feature_name(""));
    }

    #[cfg(feature = "lightgbm")]
    mod booster {
        use super::*;
        use crate::training::{Regressor, TrainingError};
        use ndarray::{Array1, Array2};

        fn make_regression_data() -> (Array2<f64>, Array1<f64>) {
            let x = Array2::from_shape_vec((100, 3), (0..300).map(|i| (i as f64) / 100.0).collect())
                .unwrap();
            let y = Array1::from_vec((0..100).map(|i| 2.0 * (i * 3) as f64 / 100.0 + 0.1).collect());
            (x, y)
        }

        fn names(n: usize) -> Vec<String> {
            (0..n).map(|i| format!("f{}", i)).collect()
        }

        #[test]
        fn test_lightgbm_regressor() {
            let (x, y) = make_regression_data();
            let config = LightGbmConfig {
                n_estimators: 50,
                num_leaves: 8,
                min_child_samples: 2,
                max_depth: None,
                ..Default::default()
            };
            let mut model = LightGbmRegressor::new(config);
            model.fit(&x, &y, &names(3)).unwrap();
            let preds = model.predict(&x).unwrap();
            assert_eq!(preds.len(), 100);

            let mse = (&preds - &y).mapv(|e| e * e).mean().unwrap();
            assert!(mse < y.var(0.0) * 0.1, "mse {}", mse);
        }

        #[test]
        fn test_small_dataset_predicts_mean() {
            // fewer rows than 2 * min_child_samples: every tree is a single leaf
            let (x, y) = make_regression_data();
            let x = x.slice(ndarray::s![..9, ..]).to_owned();
            let y = y.slice(ndarray::s![..9]).to_owned();
            let mut model = LightGbmRegressor::new(LightGbmConfig::default());
            model.fit(&x, &y, &names(3)).unwrap();

            let mean = y.mean().unwrap();
            assert!(model
                .predict(&x)
                .unwrap()
                .iter()
                .all(|p| (p - mean).abs() < 1e-9));
        }

        #[test]
        fn test_num_leaves_bounds_tree() {
            let (x, y) = make_regression_data();
            let config = LightGbmConfig {
                n_estimators: 1,
                num_leaves: 4,
                min_child_samples: 1,
                max_depth: None,
                ..Default::default()
            };
            let mut model = LightGbmRegressor::new(config);
            model.fit(&x, &y, &names(3)).unwrap();
            let distinct: std::collections::BTreeSet<u64> = model
                .predict(&x)
                .unwrap()
                .iter()
                .map(|p| p.to_bits())
                .collect();
            assert!(distinct.len() <= 4);
        }

        #[test]
        fn test_rejects_special_characters_in_names() {
            let (x, y) = make_regression_data();
            let mut model = LightGbmRegressor::new(LightGbmConfig::default());
            let bad = vec!["a".to_string(), "Time (s)".to_string(), "c".to_string()];
            assert!(matches!(
                model.fit(&x, &y, &bad),
                Err(TrainingError::InvalidFeatureName(name)) if name == "Time (s)"
            ));
        }
    }
}
