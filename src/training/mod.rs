//! Model training and evaluation
//!
//! A [`Trainer`] imputes the feature matrix, makes one seeded train/test
//! split, fits the requested model kind and scores it on the held-out rows.
//! The fitted imputer travels with the model inside [`TrainedModel`] so that
//! inference applies exactly the training-time statistics.

pub mod gradient_boosting;
pub mod imputer;
pub mod lightgbm;
pub mod metrics;
pub mod random_forest;
pub mod split;
pub mod tree;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ModelSettings;

pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use imputer::MedianImputer;
pub use lightgbm::LightGbmConfig;
#[cfg(feature = "lightgbm")]
pub use lightgbm::LightGbmRegressor;
pub use metrics::EvaluationMetrics;
pub use random_forest::{RandomForestConfig, RandomForestRegressor};
pub use split::{train_test_split, Split};

/// Training errors
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Unknown model kind '{name}'. Available: {available}")]
    UnknownModelKind { name: String, available: String },

    #[error("Model kind '{0}' is not available in this build")]
    ModelUnavailable(ModelKind),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Need at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("test_size must be between 0 and 1, got {0}")]
    InvalidTestSize(f64),

    #[error("Invalid feature name '{0}'")]
    InvalidFeatureName(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Model has not been fitted")]
    NotFitted,
}

/// Supported model kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    GradientBoosting,
    RandomForest,
    LightGbm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::GradientBoosting,
        ModelKind::RandomForest,
        ModelKind::LightGbm,
    ];

    /// Selector name ("gradient_boosting", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::RandomForest => "random_forest",
            ModelKind::LightGbm => "lightgbm",
        }
    }

    /// Human-readable name for reports
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::GradientBoosting => "Gradient Boosting",
            ModelKind::RandomForest => "Random Forest",
            ModelKind::LightGbm => "LightGBM",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model kinds usable in this build, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    available: Vec<ModelKind>,
}

impl ModelCatalog {
    /// Catalog for the compiled feature set
    pub fn detect() -> Self {
        Self::new(true)
    }

    /// Catalog with LightGBM optionally withheld
    ///
    /// LightGBM is only listed when requested and compiled in.
    pub fn new(lightgbm: bool) -> Self {
        let mut available = vec![ModelKind::GradientBoosting, ModelKind::RandomForest];
        if lightgbm && cfg!(feature = "lightgbm") {
            available.push(ModelKind::LightGbm);
        }
        Self { available }
    }

    pub fn available(&self) -> &[ModelKind] {
        &self.available
    }

    pub fn is_available(&self, kind: ModelKind) -> bool {
        self.available.contains(&kind)
    }

    /// Resolve a selector name to an available kind
    pub fn resolve(&self, name: &str) -> Result<ModelKind, TrainingError> {
        let kind = ModelKind::from_name(name).ok_or_else(|| TrainingError::UnknownModelKind {
            name: name.to_string(),
            available: ModelKind::ALL
                .iter()
                .map(ModelKind::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        })?;
        self.ensure_available(kind)?;
        Ok(kind)
    }

    pub fn ensure_available(&self, kind: ModelKind) -> Result<(), TrainingError> {
        if self.is_available(kind) {
            Ok(())
        } else {
            Err(TrainingError::ModelUnavailable(kind))
        }
    }

    /// Instantiate an unfitted regressor with the configured hyperparameters
    pub fn build(
        &self,
        kind: ModelKind,
        settings: &ModelSettings,
    ) -> Result<Box<dyn Regressor>, TrainingError> {
        self.ensure_available(kind)?;
        match kind {
            ModelKind::GradientBoosting => Ok(Box::new(GradientBoostingRegressor::new(
                settings.gradient_boosting.clone(),
            ))),
            ModelKind::RandomForest => Ok(Box::new(RandomForestRegressor::new(
                settings.random_forest.clone(),
            ))),
            #[cfg(feature = "lightgbm")]
            ModelKind::LightGbm => Ok(Box::new(LightGbmRegressor::new(settings.lightgbm.clone()))),
            #[cfg(not(feature = "lightgbm"))]
            ModelKind::LightGbm => Err(TrainingError::ModelUnavailable(kind)),
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::detect()
    }
}

/// Trait for regression models
pub trait Regressor {
    /// Fit on a complete (imputed) matrix; `feature_names` label its columns
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
    ) -> Result<(), TrainingError>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError>;
}

pub(crate) fn check_shapes(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), TrainingError> {
    if x.nrows() == 0 {
        return Err(TrainingError::EmptyDataset);
    }
    if x.nrows() != y.len() {
        return Err(TrainingError::ShapeMismatch {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    Ok(())
}

/// Feature matrix with labels and column names
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, y: Array1<f64>, feature_names: Vec<String>) -> Self {
        Self {
            x,
            y,
            feature_names,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        check_shapes(&self.x, &self.y)?;
        if self.feature_names.len() != self.x.ncols() {
            return Err(TrainingError::ShapeMismatch {
                expected: format!("{} feature names", self.x.ncols()),
                actual: format!("{} feature names", self.feature_names.len()),
            });
        }
        Ok(())
    }
}

/// Replace characters the LightGBM booster rejects with `_`
///
/// Names that collide after replacement get a numeric suffix.
pub fn sanitize_feature_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| {
            let base: String = name
                .chars()
                .map(|c| {
                    if c.is_whitespace() || lightgbm::FORBIDDEN_NAME_CHARS.contains(&c) {
                        '_'
                    } else {
                        c
                    }
                })
                .collect();
            let base = if base.is_empty() {
                "feature".to_string()
            } else {
                base
            };

            let mut candidate = base.clone();
            let mut suffix = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            candidate
        })
        .collect()
}

/// Impute missing values
///
/// Without an imputer a new median imputer is fitted on `x`; with one, `x`
/// is only transformed and the given imputer is returned unchanged.
pub fn prepare_features(
    x: &Array2<f64>,
    imputer: Option<&MedianImputer>,
) -> Result<(Array2<f64>, MedianImputer), TrainingError> {
    match imputer {
        Some(imputer) => Ok((imputer.transform(x)?, imputer.clone())),
        None => {
            let mut imputer = MedianImputer::new();
            let imputed = imputer.fit_transform(x)?;
            Ok((imputed, imputer))
        }
    }
}

/// A fitted model with the imputer it was trained behind
pub struct TrainedModel {
    kind: ModelKind,
    regressor: Box<dyn Regressor>,
    imputer: MedianImputer,
    feature_names: Vec<String>,
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn imputer(&self) -> &MedianImputer {
        &self.imputer
    }

    /// Column names as supplied by the caller
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Predict raw (possibly incomplete) rows using the training imputer
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        let (imputed, _) = prepare_features(x, Some(&self.imputer))?;
        self.regressor.predict(&imputed)
    }
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("kind", &self.kind)
            .field("imputer", &self.imputer)
            .field("feature_names", &self.feature_names)
            .finish_non_exhaustive()
    }
}

/// Result of one train/evaluate run
#[derive(Debug)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub metrics: EvaluationMetrics,
    /// Predictions for the held-out rows, in `split.test` order
    pub test_predictions: Array1<f64>,
    pub split: Split,
}

/// Trains and evaluates model kinds against a catalog and settings
pub struct Trainer<'a> {
    catalog: &'a ModelCatalog,
    settings: &'a ModelSettings,
}

impl<'a> Trainer<'a> {
    pub fn new(catalog: &'a ModelCatalog, settings: &'a ModelSettings) -> Self {
        Self { catalog, settings }
    }

    /// Resolve `name` and train that kind
    pub fn train_named(&self, dataset: &Dataset, name: &str) -> Result<TrainingOutcome, TrainingError> {
        let kind = self.catalog.resolve(name)?;
        self.train(dataset, kind)
    }

    /// Impute, split, fit and evaluate one model kind
    pub fn train(&self, dataset: &Dataset, kind: ModelKind) -> Result<TrainingOutcome, TrainingError> {
        let mut regressor = self.catalog.build(kind, self.settings)?;
        dataset.validate()?;

        let (x, imputer) = prepare_features(&dataset.x, None)?;
        let split = train_test_split(
            dataset.n_samples(),
            self.settings.test_size,
            self.settings.random_state,
        )?;
        debug!(
            "Split {} rows into {} train / {} test",
            dataset.n_samples(),
            split.train.len(),
            split.test.len()
        );

        let x_train = x.select(Axis(0), &split.train);
        let y_train = dataset.y.select(Axis(0), &split.train);
        let x_test = x.select(Axis(0), &split.test);
        let y_test = dataset.y.select(Axis(0), &split.test);

        let fit_names = match kind {
            ModelKind::LightGbm => sanitize_feature_names(&dataset.feature_names),
            _ => dataset.feature_names.clone(),
        };
        regressor.fit(&x_train, &y_train, &fit_names)?;

        let test_predictions = regressor.predict(&x_test)?;
        let metrics = EvaluationMetrics::compute(&y_test, &test_predictions);
        info!("{} trained: {}", kind.label(), metrics);

        Ok(TrainingOutcome {
            model: TrainedModel {
                kind,
                regressor,
                imputer,
                feature_names: dataset.feature_names.clone(),
            },
            metrics,
            test_predictions,
            split,
        })
    }
}

/// Train one kind with the given catalog and settings
pub fn train_and_evaluate(
    dataset: &Dataset,
    kind: ModelKind,
    catalog: &ModelCatalog,
    settings: &ModelSettings,
) -> Result<TrainingOutcome, TrainingError> {
    Trainer::new(catalog, settings).train(dataset, kind)
}
