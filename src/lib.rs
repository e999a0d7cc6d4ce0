//! F1 Predict - race pace prediction from historical lap data
//!
//! This library provides:
//! - Historical session loading from OpenF1 with an on-disk cache and a
//!   synthetic fallback
//! - Per-driver feature building from qualifying, team and track tables
//! - Race weather lookup from the OpenWeatherMap forecast
//! - Gradient boosting, random forest and (optional) LightGBM-style
//!   regressors with held-out evaluation
//!
//! # Example
//!
//! ```no_run
//! use f1_predict::config::{RaceConfig, Settings};
//! use f1_predict::predictor::{RacePipeline, RaceRequest};
//!
//! let pipeline = RacePipeline::from_settings(RaceConfig::builtin(), &Settings::from_env())?;
//! let report = pipeline.run(&RaceRequest::historical("mexico"), &["gradient_boosting"])?;
//!
//! if let Some(best) = report.best_model() {
//!     for driver in best.podium(3) {
//!         println!("P{} {} ({:.3}s)", driver.position, driver.full_name, driver.predicted_time);
//!     }
//! }
//! # Ok::<(), f1_predict::Error>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod predictor;
pub mod training;
pub mod weather;

// Re-export commonly used types
pub use config::{RaceConfig, Settings};
pub use data::{SessionKey, SessionLoader, SessionType};
pub use error::{Error, Result};
pub use models::{DataSource, FeatureRow, LapRecord, RankedDriver, Sourced, Weather};
pub use predictor::{RacePipeline, RaceReport, RaceRequest};
pub use training::{EvaluationMetrics, ModelCatalog, ModelKind};
pub use weather::WeatherClient;
