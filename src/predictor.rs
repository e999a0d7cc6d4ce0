//! End-to-end race prediction
//!
//! Loads the historical session, fetches race weather, builds the feature
//! table, then trains and evaluates each requested model kind. Every trained
//! model also predicts the full field, which is ranked into a classification.

use ndarray::Array1;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{error, info, warn};

use crate::config::{RaceConfig, Settings};
use crate::data::{
    FeatureBuilder, FeatureTable, OpenF1Client, SessionKey, SessionLoader, SessionType,
    SyntheticLapGenerator, SYNTHETIC_SEED,
};
use crate::error::Result;
use crate::models::{DataSource, FeatureRow, RankedDriver, Sourced, Weather};
use crate::training::{EvaluationMetrics, ModelCatalog, ModelKind, Trainer, TrainingError};
use crate::weather::WeatherClient;

/// Season of the session used as training data
pub const HISTORICAL_YEAR: i32 = 2024;
/// Round of the session used as training data
pub const HISTORICAL_ROUND: u32 = 20;

/// What to predict
#[derive(Debug, Clone)]
pub struct RaceRequest {
    pub track: String,
    /// Session whose laps provide the training labels
    pub session: SessionKey,
    /// Forecast time; the track default is used when `None`
    pub forecast_time: Option<String>,
}

impl RaceRequest {
    pub fn new(track: impl Into<String>, session: SessionKey) -> Self {
        Self {
            track: track.into(),
            session,
            forecast_time: None,
        }
    }

    /// Request trained on the default historical race session
    pub fn historical(track: impl Into<String>) -> Self {
        Self::new(
            track,
            SessionKey::new(HISTORICAL_YEAR, HISTORICAL_ROUND, SessionType::Race),
        )
    }

    pub fn with_forecast_time(mut self, time: impl Into<String>) -> Self {
        self.forecast_time = Some(time.into());
        self
    }
}

/// Feature table plus the provenance of its inputs
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub table: FeatureTable,
    pub laps_source: DataSource,
    pub weather: Sourced<Weather>,
}

/// Where the run's inputs came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub laps: DataSource,
    pub weather: DataSource,
}

/// Evaluation and predicted classification for one model kind
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub kind: ModelKind,
    pub metrics: EvaluationMetrics,
    /// Rows held out for evaluation
    pub test_rows: usize,
    pub ranking: Vec<RankedDriver>,
}

impl ModelReport {
    pub fn podium(&self, n: usize) -> &[RankedDriver] {
        &self.ranking[..n.min(self.ranking.len())]
    }
}

/// A model kind that was requested but not trained
#[derive(Debug, Clone, Serialize)]
pub struct ModelFailure {
    pub kind: ModelKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceReport {
    pub track: String,
    pub models: Vec<ModelReport>,
    pub failures: Vec<ModelFailure>,
    pub provenance: Provenance,
}

impl RaceReport {
    /// Model with the lowest held-out MAE
    pub fn best_model(&self) -> Option<&ModelReport> {
        self.models
            .iter()
            .min_by(|a, b| a.metrics.mae.total_cmp(&b.metrics.mae))
    }
}

/// Race prediction pipeline
pub struct RacePipeline {
    config: RaceConfig,
    loader: SessionLoader,
    weather: WeatherClient,
    catalog: ModelCatalog,
}

impl RacePipeline {
    pub fn new(
        config: RaceConfig,
        loader: SessionLoader,
        weather: WeatherClient,
        catalog: ModelCatalog,
    ) -> Self {
        Self {
            config,
            loader,
            weather,
            catalog,
        }
    }

    /// Wire up the live providers described by `settings`
    pub fn from_settings(config: RaceConfig, settings: &Settings) -> Result<Self> {
        let timing = OpenF1Client::new(settings.timing.clone())?;
        let loader = SessionLoader::with_cache(
            timing,
            &settings.cache_dir,
            SyntheticLapGenerator::new(SYNTHETIC_SEED, settings.synthetic_laps_per_driver),
        )?;
        let api_key = settings.weather_api_key().ok().map(str::to_string);
        let weather = WeatherClient::new(settings.weather.clone(), api_key)?;

        Ok(Self::new(config, loader, weather, ModelCatalog::detect()))
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn loader(&self) -> &SessionLoader {
        &self.loader
    }

    pub fn weather_client(&self) -> &WeatherClient {
        &self.weather
    }

    /// Load laps and weather and build the model-ready table
    pub fn prepare_training_data(&self, request: &RaceRequest) -> Result<TrainingData> {
        // fail on unknown tracks before touching any provider
        self.config.qualifying(&request.track)?;

        let laps = self.loader.load(&request.session);
        let weather = self
            .weather
            .fetch(&self.config, &request.track, request.forecast_time.as_deref());

        let table = FeatureBuilder::new(&self.config).build(&request.track, &laps.value, &weather.value)?;
        info!(
            "Prepared {} drivers for {} ({} laps, weather {})",
            table.len(),
            request.track,
            laps.source,
            weather.source
        );

        Ok(TrainingData {
            table,
            laps_source: laps.source,
            weather,
        })
    }

    /// Resolve model names; unknown names are an error, unavailable kinds are skipped
    fn resolve_kinds(&self, names: &[&str]) -> Result<(Vec<ModelKind>, Vec<ModelFailure>)> {
        if names.is_empty() {
            return Ok((self.catalog.available().to_vec(), Vec::new()));
        }

        let mut kinds = Vec::new();
        let mut skipped = Vec::new();
        for name in names {
            match self.catalog.resolve(name) {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(TrainingError::ModelUnavailable(kind)) => {
                    warn!("{} is not available in this build, skipping", kind.label());
                    skipped.push(ModelFailure {
                        kind,
                        reason: TrainingError::ModelUnavailable(kind).to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok((kinds, skipped))
    }

    /// Run the full pipeline for the named model kinds (all available when empty)
    pub fn run(&self, request: &RaceRequest, model_names: &[&str]) -> Result<RaceReport> {
        let (kinds, mut failures) = self.resolve_kinds(model_names)?;

        let data = self.prepare_training_data(request)?;
        let dataset = data.table.to_dataset();
        let trainer = Trainer::new(&self.catalog, self.config.models());

        let mut models = Vec::new();
        for kind in kinds {
            info!("Training {}...", kind.label());
            let result = trainer.train(&dataset, kind).and_then(|outcome| {
                let predictions = outcome.model.predict(&dataset.x)?;
                Ok(ModelReport {
                    kind,
                    metrics: outcome.metrics,
                    test_rows: outcome.test_predictions.len(),
                    ranking: rank_predictions(&data.table.rows, &predictions),
                })
            });

            match result {
                Ok(report) => models.push(report),
                Err(e) => {
                    error!("Error training {}: {}", kind.label(), e);
                    failures.push(ModelFailure {
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(RaceReport {
            track: request.track.clone(),
            models,
            failures,
            provenance: Provenance {
                laps: data.laps_source,
                weather: data.weather.source,
            },
        })
    }
}

/// Sort drivers by predicted lap time, fastest first
///
/// Equal times are ordered by driver code.
pub fn rank_predictions(rows: &[FeatureRow], predictions: &Array1<f64>) -> Vec<RankedDriver> {
    let mut ranked: Vec<RankedDriver> = rows
        .iter()
        .zip(predictions.iter())
        .map(|(row, &predicted_time)| RankedDriver {
            position: 0,
            driver: row.driver.clone(),
            full_name: row.full_name.clone().unwrap_or_else(|| row.driver.clone()),
            team: row.team.clone().unwrap_or_else(|| "Unknown".to_string()),
            predicted_time,
        })
        .collect();

    ranked.sort_by(|a, b| match a.predicted_time.total_cmp(&b.predicted_time) {
        Ordering::Equal => a.driver.cmp(&b.driver),
        other => other,
    });
    for (i, driver) in ranked.iter_mut().enumerate() {
        driver.position = i + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RawLap, TimingError, TimingProvider};
    use crate::error::Error;
    use crate::training::GradientBoostingConfig;
    use crate::config::ConfigError;
    use crate::weather::{WeatherConfig, WeatherError};
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    struct OfflineProvider {
        calls: Rc<Cell<usize>>,
    }

    impl TimingProvider for OfflineProvider {
        fn fetch_laps(&self, _key: &SessionKey) -> std::result::Result<Vec<RawLap>, TimingError> {
            self.calls.set(self.calls.get() + 1);
            Err(TimingError::Unavailable("offline".to_string()))
        }
    }

    fn offline_pipeline(config: RaceConfig, catalog: ModelCatalog) -> (RacePipeline, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let loader = SessionLoader::new(
            Box::new(OfflineProvider {
                calls: Rc::clone(&calls),
            }),
            SyntheticLapGenerator::default(),
        );
        let weather = WeatherClient::new(
            WeatherConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                timeout_secs: 2,
            },
            None,
        )
        .unwrap();
        (RacePipeline::new(config, loader, weather, catalog), calls)
    }

    fn assert_valid_ranking(ranking: &[RankedDriver]) {
        for pair in ranking.windows(2) {
            assert!(pair[0].predicted_time <= pair[1].predicted_time);
        }
        let codes: HashSet<&str> = ranking.iter().map(|r| r.driver.as_str()).collect();
        assert_eq!(codes.len(), ranking.len());
        for (i, r) in ranking.iter().enumerate() {
            assert_eq!(r.position, i + 1);
        }
    }

    #[test]
    fn test_mexico_gradient_boosting_end_to_end() {
        let (pipeline, _) = offline_pipeline(RaceConfig::builtin(), ModelCatalog::detect());
        let request = RaceRequest::historical("mexico");

        let data = pipeline.prepare_training_data(&request).unwrap();
        assert_eq!(data.table.len(), 13);
        assert_eq!(data.laps_source, DataSource::Fallback);
        assert_eq!(data.weather.source, DataSource::Fallback);

        let settings = pipeline.config().models();
        assert_eq!(settings.test_size, 0.3);
        assert_eq!(settings.random_state, 37);
        let outcome = Trainer::new(pipeline.catalog(), settings)
            .train(&data.table.to_dataset(), ModelKind::GradientBoosting)
            .unwrap();
        assert_eq!(outcome.test_predictions.len(), outcome.split.test.len());
        assert_eq!(outcome.test_predictions.len(), 4);
        assert!(outcome.metrics.is_finite());

        let report = pipeline.run(&request, &["gradient_boosting"]).unwrap();
        assert_eq!(report.models.len(), 1);
        assert!(report.failures.is_empty());
        let model = &report.models[0];
        assert_eq!(model.ranking.len(), 13);
        assert_eq!(model.test_rows, 4);
        assert!(model.metrics.is_finite());
        assert_valid_ranking(&model.ranking);
        assert_eq!(model.podium(3).len(), 3);
    }

    #[test]
    fn test_unknown_model_rejected_before_any_work() {
        let (pipeline, calls) = offline_pipeline(RaceConfig::builtin(), ModelCatalog::detect());
        let result = pipeline.run(&RaceRequest::historical("mexico"), &["quantum_forest"]);

        assert!(matches!(
            result,
            Err(Error::Training(TrainingError::UnknownModelKind { .. }))
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_unavailable_kind_is_skipped() {
        let mut tables = RaceConfig::builtin().tables().clone();
        tables.models.gradient_boosting = GradientBoostingConfig {
            n_estimators: 10,
            ..Default::default()
        };
        let config = RaceConfig::new(tables).unwrap();
        let (pipeline, _) = offline_pipeline(config, ModelCatalog::new(false));

        let report = pipeline
            .run(&RaceRequest::historical("monaco"), &["gradient_boosting", "lightgbm"])
            .unwrap();
        assert_eq!(report.models.len(), 1);
        assert_eq!(report.models[0].kind, ModelKind::GradientBoosting);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ModelKind::LightGbm);
    }

    #[test]
    fn test_failing_model_does_not_abort_others() {
        let mut tables = RaceConfig::builtin().tables().clone();
        tables.models.random_forest.n_estimators = 0;
        tables.models.gradient_boosting.n_estimators = 10;
        let config = RaceConfig::new(tables).unwrap();
        let (pipeline, _) = offline_pipeline(config, ModelCatalog::new(false));

        let report = pipeline
            .run(&RaceRequest::historical("mexico"), &["random_forest", "gradient_boosting"])
            .unwrap();
        assert_eq!(report.models.len(), 1);
        assert_eq!(report.models[0].kind, ModelKind::GradientBoosting);
        assert_eq!(report.failures[0].kind, ModelKind::RandomForest);
        assert!(report.best_model().is_some());
    }

    #[test]
    fn test_unknown_track_is_error() {
        let (pipeline, calls) = offline_pipeline(RaceConfig::builtin(), ModelCatalog::detect());
        let result = pipeline.prepare_training_data(&RaceRequest::historical("spa"));
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let cache = tempfile::tempdir().unwrap();
        let settings = Settings {
            weather_api_key: Some(String::new()),
            cache_dir: cache.path().to_path_buf(),
            weather: WeatherConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                timeout_secs: 2,
            },
            ..Settings::default()
        };
        let pipeline = RacePipeline::from_settings(RaceConfig::builtin(), &settings).unwrap();

        let result = pipeline
            .weather_client()
            .try_fetch(pipeline.config(), "mexico", None);
        assert!(matches!(
            result,
            Err(WeatherError::Config(ConfigError::MissingApiKey))
        ));
    }

    #[test]
    fn test_rank_predictions() {
        let row = |driver: &str, name: Option<&str>| FeatureRow {
            driver: driver.to_string(),
            full_name: name.map(str::to_string),
            team: None,
            qualifying_time: None,
            team_score: None,
            clean_air_pace: None,
            position_change: None,
            total_sector_time: None,
            temperature: 22.0,
            rain_probability: 0.0,
        };
        let rows = vec![
            row("VER", Some("Max Verstappen")),
            row("NOR", Some("Lando Norris")),
            row("XYZ", None),
        ];
        let ranking = rank_predictions(&rows, &Array1::from_vec(vec![75.2, 74.9, 74.9]));

        assert_eq!(ranking[0].driver, "NOR");
        assert_eq!(ranking[1].driver, "XYZ");
        assert_eq!(ranking[1].full_name, "XYZ");
        assert_eq!(ranking[1].team, "Unknown");
        assert_eq!(ranking[2].full_name, "Max Verstappen");
        assert_valid_ranking(&ranking);
    }
}
