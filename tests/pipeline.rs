//! Integration tests for the race prediction pipeline (no network)

use std::collections::HashSet;

use f1_predict::data::{
    RawLap, SessionLoader, SyntheticLapGenerator, TimingError, TimingProvider, SYNTHETIC_DRIVERS,
};
use f1_predict::predictor::{RacePipeline, RaceRequest};
use f1_predict::training::ModelKind;
use f1_predict::weather::{WeatherClient, WeatherConfig};
use f1_predict::{DataSource, ModelCatalog, RaceConfig, SessionKey, SessionType};

const LIVE_DRIVERS: [&str; 6] = ["VER", "NOR", "LEC", "PIA", "HAM", "RUS"];

struct FixedProvider {
    laps: Vec<RawLap>,
}

impl TimingProvider for FixedProvider {
    fn fetch_laps(&self, _key: &SessionKey) -> Result<Vec<RawLap>, TimingError> {
        Ok(self.laps.clone())
    }
}

struct OfflineProvider;

impl TimingProvider for OfflineProvider {
    fn fetch_laps(&self, _key: &SessionKey) -> Result<Vec<RawLap>, TimingError> {
        Err(TimingError::Unavailable("offline".to_string()))
    }
}

fn live_laps() -> Vec<RawLap> {
    let mut laps = Vec::new();
    for (i, driver) in LIVE_DRIVERS.iter().enumerate() {
        for lap in 0..3 {
            let base = 22.0 + i as f64 * 0.15 + lap as f64 * 0.05;
            laps.push(RawLap {
                driver: driver.to_string(),
                lap_time: Some(base * 3.0 + 6.0),
                sector1: Some(base),
                sector2: Some(base + 1.0),
                sector3: Some(base - 1.0),
            });
        }
    }
    // incomplete lap is dropped
    laps.push(RawLap {
        driver: "VER".to_string(),
        lap_time: Some(80.0),
        sector1: None,
        sector2: Some(25.0),
        sector3: Some(25.0),
    });
    laps
}

fn offline_weather() -> WeatherClient {
    WeatherClient::new(
        WeatherConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        },
        Some("test-key".to_string()),
    )
    .unwrap()
}

fn fast_config() -> RaceConfig {
    let mut tables = RaceConfig::builtin().tables().clone();
    tables.models.gradient_boosting.n_estimators = 20;
    tables.models.random_forest.n_estimators = 10;
    tables.models.lightgbm.n_estimators = 20;
    RaceConfig::new(tables).unwrap()
}

fn pipeline_with(provider: Box<dyn TimingProvider>, config: RaceConfig) -> RacePipeline {
    RacePipeline::new(
        config,
        SessionLoader::new(provider, SyntheticLapGenerator::default()),
        offline_weather(),
        ModelCatalog::detect(),
    )
}

#[test]
fn test_live_laps_restrict_the_field() {
    let pipeline = pipeline_with(
        Box::new(FixedProvider { laps: live_laps() }),
        fast_config(),
    );
    let report = pipeline
        .run(&RaceRequest::historical("mexico"), &["gradient_boosting"])
        .unwrap();

    assert_eq!(report.provenance.laps, DataSource::Live);
    assert_eq!(report.provenance.weather, DataSource::Fallback);

    let ranking = &report.models[0].ranking;
    let drivers: HashSet<&str> = ranking.iter().map(|r| r.driver.as_str()).collect();
    assert_eq!(drivers, LIVE_DRIVERS.iter().copied().collect());
    // ceil(0.3 * 6)
    assert_eq!(report.models[0].test_rows, 2);

    let verstappen = ranking.iter().find(|r| r.driver == "VER").unwrap();
    assert_eq!(verstappen.full_name, "Max Verstappen");
    assert_eq!(verstappen.team, "Red Bull Racing");
}

#[test]
fn test_every_available_model_on_synthetic_data() {
    let pipeline = pipeline_with(Box::new(OfflineProvider), fast_config());
    let report = pipeline.run(&RaceRequest::historical("mexico"), &[]).unwrap();

    assert_eq!(report.provenance.laps, DataSource::Fallback);
    assert!(report.failures.is_empty());
    assert_eq!(report.models.len(), ModelCatalog::detect().available().len());
    for model in &report.models {
        assert!(model.metrics.is_finite(), "{} metrics", model.kind);
        assert_eq!(model.ranking.len(), SYNTHETIC_DRIVERS.len());
        for pair in model.ranking.windows(2) {
            assert!(pair[0].predicted_time <= pair[1].predicted_time);
        }
    }

    let best = report.best_model().unwrap();
    assert!(report
        .models
        .iter()
        .all(|m| best.metrics.mae <= m.metrics.mae));
}

#[test]
fn test_monaco_missing_qualifying_time_is_imputed() {
    let pipeline = pipeline_with(Box::new(OfflineProvider), fast_config());
    let request = RaceRequest::historical("monaco");

    let data = pipeline.prepare_training_data(&request).unwrap();
    let russell = data.table.rows.iter().find(|r| r.driver == "RUS").unwrap();
    assert_eq!(russell.qualifying_time, None);

    let report = pipeline
        .run(&request, &["gradient_boosting", "random_forest"])
        .unwrap();
    assert_eq!(report.models.len(), 2);
    for model in &report.models {
        assert!(model.ranking.iter().all(|r| r.predicted_time.is_finite()));
    }
}

#[test]
fn test_session_cache_serves_later_runs() {
    let dir = tempfile::tempdir().unwrap();
    let key = SessionKey::new(2024, 20, SessionType::Race);

    let first = SessionLoader::with_cache(
        FixedProvider { laps: live_laps() },
        dir.path(),
        SyntheticLapGenerator::default(),
    )
    .unwrap();
    let laps = first.load(&key);
    assert_eq!(laps.source, DataSource::Live);
    assert!(dir.path().join("2024_20_R.json").exists());

    let second =
        SessionLoader::with_cache(OfflineProvider, dir.path(), SyntheticLapGenerator::default())
            .unwrap();
    let cached = second.load(&key);
    assert_eq!(cached.source, DataSource::Live);
    assert_eq!(cached.value, laps.value);
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.json");
    let builtin = RaceConfig::builtin();
    std::fs::write(&path, serde_json::to_string_pretty(builtin.tables()).unwrap()).unwrap();

    let loaded = RaceConfig::load(&path).unwrap();
    assert_eq!(loaded.tracks(), builtin.tracks());
    assert_eq!(loaded.driver_name("LEC"), Some("Charles Leclerc"));
    assert_eq!(loaded.models().test_size, builtin.models().test_size);
    assert_eq!(loaded.models().random_state, builtin.models().random_state);
    assert_eq!(loaded.team_score("McLaren"), builtin.team_score("McLaren"));
}

#[test]
fn test_unknown_model_kind_is_fatal() {
    let pipeline = pipeline_with(Box::new(OfflineProvider), fast_config());
    let err = pipeline
        .run(&RaceRequest::historical("mexico"), &["quantum_forest"])
        .unwrap_err();
    assert!(err.to_string().contains("quantum_forest"));
}

#[test]
fn test_model_kind_names() {
    for kind in ModelKind::ALL {
        assert_eq!(ModelKind::from_name(kind.as_str()), Some(kind));
    }
}
