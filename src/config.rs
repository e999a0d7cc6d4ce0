//! Race configuration: roster, teams, tracks and model settings
//!
//! [`RaceConfig`] is built once (from the built-in tables or a JSON file) and
//! passed by reference to everything that needs it. Team performance scores are
//! derived from championship points when the config is constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data::{OpenF1Config, SYNTHETIC_LAPS_PER_DRIVER};
use crate::training::{GradientBoostingConfig, LightGbmConfig, RandomForestConfig};
use crate::weather::WeatherConfig;

/// Fallback temperature (Celsius) when no forecast is available
pub const DEFAULT_TEMPERATURE: f64 = 22.0;
/// Fallback rain probability when no forecast is available
pub const DEFAULT_RAIN_PROBABILITY: f64 = 0.0;
/// Forecast timestamp format used by the weather provider (`dt_txt`)
pub const FORECAST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";
const CACHE_DIR_ENV: &str = "F1_CACHE_DIR";
const DEFAULT_CACHE_DIR: &str = "f1_cache";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "OPENWEATHER_API_KEY environment variable is not set. \
         Please set it using: export OPENWEATHER_API_KEY='your_key_here'"
    )]
    MissingApiKey,

    #[error("Track '{track}' not found. Available tracks: {available:?}")]
    UnknownTrack {
        track: String,
        available: Vec<String>,
    },

    #[error("Track '{0}' not found in qualifying data")]
    MissingQualifying(String),

    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Track location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One driver's qualifying lap (seconds); `None` when the driver set no time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifyingTime {
    pub driver: String,
    pub time: Option<f64>,
}

/// Train/test split and per-model hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed for the train/test split
    pub random_state: u64,
    pub gradient_boosting: GradientBoostingConfig,
    pub random_forest: RandomForestConfig,
    pub lightgbm: LightGbmConfig,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            test_size: 0.3,
            random_state: 37,
            gradient_boosting: GradientBoostingConfig::default(),
            random_forest: RandomForestConfig::default(),
            lightgbm: LightGbmConfig::default(),
        }
    }
}

/// Raw configuration tables, as stored in a config file
///
/// Track keys are lowercase. Tables are validated and turned into a
/// [`RaceConfig`] with [`RaceConfig::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceTables {
    pub driver_names: BTreeMap<String, String>,
    pub driver_teams: BTreeMap<String, String>,
    pub team_points: BTreeMap<String, u32>,
    pub track_coordinates: BTreeMap<String, Coordinates>,
    /// Default forecast time per track ("YYYY-MM-DD HH:MM:SS", UTC)
    pub forecast_times: BTreeMap<String, String>,
    /// Representative clean-air lap time per track and driver (seconds)
    pub clean_air_pace: BTreeMap<String, BTreeMap<String, f64>>,
    /// Average qualifying-to-finish position change per track and driver
    pub position_change: BTreeMap<String, BTreeMap<String, f64>>,
    /// Qualifying table per track, in grid-sheet order
    pub qualifying: BTreeMap<String, Vec<QualifyingTime>>,
    #[serde(default)]
    pub models: ModelSettings,
}

/// Immutable race configuration
#[derive(Debug, Clone)]
pub struct RaceConfig {
    tables: RaceTables,
    team_scores: BTreeMap<String, f64>,
}

impl RaceConfig {
    /// Validate tables and derive team performance scores
    pub fn new(mut tables: RaceTables) -> Result<Self, ConfigError> {
        if !tables.team_points.values().any(|&points| points > 0) {
            return Err(ConfigError::Invalid(
                "team_points must contain at least one team with points".to_string(),
            ));
        }

        let test_size = tables.models.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_size must be between 0 and 1, got {}",
                test_size
            )));
        }

        // Track lookups are case-insensitive
        tables.track_coordinates = lowercase_keys(tables.track_coordinates);
        tables.forecast_times = lowercase_keys(tables.forecast_times);
        tables.clean_air_pace = lowercase_keys(tables.clean_air_pace);
        tables.position_change = lowercase_keys(tables.position_change);
        tables.qualifying = lowercase_keys(tables.qualifying);

        Ok(Self {
            team_scores: team_scores(&tables.team_points),
            tables,
        })
    }

    /// Built-in configuration for the 2025 Mexico and Monaco races
    pub fn builtin() -> Self {
        let tables = builtin_tables();
        Self {
            team_scores: team_scores(&tables.team_points),
            tables,
        }
    }

    /// Load configuration tables from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tables: RaceTables =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(tables)
    }

    /// The underlying tables (for dumping or deriving a modified config)
    pub fn tables(&self) -> &RaceTables {
        &self.tables
    }

    pub fn models(&self) -> &ModelSettings {
        &self.tables.models
    }

    pub fn driver_name(&self, driver: &str) -> Option<&str> {
        self.tables.driver_names.get(driver).map(String::as_str)
    }

    pub fn driver_team(&self, driver: &str) -> Option<&str> {
        self.tables.driver_teams.get(driver).map(String::as_str)
    }

    /// Normalized team score: points / max(points) across all teams
    pub fn team_score(&self, team: &str) -> Option<f64> {
        self.team_scores.get(team).copied()
    }

    /// Known tracks (those with coordinates)
    pub fn tracks(&self) -> Vec<String> {
        self.tables.track_coordinates.keys().cloned().collect()
    }

    /// Get track coordinates by track name
    pub fn track_coordinates(&self, track: &str) -> Result<Coordinates, ConfigError> {
        self.tables
            .track_coordinates
            .get(&track.to_lowercase())
            .copied()
            .ok_or_else(|| ConfigError::UnknownTrack {
                track: track.to_string(),
                available: self.tracks(),
            })
    }

    /// Default race forecast time for a track
    pub fn forecast_time(&self, track: &str) -> Option<&str> {
        self.tables
            .forecast_times
            .get(&track.to_lowercase())
            .map(String::as_str)
    }

    pub fn clean_air_pace(&self, track: &str, driver: &str) -> Option<f64> {
        self.tables
            .clean_air_pace
            .get(&track.to_lowercase())
            .and_then(|by_driver| by_driver.get(driver))
            .copied()
    }

    pub fn position_change(&self, track: &str, driver: &str) -> Option<f64> {
        self.tables
            .position_change
            .get(&track.to_lowercase())
            .and_then(|by_driver| by_driver.get(driver))
            .copied()
    }

    /// Qualifying table for a track
    pub fn qualifying(&self, track: &str) -> Result<&[QualifyingTime], ConfigError> {
        self.tables
            .qualifying
            .get(&track.to_lowercase())
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::MissingQualifying(track.to_string()))
    }
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

/// points / max(points) per team
fn team_scores(points: &BTreeMap<String, u32>) -> BTreeMap<String, f64> {
    let max_points = points.values().copied().max().unwrap_or(0).max(1) as f64;
    points
        .iter()
        .map(|(team, &p)| (team.clone(), p as f64 / max_points))
        .collect()
}

fn lowercase_keys<V>(map: BTreeMap<String, V>) -> BTreeMap<String, V> {
    map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

/// Runtime settings taken from the environment and command line
#[derive(Debug, Clone)]
pub struct Settings {
    pub weather_api_key: Option<String>,
    pub cache_dir: PathBuf,
    pub synthetic_laps_per_driver: usize,
    pub weather: WeatherConfig,
    pub timing: OpenF1Config,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            weather_api_key: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            synthetic_laps_per_driver: SYNTHETIC_LAPS_PER_DRIVER,
            weather: WeatherConfig::default(),
            timing: OpenF1Config::default(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    ///
    /// The cache directory defaults to `./f1_cache` unless `F1_CACHE_DIR` is set.
    pub fn from_env() -> Self {
        let weather_api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        let cache_dir = std::env::var(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::current_dir()
                    .map(|dir| dir.join(DEFAULT_CACHE_DIR))
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR))
            });

        Self {
            weather_api_key,
            cache_dir,
            ..Self::default()
        }
    }

    /// Get the weather API key or fail with a configuration error
    pub fn weather_api_key(&self) -> Result<&str, ConfigError> {
        match self.weather_api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}

fn builtin_tables() -> RaceTables {
    fn table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|&(d, v)| (d.to_string(), v)).collect()
    }

    fn strings(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn grid(entries: &[(&str, Option<f64>)]) -> Vec<QualifyingTime> {
        entries
            .iter()
            .map(|&(driver, time)| QualifyingTime {
                driver: driver.to_string(),
                time,
            })
            .collect()
    }

    let driver_names = strings(&[
        ("VER", "Max Verstappen"),
        ("NOR", "Lando Norris"),
        ("PIA", "Oscar Piastri"),
        ("RUS", "George Russell"),
        ("SAI", "Carlos Sainz"),
        ("ALB", "Alexander Albon"),
        ("LEC", "Charles Leclerc"),
        ("OCO", "Esteban Ocon"),
        ("HAM", "Lewis Hamilton"),
        ("STR", "Lance Stroll"),
        ("GAS", "Pierre Gasly"),
        ("ALO", "Fernando Alonso"),
        ("HUL", "Nico Hülkenberg"),
        ("TSU", "Yuki Tsunoda"),
    ]);

    let driver_teams = strings(&[
        ("VER", "Red Bull Racing"),
        ("NOR", "McLaren"),
        ("PIA", "McLaren"),
        ("LEC", "Ferrari"),
        ("RUS", "Mercedes"),
        ("HAM", "Mercedes"),
        ("GAS", "Alpine"),
        ("ALO", "Aston Martin"),
        ("TSU", "Racing Bulls"),
        ("SAI", "Ferrari"),
        ("HUL", "Kick Sauber"),
        ("OCO", "Alpine"),
        ("STR", "Aston Martin"),
        ("ALB", "Williams"),
    ]);

    let team_points: BTreeMap<String, u32> = [
        ("McLaren", 279),
        ("Mercedes", 147),
        ("Red Bull Racing", 131),
        ("Williams", 51),
        ("Ferrari", 114),
        ("Haas", 20),
        ("Aston Martin", 14),
        ("Kick Sauber", 6),
        ("Racing Bulls", 10),
        ("Alpine", 7),
    ]
    .iter()
    .map(|&(team, points)| (team.to_string(), points))
    .collect();

    let track_coordinates: BTreeMap<String, Coordinates> = [
        ("mexico", Coordinates { lat: 19.40, lon: -99.10 }),
        ("monaco", Coordinates { lat: 43.7384, lon: 7.4246 }),
    ]
    .iter()
    .map(|&(track, coords)| (track.to_string(), coords))
    .collect();

    let forecast_times = strings(&[
        ("mexico", "2025-10-26 20:00:00"),
        ("monaco", "2025-05-25 13:00:00"),
    ]);

    let mut clean_air_pace = BTreeMap::new();
    clean_air_pace.insert(
        "mexico".to_string(),
        table(&[
            ("VER", 74.800),
            ("HAM", 75.350),
            ("LEC", 74.950),
            ("NOR", 74.900),
            ("ALO", 75.600),
            ("PIA", 75.050),
            ("RUS", 75.300),
            ("SAI", 75.200),
            ("STR", 75.800),
            ("HUL", 76.100),
            ("OCO", 76.250),
            ("ALB", 75.900),
            ("GAS", 76.300),
        ]),
    );
    clean_air_pace.insert(
        "monaco".to_string(),
        table(&[
            ("VER", 93.191067),
            ("HAM", 94.020622),
            ("LEC", 93.418667),
            ("NOR", 93.428600),
            ("ALO", 94.784333),
            ("PIA", 93.232111),
            ("RUS", 93.833378),
            ("SAI", 94.497444),
            ("STR", 95.318250),
            ("HUL", 95.345455),
            ("OCO", 95.682128),
        ]),
    );

    let mut position_change = BTreeMap::new();
    position_change.insert(
        "mexico".to_string(),
        table(&[
            ("VER", -0.5),
            ("NOR", 1.5),
            ("PIA", 1.0),
            ("RUS", -0.2),
            ("SAI", 0.8),
            ("ALB", 1.5),
            ("LEC", 0.5),
            ("OCO", 1.2),
            ("HAM", -0.4),
            ("STR", 2.0),
            ("GAS", 0.7),
            ("ALO", 0.0),
            ("HUL", 1.0),
        ]),
    );
    position_change.insert(
        "monaco".to_string(),
        table(&[
            ("VER", -1.0),
            ("NOR", 1.0),
            ("PIA", 0.2),
            ("RUS", 0.5),
            ("SAI", -0.3),
            ("ALB", 0.8),
            ("LEC", -1.5),
            ("OCO", -0.2),
            ("HAM", 0.3),
            ("STR", 1.1),
            ("GAS", -0.4),
            ("ALO", -0.6),
            ("HUL", 0.0),
        ]),
    );

    let mut qualifying = BTreeMap::new();
    qualifying.insert(
        "mexico".to_string(),
        grid(&[
            ("VER", Some(71.350)),
            ("NOR", Some(71.800)),
            ("PIA", Some(71.950)),
            ("RUS", Some(72.050)),
            ("SAI", Some(72.150)),
            ("ALB", Some(72.400)),
            ("LEC", Some(71.700)),
            ("OCO", Some(72.500)),
            ("HAM", Some(71.900)),
            ("STR", Some(72.800)),
            ("GAS", Some(72.700)),
            ("ALO", Some(72.300)),
            ("HUL", Some(72.600)),
        ]),
    );
    qualifying.insert(
        "monaco".to_string(),
        grid(&[
            ("VER", Some(70.669)),
            ("NOR", Some(69.954)),
            ("PIA", Some(70.129)),
            ("RUS", None),
            ("SAI", Some(71.362)),
            ("ALB", Some(71.213)),
            ("LEC", Some(70.063)),
            ("OCO", Some(70.942)),
            ("HAM", Some(70.382)),
            ("STR", Some(72.563)),
            ("GAS", Some(71.994)),
            ("ALO", Some(70.924)),
            ("HUL", Some(71.596)),
        ]),
    );

    RaceTables {
        driver_names,
        driver_teams,
        team_points,
        track_coordinates,
        forecast_times,
        clean_air_pace,
        position_change,
        qualifying,
        models: ModelSettings::default(),
    }
}
