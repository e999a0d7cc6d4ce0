use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{DEFAULT_RAIN_PROBABILITY, DEFAULT_TEMPERATURE};

/// One observed lap for one driver in one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub driver: String,
    pub lap_time: Duration,
    pub sector1: Duration,
    pub sector2: Duration,
    pub sector3: Duration,
}

impl LapRecord {
    pub fn lap_time_secs(&self) -> f64 {
        self.lap_time.as_secs_f64()
    }

    /// Sector times in seconds, in track order
    pub fn sector_secs(&self) -> [f64; 3] {
        [
            self.sector1.as_secs_f64(),
            self.sector2.as_secs_f64(),
            self.sector3.as_secs_f64(),
        ]
    }
}

/// Where a piece of input data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fetched from the external provider
    Live,
    /// Substituted after the provider failed
    Fallback,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Live => write!(f, "live"),
            DataSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A value tagged with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Sourced<T> {
    pub fn live(value: T) -> Self {
        Self {
            value,
            source: DataSource::Live,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            source: DataSource::Fallback,
        }
    }

    pub fn is_live(&self) -> bool {
        self.source == DataSource::Live
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Track-level race weather
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Celsius
    pub temperature: f64,
    /// Probability of precipitation in [0, 1]
    pub rain_probability: f64,
}

impl Default for Weather {
    /// Conditions assumed when no forecast is available
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            rain_probability: DEFAULT_RAIN_PROBABILITY,
        }
    }
}

/// Qualifying result plus static per-driver context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifyingEntry {
    pub driver: String,
    pub qualifying_time: Option<f64>,
    pub team: Option<String>,
    pub team_score: Option<f64>,
    pub clean_air_pace: Option<f64>,
    pub position_change: Option<f64>,
}

/// Model input for one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub driver: String,
    pub full_name: Option<String>,
    pub team: Option<String>,
    pub qualifying_time: Option<f64>,
    pub team_score: Option<f64>,
    pub clean_air_pace: Option<f64>,
    pub position_change: Option<f64>,
    /// Sum of the driver's mean sector times; `None` without laps
    pub total_sector_time: Option<f64>,
    pub temperature: f64,
    pub rain_probability: f64,
}

/// One line of the predicted classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDriver {
    /// 1-based
    pub position: usize,
    pub driver: String,
    pub full_name: String,
    pub team: String,
    /// Predicted average race lap time (seconds)
    pub predicted_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lap_record_seconds() {
        let lap = LapRecord {
            driver: "VER".to_string(),
            lap_time: Duration::from_secs_f64(74.5),
            sector1: Duration::from_secs_f64(24.0),
            sector2: Duration::from_secs_f64(25.25),
            sector3: Duration::from_secs_f64(25.25),
        };
        assert!((lap.lap_time_secs() - 74.5).abs() < 1e-9);
        let sectors = lap.sector_secs();
        assert!((sectors.iter().sum::<f64>() - 74.5).abs() < 1e-9);
    }

    #[test]
    fn test_sourced_provenance() {
        let live = Sourced::live(1);
        assert!(live.is_live());
        let fallback = Sourced::fallback(2);
        assert!(!fallback.is_live());
        assert_eq!(fallback.into_inner(), 2);
    }

    #[test]
    fn test_default_weather() {
        let weather = Weather::default();
        assert_eq!(weather.temperature, 22.0);
        assert_eq!(weather.rain_probability, 0.0);
    }

    #[test]
    fn test_data_source_display() {
        assert_eq!(DataSource::Live.to_string(), "live");
        assert_eq!(DataSource::Fallback.to_string(), "fallback");
    }
}
