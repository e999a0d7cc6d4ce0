//! Race weather from the OpenWeatherMap 5-day forecast
//!
//! Every failure path (unknown track, missing API key, transport error,
//! malformed body, no forecast at the requested time) degrades to
//! [`Weather::default`] tagged as fallback.

use chrono::NaiveDateTime;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{
    ConfigError, RaceConfig, DEFAULT_RAIN_PROBABILITY, DEFAULT_TEMPERATURE, FORECAST_TIME_FORMAT,
};
use crate::models::{Sourced, Weather};

const DEFAULT_BASE_URL: &str = "http://api.openweathermap.org";
const FORECAST_PATH: &str = "data/2.5/forecast";

/// Weather errors
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No forecast time given and no default for track '{0}'")]
    NoForecastTime(String),

    #[error("Invalid forecast time '{0}', expected YYYY-MM-DD HH:MM:SS")]
    InvalidForecastTime(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Weather API error: {0}")]
    Api(String),

    #[error("Malformed forecast response: {0}")]
    MalformedResponse(String),

    #[error("No forecast found for {0}")]
    NoMatchingForecast(String),
}

/// Weather client configuration
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 5,
        }
    }
}

/// Blocking forecast client
pub struct WeatherClient {
    client: reqwest::blocking::Client,
    config: WeatherConfig,
    api_key: Option<String>,
}

impl WeatherClient {
    pub fn new(config: WeatherConfig, api_key: Option<String>) -> Result<Self, WeatherError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Forecast for a track at `forecast_time` (or the track's default race time)
    ///
    /// Never fails: errors are logged and replaced by default conditions.
    pub fn fetch(
        &self,
        race: &RaceConfig,
        track: &str,
        forecast_time: Option<&str>,
    ) -> Sourced<Weather> {
        match self.try_fetch(race, track, forecast_time) {
            Ok(weather) => {
                info!(
                    "Weather for {}: {:.1}°C, {:.0}% rain",
                    track,
                    weather.temperature,
                    weather.rain_probability * 100.0
                );
                Sourced::live(weather)
            }
            Err(e) => {
                warn!("{}. Using default weather values.", e);
                Sourced::fallback(Weather::default())
            }
        }
    }

    /// Forecast lookup with the failure reason preserved
    pub fn try_fetch(
        &self,
        race: &RaceConfig,
        track: &str,
        forecast_time: Option<&str>,
    ) -> Result<Weather, WeatherError> {
        // local checks first; no request is made if any fails
        let coords = race.track_coordinates(track)?;
        let api_key = self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)?;
        let time = forecast_time
            .or_else(|| race.forecast_time(track))
            .ok_or_else(|| WeatherError::NoForecastTime(track.to_string()))?;
        NaiveDateTime::parse_from_str(time, FORECAST_TIME_FORMAT)
            .map_err(|_| WeatherError::InvalidForecastTime(time.to_string()))?;

        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), FORECAST_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
                ("appid", api_key.to_string()),
                ("units", "metric".to_string()),
            ])
            .send()?;

        let status = response.status();
        let body: Value = response.json()?;
        if !status.is_success() {
            return Err(WeatherError::Api(
                api_message(&body).unwrap_or_else(|| status.to_string()),
            ));
        }

        parse_forecast(&body, time)
    }
}

fn api_message(body: &Value) -> Option<String> {
    match body.get("message")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Pick the forecast entry whose `dt_txt` equals `forecast_time` exactly
pub fn parse_forecast(body: &Value, forecast_time: &str) -> Result<Weather, WeatherError> {
    let list = match body.get("list") {
        Some(list) => list,
        None => {
            return Err(match api_message(body) {
                Some(message) => WeatherError::Api(message),
                None => WeatherError::MalformedResponse("missing 'list'".to_string()),
            })
        }
    };

    let entries = list
        .as_array()
        .ok_or_else(|| WeatherError::MalformedResponse("'list' is not an array".to_string()))?;

    let entry = entries
        .iter()
        .find(|e| e.get("dt_txt").and_then(Value::as_str) == Some(forecast_time))
        .ok_or_else(|| WeatherError::NoMatchingForecast(forecast_time.to_string()))?;

    let temperature = entry
        .get("main")
        .and_then(|m| m.get("temp"))
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_TEMPERATURE);
    let rain_probability = entry
        .get("pop")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_RAIN_PROBABILITY);

    Ok(Weather {
        temperature,
        rain_probability,
    })
}
