//! OpenF1 timing client
//!
//! Resolves (year, round, session) to an OpenF1 session key, then pulls the
//! driver list and per-lap durations for that session.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::session::{RawLap, SessionKey, TimingError, TimingProvider};

const DEFAULT_BASE_URL: &str = "https://api.openf1.org/v1";

/// OpenF1 client configuration
#[derive(Debug, Clone)]
pub struct OpenF1Config {
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for OpenF1Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: concat!("f1-predict/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    session_key: u64,
    #[serde(default)]
    date_start: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriverInfo {
    driver_number: u32,
    #[serde(default)]
    name_acronym: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LapInfo {
    driver_number: u32,
    #[serde(default)]
    lap_duration: Option<f64>,
    #[serde(default)]
    duration_sector_1: Option<f64>,
    #[serde(default)]
    duration_sector_2: Option<f64>,
    #[serde(default)]
    duration_sector_3: Option<f64>,
}

/// Blocking OpenF1 client
pub struct OpenF1Client {
    client: reqwest::blocking::Client,
    config: OpenF1Config,
}

impl OpenF1Client {
    pub fn new(config: OpenF1Config) -> Result<Self, TimingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client, config })
    }

    fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, TimingError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);
        debug!("GET {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send()?;
        let response = response.error_for_status()?;
        Ok(response.json()?)
    }

    /// Resolve the provider session key for the n-th session of this type in a season
    fn session_key(&self, key: &SessionKey) -> Result<u64, TimingError> {
        let mut sessions: Vec<SessionInfo> = self.get(
            "sessions",
            &[
                ("year", key.year.to_string()),
                ("session_name", key.session.provider_name().to_string()),
            ],
        )?;
        sessions.sort_by(|a, b| a.date_start.cmp(&b.date_start));

        let index = key.round.checked_sub(1).ok_or(TimingError::SessionNotFound {
            year: key.year,
            round: key.round,
            session: key.session,
        })?;

        sessions
            .get(index as usize)
            .map(|s| s.session_key)
            .ok_or(TimingError::SessionNotFound {
                year: key.year,
                round: key.round,
                session: key.session,
            })
    }

    fn driver_codes(&self, session_key: u64) -> Result<HashMap<u32, String>, TimingError> {
        let drivers: Vec<DriverInfo> =
            self.get("drivers", &[("session_key", session_key.to_string())])?;

        Ok(drivers
            .into_iter()
            .filter_map(|d| d.name_acronym.map(|code| (d.driver_number, code)))
            .collect())
    }
}

impl TimingProvider for OpenF1Client {
    fn fetch_laps(&self, key: &SessionKey) -> Result<Vec<RawLap>, TimingError> {
        let session_key = self.session_key(key)?;
        let codes = self.driver_codes(session_key)?;
        let laps: Vec<LapInfo> = self.get("laps", &[("session_key", session_key.to_string())])?;

        Ok(to_raw_laps(laps, &codes))
    }
}

/// Attach driver codes; laps from unknown car numbers are dropped
fn to_raw_laps(laps: Vec<LapInfo>, codes: &HashMap<u32, String>) -> Vec<RawLap> {
    laps.into_iter()
        .filter_map(|lap| {
            let driver = codes.get(&lap.driver_number)?.clone();
            Some(RawLap {
                driver,
                lap_time: lap.lap_duration,
                sector1: lap.duration_sector_1,
                sector2: lap.duration_sector_2,
                sector3: lap.duration_sector_3,
            })
        })
        .collect()
}
