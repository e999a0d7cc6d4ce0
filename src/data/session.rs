//! Session lap loading with synthetic fallback

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::cache::{CachedProvider, SessionCache};
use super::synthetic::SyntheticLapGenerator;
use crate::models::{LapRecord, Sourced};

/// Timing provider errors
#[derive(Debug, Error)]
pub enum TimingError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Unknown session type '{0}'. Expected one of: FP1, FP2, FP3, SQ, S, Q, R")]
    UnknownSessionType(String),

    #[error("No {session} session found for {year} round {round}")]
    SessionNotFound {
        year: i32,
        round: u32,
        session: SessionType,
    },

    #[error("No valid lap data found in session")]
    NoValidLaps,

    #[error("Timing provider unavailable: {0}")]
    Unavailable(String),
}

/// Session type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Practice1,
    Practice2,
    Practice3,
    SprintQualifying,
    Sprint,
    Qualifying,
    Race,
}

impl SessionType {
    /// Short code ("R", "Q", "FP1", ...)
    pub fn code(&self) -> &'static str {
        match self {
            SessionType::Practice1 => "FP1",
            SessionType::Practice2 => "FP2",
            SessionType::Practice3 => "FP3",
            SessionType::SprintQualifying => "SQ",
            SessionType::Sprint => "S",
            SessionType::Qualifying => "Q",
            SessionType::Race => "R",
        }
    }

    /// Session name as published by the timing provider
    pub fn provider_name(&self) -> &'static str {
        match self {
            SessionType::Practice1 => "Practice 1",
            SessionType::Practice2 => "Practice 2",
            SessionType::Practice3 => "Practice 3",
            SessionType::SprintQualifying => "Sprint Qualifying",
            SessionType::Sprint => "Sprint",
            SessionType::Qualifying => "Qualifying",
            SessionType::Race => "Race",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

impl FromStr for SessionType {
    type Err = TimingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FP1" => Ok(SessionType::Practice1),
            "FP2" => Ok(SessionType::Practice2),
            "FP3" => Ok(SessionType::Practice3),
            "SQ" => Ok(SessionType::SprintQualifying),
            "S" => Ok(SessionType::Sprint),
            "Q" => Ok(SessionType::Qualifying),
            "R" => Ok(SessionType::Race),
            _ => Err(TimingError::UnknownSessionType(s.to_string())),
        }
    }
}

/// Session identity: (year, round, session type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub year: i32,
    pub round: u32,
    pub session: SessionType,
}

impl SessionKey {
    pub fn new(year: i32, round: u32, session: SessionType) -> Self {
        Self {
            year,
            round,
            session,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Round {} {}", self.year, self.round, self.session.code())
    }
}

/// Lap row as delivered by the provider (seconds, any field may be missing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLap {
    pub driver: String,
    pub lap_time: Option<f64>,
    pub sector1: Option<f64>,
    pub sector2: Option<f64>,
    pub sector3: Option<f64>,
}

impl RawLap {
    /// Convert to a lap record if lap time and all three sectors are present
    pub fn complete(&self) -> Option<LapRecord> {
        let lap_time = positive_duration(self.lap_time?)?;
        let sector1 = positive_duration(self.sector1?)?;
        let sector2 = positive_duration(self.sector2?)?;
        let sector3 = positive_duration(self.sector3?)?;

        Some(LapRecord {
            driver: self.driver.clone(),
            lap_time,
            sector1,
            sector2,
            sector3,
        })
    }
}

fn positive_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Source of raw session laps
pub trait TimingProvider {
    fn fetch_laps(&self, key: &SessionKey) -> Result<Vec<RawLap>, TimingError>;
}

impl<P: TimingProvider + ?Sized> TimingProvider for Box<P> {
    fn fetch_laps(&self, key: &SessionKey) -> Result<Vec<RawLap>, TimingError> {
        (**self).fetch_laps(key)
    }
}

/// Drop incomplete rows; an empty result is an error
pub fn complete_laps(raw: &[RawLap]) -> Result<Vec<LapRecord>, TimingError> {
    let laps: Vec<LapRecord> = raw.iter().filter_map(RawLap::complete).collect();
    if laps.is_empty() {
        return Err(TimingError::NoValidLaps);
    }
    Ok(laps)
}

/// Loads session laps, substituting synthetic data on any failure
pub struct SessionLoader {
    provider: Box<dyn TimingProvider>,
    synthetic: SyntheticLapGenerator,
}

impl SessionLoader {
    pub fn new(provider: Box<dyn TimingProvider>, synthetic: SyntheticLapGenerator) -> Self {
        Self {
            provider,
            synthetic,
        }
    }

    /// Wrap the provider with an on-disk cache, creating the directory if needed
    pub fn with_cache<P, D>(
        provider: P,
        cache_dir: D,
        synthetic: SyntheticLapGenerator,
    ) -> std::io::Result<Self>
    where
        P: TimingProvider + 'static,
        D: AsRef<Path>,
    {
        let cache = SessionCache::open(cache_dir)?;
        Ok(Self::new(
            Box::new(CachedProvider::new(provider, cache)),
            synthetic,
        ))
    }

    /// Load lap records for a session
    ///
    /// Returns live laps, or the synthetic table tagged as fallback when the
    /// provider fails or yields no complete laps.
    pub fn load(&self, key: &SessionKey) -> Sourced<Vec<LapRecord>> {
        info!("Loading {} session data...", key);

        let result = self
            .provider
            .fetch_laps(key)
            .and_then(|raw| complete_laps(&raw));

        match result {
            Ok(laps) => {
                info!("Successfully loaded {} laps for {}", laps.len(), key);
                Sourced::live(laps)
            }
            Err(e) => {
                warn!(
                    "Error loading session data for {}: {}. Using synthetic data ({} laps per driver).",
                    key,
                    e,
                    self.synthetic.laps_per_driver()
                );
                Sourced::fallback(self.synthetic.generate())
            }
        }
    }
}
