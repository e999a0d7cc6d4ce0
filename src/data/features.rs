//! Feature Engineering
//!
//! Aggregate session laps per driver and merge them with qualifying results,
//! static team/track context and race weather into the model input table.

use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::config::{ConfigError, RaceConfig};
use crate::error::Result;
use crate::models::{FeatureRow, LapRecord, QualifyingEntry, Weather};
use crate::training::Dataset;

/// Lap frame columns
pub const DRIVER: &str = "Driver";
pub const LAP_TIME: &str = "LapTime (s)";
pub const SECTOR1_TIME: &str = "Sector1Time (s)";
pub const SECTOR2_TIME: &str = "Sector2Time (s)";
pub const SECTOR3_TIME: &str = "Sector3Time (s)";
pub const TOTAL_SECTOR_TIME: &str = "TotalSectorTime (s)";

/// Model feature columns
pub const QUALIFYING_TIME: &str = "QualifyingTime (s)";
pub const RAIN_PROBABILITY: &str = "RainProbability";
pub const TEMPERATURE: &str = "Temperature";
pub const TEAM_PERFORMANCE_SCORE: &str = "TeamPerformanceScore";
pub const CLEAN_AIR_RACE_PACE: &str = "CleanAirRacePace (s)";
pub const AVERAGE_POSITION_CHANGE: &str = "AveragePositionChange";

/// Feature columns in matrix order
pub const FEATURE_COLUMNS: [&str; 6] = [
    QUALIFYING_TIME,
    RAIN_PROBABILITY,
    TEMPERATURE,
    TEAM_PERFORMANCE_SCORE,
    CLEAN_AIR_RACE_PACE,
    AVERAGE_POSITION_CHANGE,
];

/// Get feature names in matrix order
pub fn feature_names() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect()
}

/// Build a lap frame (one row per lap, times in seconds)
pub fn laps_to_frame(laps: &[LapRecord]) -> PolarsResult<DataFrame> {
    let drivers: Vec<&str> = laps.iter().map(|l| l.driver.as_str()).collect();
    let lap_times: Vec<f64> = laps.iter().map(LapRecord::lap_time_secs).collect();
    let sector1: Vec<f64> = laps.iter().map(|l| l.sector1.as_secs_f64()).collect();
    let sector2: Vec<f64> = laps.iter().map(|l| l.sector2.as_secs_f64()).collect();
    let sector3: Vec<f64> = laps.iter().map(|l| l.sector3.as_secs_f64()).collect();

    df!(
        DRIVER => drivers,
        LAP_TIME => lap_times,
        SECTOR1_TIME => sector1,
        SECTOR2_TIME => sector2,
        SECTOR3_TIME => sector3
    )
}

/// Mean sector times for one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorTimes {
    pub driver: String,
    pub sector1: f64,
    pub sector2: f64,
    pub sector3: f64,
    /// Sum of the three sector means
    pub total: f64,
}

/// Group laps by driver and average each sector
///
/// Drivers appear in order of their first lap.
pub fn process_sector_times(laps: &[LapRecord]) -> PolarsResult<Vec<SectorTimes>> {
    let grouped = laps_to_frame(laps)?
        .lazy()
        .group_by_stable([col(DRIVER)])
        .agg([
            col(SECTOR1_TIME).mean(),
            col(SECTOR2_TIME).mean(),
            col(SECTOR3_TIME).mean(),
        ])
        .with_column(
            (col(SECTOR1_TIME) + col(SECTOR2_TIME) + col(SECTOR3_TIME)).alias(TOTAL_SECTOR_TIME),
        )
        .collect()?;

    let driver_col = grouped.column(DRIVER)?.str()?;
    let s1_col = grouped.column(SECTOR1_TIME)?.f64()?;
    let s2_col = grouped.column(SECTOR2_TIME)?.f64()?;
    let s3_col = grouped.column(SECTOR3_TIME)?.f64()?;
    let total_col = grouped.column(TOTAL_SECTOR_TIME)?.f64()?;

    let mut result = Vec::with_capacity(grouped.height());
    for i in 0..grouped.height() {
        if let (Some(driver), Some(s1), Some(s2), Some(s3), Some(total)) = (
            driver_col.get(i),
            s1_col.get(i),
            s2_col.get(i),
            s3_col.get(i),
            total_col.get(i),
        ) {
            result.push(SectorTimes {
                driver: driver.to_string(),
                sector1: s1,
                sector2: s2,
                sector3: s3,
                total,
            });
        }
    }

    Ok(result)
}

/// Average lap time per driver (seconds)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LapAverages {
    by_driver: BTreeMap<String, f64>,
}

impl LapAverages {
    pub fn from_laps(laps: &[LapRecord]) -> PolarsResult<Self> {
        let grouped = laps_to_frame(laps)?
            .lazy()
            .group_by_stable([col(DRIVER)])
            .agg([col(LAP_TIME).mean()])
            .collect()?;

        let driver_col = grouped.column(DRIVER)?.str()?;
        let lap_col = grouped.column(LAP_TIME)?.f64()?;

        let by_driver = (0..grouped.height())
            .filter_map(|i| Some((driver_col.get(i)?.to_string(), lap_col.get(i)?)))
            .collect();

        Ok(Self { by_driver })
    }

    pub fn get(&self, driver: &str) -> Option<f64> {
        self.by_driver.get(driver).copied()
    }

    pub fn len(&self) -> usize {
        self.by_driver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_driver.is_empty()
    }

    /// Mean of the per-driver averages; `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.by_driver.is_empty() {
            return None;
        }
        Some(self.by_driver.values().sum::<f64>() / self.by_driver.len() as f64)
    }

    /// Re-index onto a driver order; unknown drivers get the series mean
    pub fn reindex<S: AsRef<str>>(&self, drivers: &[S]) -> Vec<f64> {
        let mean = self.mean().unwrap_or(f64::NAN);
        drivers
            .iter()
            .map(|d| {
                self.get(d.as_ref()).unwrap_or_else(|| {
                    warn!(
                        "No average lap time for {}; using mean {:.3}s",
                        d.as_ref(),
                        mean
                    );
                    mean
                })
            })
            .collect()
    }
}

/// Model-ready table: feature rows plus aligned labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
    /// Average race lap time per row (seconds)
    pub labels: Vec<f64>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn drivers(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.driver.as_str()).collect()
    }

    /// Feature matrix in [`FEATURE_COLUMNS`] order; nulls become NaN
    pub fn matrix(&self) -> Array2<f64> {
        let mut x = Array2::from_elem((self.rows.len(), FEATURE_COLUMNS.len()), f64::NAN);
        for (i, row) in self.rows.iter().enumerate() {
            for (j, value) in row_values(row).into_iter().enumerate() {
                x[[i, j]] = value;
            }
        }
        x
    }

    pub fn targets(&self) -> Array1<f64> {
        Array1::from_vec(self.labels.clone())
    }

    pub fn to_dataset(&self) -> Dataset {
        Dataset::new(self.matrix(), self.targets(), feature_names())
    }
}

fn row_values(row: &FeatureRow) -> [f64; 6] {
    let nan = |v: Option<f64>| v.unwrap_or(f64::NAN);
    [
        nan(row.qualifying_time),
        row.rain_probability,
        row.temperature,
        nan(row.team_score),
        nan(row.clean_air_pace),
        nan(row.position_change),
    ]
}

/// Builds model input for a track from an explicit configuration
pub struct FeatureBuilder<'a> {
    config: &'a RaceConfig,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(config: &'a RaceConfig) -> Self {
        Self { config }
    }

    /// Qualifying table for a track with team, team score, clean-air pace
    /// and position change attached
    pub fn qualifying_entries(
        &self,
        track: &str,
    ) -> std::result::Result<Vec<QualifyingEntry>, ConfigError> {
        let grid = self.config.qualifying(track)?;

        Ok(grid
            .iter()
            .map(|q| {
                let team = self.config.driver_team(&q.driver).map(str::to_string);
                let team_score = team.as_deref().and_then(|t| self.config.team_score(t));
                QualifyingEntry {
                    driver: q.driver.clone(),
                    qualifying_time: q.time,
                    team,
                    team_score,
                    clean_air_pace: self.config.clean_air_pace(track, &q.driver),
                    position_change: self.config.position_change(track, &q.driver),
                }
            })
            .collect())
    }

    /// Build the feature table for a track
    ///
    /// Rows follow qualifying order and are restricted to drivers that
    /// appear in `laps`.
    pub fn build(&self, track: &str, laps: &[LapRecord], weather: &Weather) -> Result<FeatureTable> {
        let entries = self.qualifying_entries(track)?;
        let sectors = process_sector_times(laps)?;
        let averages = LapAverages::from_laps(laps)?;

        let merged = self.merge(entries, &sectors, weather);
        let lap_drivers: HashSet<&str> = laps.iter().map(|l| l.driver.as_str()).collect();
        let rows: Vec<FeatureRow> = merged
            .into_iter()
            .filter(|row| lap_drivers.contains(row.driver.as_str()))
            .collect();

        let drivers: Vec<&str> = rows.iter().map(|r| r.driver.as_str()).collect();
        let labels = averages.reindex(drivers.as_slice());

        debug!(
            "Built {} feature rows for {} from {} laps",
            rows.len(),
            track,
            laps.len()
        );

        Ok(FeatureTable { rows, labels })
    }

    /// Left-join sector totals onto qualifying entries and broadcast weather
    fn merge(
        &self,
        entries: Vec<QualifyingEntry>,
        sectors: &[SectorTimes],
        weather: &Weather,
    ) -> Vec<FeatureRow> {
        let totals: BTreeMap<&str, f64> = sectors
            .iter()
            .map(|s| (s.driver.as_str(), s.total))
            .collect();

        entries
            .into_iter()
            .map(|entry| FeatureRow {
                full_name: self.config.driver_name(&entry.driver).map(str::to_string),
                total_sector_time: totals.get(entry.driver.as_str()).copied(),
                driver: entry.driver,
                team: entry.team,
                qualifying_time: entry.qualifying_time,
                team_score: entry.team_score,
                clean_air_pace: entry.clean_air_pace,
                position_change: entry.position_change,
                temperature: weather.temperature,
                rain_probability: weather.rain_probability,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::SyntheticLapGenerator;
    use std::time::Duration;

    fn lap(driver: &str, lap: f64, s: [f64; 3]) -> LapRecord {
        LapRecord {
            driver: driver.to_string(),
            lap_time: Duration::from_secs_f64(lap),
            sector1: Duration::from_secs_f64(s[0]),
            sector2: Duration::from_secs_f64(s[1]),
            sector3: Duration::from_secs_f64(s[2]),
        }
    }

    fn weather() -> Weather {
        Weather {
            temperature: 24.5,
            rain_probability: 0.2,
        }
    }

    #[test]
    fn test_sector_total_is_sum_of_means() {
        let laps = SyntheticLapGenerator::new(3, 4).generate();
        let sectors = process_sector_times(&laps).unwrap();
        assert_eq!(sectors.len(), 13);

        for s in &sectors {
            assert!((s.total - (s.sector1 + s.sector2 + s.sector3)).abs() < 1e-9);

            let mine: Vec<&LapRecord> = laps.iter().filter(|l| l.driver == s.driver).collect();
            let mean_s1 =
                mine.iter().map(|l| l.sector1.as_secs_f64()).sum::<f64>() / mine.len() as f64;
            assert!((s.sector1 - mean_s1).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sector_times_keep_first_seen_order() {
        let laps = vec![
            lap("NOR", 75.0, [25.0, 25.0, 25.0]),
            lap("VER", 74.0, [24.0, 25.0, 25.0]),
            lap("NOR", 76.0, [26.0, 25.0, 25.0]),
        ];
        let sectors = process_sector_times(&laps).unwrap();
        let order: Vec<&str> = sectors.iter().map(|s| s.driver.as_str()).collect();
        assert_eq!(order, vec!["NOR", "VER"]);
        assert!((sectors[0].sector1 - 25.5).abs() < 1e-9);
    }

    #[test]
    fn test_lap_averages() {
        let laps = vec![
            lap("VER", 74.0, [24.0, 25.0, 25.0]),
            lap("VER", 76.0, [25.0, 25.0, 26.0]),
            lap("NOR", 78.0, [26.0, 26.0, 26.0]),
        ];
        let averages = LapAverages::from_laps(&laps).unwrap();
        assert_eq!(averages.get("VER"), Some(75.0));
        assert_eq!(averages.get("NOR"), Some(78.0));
        assert!((averages.mean().unwrap() - 76.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_label_gets_mean() {
        let laps = vec![
            lap("VER", 74.0, [24.0, 25.0, 25.0]),
            lap("NOR", 76.0, [25.0, 25.0, 26.0]),
        ];
        let averages = LapAverages::from_laps(&laps).unwrap();
        let labels = averages.reindex(&["NOR", "TSU", "VER"]);
        assert_eq!(labels.len(), 3);
        assert!((labels[0] - 76.0).abs() < 1e-9);
        assert!((labels[1] - 75.0).abs() < 1e-9);
        assert!((labels[2] - 74.0).abs() < 1e-9);
        assert!(labels.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_qualifying_entries_attach_context() {
        let config = RaceConfig::builtin();
        let entries = FeatureBuilder::new(&config).qualifying_entries("mexico").unwrap();
        assert_eq!(entries.len(), 13);

        let nor = entries.iter().find(|e| e.driver == "NOR").unwrap();
        assert_eq!(nor.team.as_deref(), Some("McLaren"));
        assert_eq!(nor.team_score, Some(1.0));
        assert_eq!(nor.clean_air_pace, Some(74.9));
        assert_eq!(nor.position_change, Some(1.5));
    }

    #[test]
    fn test_unknown_track_qualifying_is_error() {
        let config = RaceConfig::builtin();
        let result = FeatureBuilder::new(&config).qualifying_entries("spa");
        assert!(matches!(result, Err(ConfigError::MissingQualifying(_))));
    }

    #[test]
    fn test_left_join_keeps_drivers_without_laps() {
        let config = RaceConfig::builtin();
        let builder = FeatureBuilder::new(&config);
        let entries = builder.qualifying_entries("mexico").unwrap();
        let laps = vec![lap("VER", 74.0, [24.0, 25.0, 25.0])];
        let sectors = process_sector_times(&laps).unwrap();

        let merged = builder.merge(entries, &sectors, &weather());
        assert_eq!(merged.len(), 13);
        let ver = merged.iter().find(|r| r.driver == "VER").unwrap();
        assert!((ver.total_sector_time.unwrap() - 74.0).abs() < 1e-9);
        let ham = merged.iter().find(|r| r.driver == "HAM").unwrap();
        assert_eq!(ham.total_sector_time, None);
        assert!(merged.iter().all(|r| r.temperature == 24.5));
    }

    #[test]
    fn test_build_keeps_only_drivers_with_laps() {
        let config = RaceConfig::builtin();
        let laps = vec![
            lap("HAM", 75.0, [25.0, 25.0, 25.0]),
            lap("VER", 74.0, [24.0, 25.0, 25.0]),
            lap("TSU", 77.0, [26.0, 25.0, 26.0]),
        ];
        let table = FeatureBuilder::new(&config)
            .build("mexico", &laps, &weather())
            .unwrap();

        // qualifying order, TSU has laps but no qualifying row
        assert_eq!(table.drivers(), vec!["VER", "HAM"]);
        assert_eq!(table.labels, vec![74.0, 75.0]);
        assert_eq!(table.rows[0].full_name.as_deref(), Some("Max Verstappen"));
    }

    #[test]
    fn test_matrix_uses_nan_for_missing_values() {
        let config = RaceConfig::builtin();
        let laps = SyntheticLapGenerator::default().generate();
        let table = FeatureBuilder::new(&config)
            .build("monaco", &laps, &weather())
            .unwrap();
        assert_eq!(table.len(), 13);

        let x = table.matrix();
        assert_eq!(x.dim(), (13, FEATURE_COLUMNS.len()));

        let rus = table.drivers().iter().position(|d| *d == "RUS").unwrap();
        assert!(x[[rus, 0]].is_nan());
        let alb = table.drivers().iter().position(|d| *d == "ALB").unwrap();
        assert!(x[[alb, 4]].is_nan());
        assert!(x.column(2).iter().all(|&t| t == 24.5));
        assert!(x.column(1).iter().all(|&p| p == 0.2));
    }

    #[test]
    fn test_feature_names_order() {
        assert_eq!(
            feature_names(),
            vec![
                "QualifyingTime (s)",
                "RainProbability",
                "Temperature",
                "TeamPerformanceScore",
                "CleanAirRacePace (s)",
                "AveragePositionChange",
            ]
        );
    }
}
