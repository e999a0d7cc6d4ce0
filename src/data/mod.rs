//! Session data loading and feature engineering modules

pub mod cache;
pub mod features;
pub mod openf1;
pub mod session;
pub mod synthetic;

// Re-export commonly used types
pub use cache::{CachedProvider, SessionCache};
pub use features::{
    feature_names, process_sector_times, FeatureBuilder, FeatureTable, LapAverages, SectorTimes,
    FEATURE_COLUMNS,
};
pub use openf1::{OpenF1Client, OpenF1Config};
pub use session::{
    complete_laps, RawLap, SessionKey, SessionLoader, SessionType, TimingError, TimingProvider,
};
pub use synthetic::{
    SyntheticLapGenerator, SYNTHETIC_DRIVERS, SYNTHETIC_LAPS_PER_DRIVER, SYNTHETIC_SEED,
};
