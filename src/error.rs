use thiserror::Error;

use crate::config::ConfigError;
use crate::data::TimingError;
use crate::training::TrainingError;
use crate::weather::WeatherError;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Timing(#[from] TimingError),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error("Frame operation failed: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_is_transparent() {
        let err: Error = ConfigError::MissingApiKey.into();
        assert!(err.to_string().contains("OPENWEATHER_API_KEY"));
    }

    #[test]
    fn test_training_error_converts() {
        let err: Error = TrainingError::UnknownModelKind {
            name: "quantum_forest".to_string(),
            available: "gradient_boosting".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Training(_)));
        assert!(err.to_string().contains("quantum_forest"));
    }
}
