//! F1 Predict CLI - race pace prediction from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use f1_predict::data::process_sector_times;
use f1_predict::predictor::{RaceReport, HISTORICAL_ROUND, HISTORICAL_YEAR};
use f1_predict::{
    DataSource, ModelCatalog, ModelKind, RaceConfig, RacePipeline, RaceRequest, SessionKey,
    SessionType, Settings,
};

const DEFAULT_TRACK: &str = "mexico";
const DEFAULT_TOP: usize = 3;

#[derive(Parser)]
#[command(name = "f1-predict")]
#[command(author, version, about = "F1 race pace prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file replacing the built-in race tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session cache directory (overrides F1_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the models and predict the race classification
    Predict {
        /// Track key (e.g. mexico, monaco)
        #[arg(short, long, default_value = DEFAULT_TRACK)]
        track: String,

        /// Season of the training session
        #[arg(short, long, default_value_t = HISTORICAL_YEAR)]
        year: i32,

        /// Round of the training session
        #[arg(short, long, default_value_t = HISTORICAL_ROUND)]
        round: u32,

        /// Session type (R, Q, FP1, FP2, FP3, S, SQ)
        #[arg(short, long, default_value = "R")]
        session: SessionType,

        /// Comma-separated model kinds (default: every available kind)
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Forecast time, YYYY-MM-DD HH:MM:SS (default: the track's race time)
        #[arg(long)]
        time: Option<String>,

        /// Number of drivers to show
        #[arg(long, default_value_t = DEFAULT_TOP)]
        top: usize,
    },

    /// Show the race weather forecast for a track
    Weather {
        #[arg(short, long, default_value = DEFAULT_TRACK)]
        track: String,

        /// Forecast time, YYYY-MM-DD HH:MM:SS
        #[arg(long)]
        time: Option<String>,
    },

    /// Show per-driver mean sector times for a session
    Laps {
        #[arg(short, long, default_value_t = HISTORICAL_YEAR)]
        year: i32,

        #[arg(short, long, default_value_t = HISTORICAL_ROUND)]
        round: u32,

        #[arg(short, long, default_value = "R")]
        session: SessionType,
    },

    /// List model kinds and their availability
    Models,

    /// Print the race tables as JSON
    Config,
}

fn main() -> Result<()> {
    check_dotenv(dotenvy::dotenv())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let race = match &cli.config {
        Some(path) => RaceConfig::load(path)
            .with_context(|| format!("Failed to load race config from {}", path.display()))?,
        None => RaceConfig::builtin(),
    };

    let mut settings = Settings::from_env();
    if let Some(dir) = cli.cache_dir {
        settings.cache_dir = dir;
    }

    match cli.command {
        Commands::Predict {
            track,
            year,
            round,
            session,
            models,
            time,
            top,
        } => {
            let pipeline = build_pipeline(race, &settings)?;
            let mut request = RaceRequest::new(track, SessionKey::new(year, round, session));
            if let Some(time) = time {
                request = request.with_forecast_time(time);
            }
            predict(&pipeline, &request, &models, top)?;
        }
        Commands::Weather { track, time } => {
            let pipeline = build_pipeline(race, &settings)?;
            show_weather(&pipeline, &track, time.as_deref());
        }
        Commands::Laps {
            year,
            round,
            session,
        } => {
            let pipeline = build_pipeline(race, &settings)?;
            show_laps(&pipeline, SessionKey::new(year, round, session))?;
        }
        Commands::Models => list_models(&ModelCatalog::detect()),
        Commands::Config => {
            let json = serde_json::to_string_pretty(race.tables())
                .context("Failed to serialize race tables")?;
            println!("{}", json);
        }
    }

    Ok(())
}

/// A missing .env file is fine; an unreadable or malformed one is an error
fn check_dotenv<T>(result: dotenvy::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("Failed to load .env file"),
    }
}

fn build_pipeline(race: RaceConfig, settings: &Settings) -> Result<RacePipeline> {
    RacePipeline::from_settings(race, settings).with_context(|| {
        format!(
            "Failed to set up pipeline (cache dir {})",
            settings.cache_dir.display()
        )
    })
}

fn source_label(source: DataSource) -> colored::ColoredString {
    match source {
        DataSource::Live => "live".green(),
        DataSource::Fallback => "fallback".yellow(),
    }
}

fn medal(position: usize) -> &'static str {
    match position {
        1 => "🥇",
        2 => "🥈",
        3 => "🥉",
        _ => "  ",
    }
}

fn predict(pipeline: &RacePipeline, request: &RaceRequest, models: &[String], top: usize) -> Result<()> {
    println!(
        "{}: {} (trained on {})",
        "Predicting".green(),
        request.track,
        request.session
    );
    println!();

    let names: Vec<&str> = models.iter().map(String::as_str).collect();
    let report = pipeline
        .run(request, &names)
        .with_context(|| format!("Prediction failed for {}", request.track))?;

    print_report(&report, top);
    Ok(())
}

fn print_report(report: &RaceReport, top: usize) {
    for model in &report.models {
        println!("{}", format!("{} predicted classification:", model.kind.label()).yellow().bold());
        println!("{:>4}  {:<4} {:<22} {:<18} {:>10}", "Pos", "", "Driver", "Team", "Time (s)");
        println!("{}", "-".repeat(64));
        for driver in model.podium(top) {
            println!(
                "{:>4}  {:<4} {:<22} {:<18} {:>10.3}",
                driver.position,
                medal(driver.position),
                driver.full_name,
                driver.team,
                driver.predicted_time
            );
        }
        println!();
    }

    if report.models.is_empty() {
        println!("{}", "No model could be trained.".red());
    } else {
        println!("{}", "Model comparison:".yellow().bold());
        println!("{:<20} {:>8} {:>8} {:>8} {:>8}", "Model", "MAE", "MSE", "RMSE", "R²");
        println!("{}", "-".repeat(56));
        let best = report.best_model().map(|m| m.kind);
        for model in &report.models {
            let line = format!(
                "{:<20} {:>8.3} {:>8.3} {:>8.3} {:>8.3}",
                model.kind.label(),
                model.metrics.mae,
                model.metrics.mse,
                model.metrics.rmse,
                model.metrics.r2
            );
            if Some(model.kind) == best {
                println!("{} {}", line.green(), "←".green());
            } else {
                println!("{}", line);
            }
        }
        println!();
    }

    for failure in &report.failures {
        println!("{} {}: {}", "Skipped".red(), failure.kind.label(), failure.reason);
    }

    println!(
        "{} laps: {}, weather: {}",
        "Data sources".dimmed(),
        source_label(report.provenance.laps),
        source_label(report.provenance.weather)
    );
}

fn show_weather(pipeline: &RacePipeline, track: &str, time: Option<&str>) {
    let weather = pipeline
        .weather_client()
        .fetch(pipeline.config(), track, time);

    println!("{}", format!("Weather for {}:", track).yellow().bold());
    println!("  Temperature:      {:.1}°C", weather.value.temperature);
    println!("  Rain probability: {:.0}%", weather.value.rain_probability * 100.0);
    println!("  Source:           {}", source_label(weather.source));
}

fn show_laps(pipeline: &RacePipeline, key: SessionKey) -> Result<()> {
    let laps = pipeline.loader().load(&key);
    let sectors = process_sector_times(&laps.value).context("Failed to aggregate sector times")?;

    println!(
        "{} ({} laps, {})",
        format!("{} mean sector times:", key).yellow().bold(),
        laps.value.len(),
        source_label(laps.source)
    );
    println!(
        "{:<6} {:>10} {:>10} {:>10} {:>10}",
        "Driver", "S1", "S2", "S3", "Total"
    );
    println!("{}", "-".repeat(50));
    for row in sectors {
        println!(
            "{:<6} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
            row.driver, row.sector1, row.sector2, row.sector3, row.total
        );
    }
    Ok(())
}

fn list_models(catalog: &ModelCatalog) {
    println!("{}", "Model kinds:".yellow().bold());
    for kind in ModelKind::ALL {
        let status = if catalog.is_available(kind) {
            "available".green()
        } else {
            "not built".red()
        };
        println!("  {:<20} {:<22} {}", kind.as_str(), kind.label(), status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dotenv_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_dotenv(dotenvy::from_path(dir.path().join(".env"))).is_ok());
    }

    #[test]
    fn test_malformed_dotenv_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "F1_PREDICT_BROKEN LINE\n").unwrap();
        assert!(check_dotenv(dotenvy::from_path(&path)).is_err());
    }

    #[test]
    fn test_medals() {
        assert_eq!(medal(1), "🥇");
        assert_eq!(medal(3), "🥉");
        assert_eq!(medal(4), "  ");
    }
}
