//! Run parameters and feature-set configuration.

use crate::error::ConfigError;
use crate::features::FeatureSpec;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_PRESENCE_RATIO: f64 = 0.9;
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;
pub const DATAFILE_PREFIX: &str = "data";

const MINUTES_PER_DAY: f64 = 1440.0;

/// Feature specs applied to close prices and, optionally, to volumes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeatureSetConfig {
    pub price: Vec<FeatureSpec>,
    #[serde(default)]
    pub volume: Vec<FeatureSpec>,
}

impl FeatureSetConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FeatureSetConfig = toml::from_str(content)?;
        if config.price.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "price",
                reason: "at least one price feature is required".to_string(),
            });
        }
        for spec in config.price.iter().chain(config.volume.iter()) {
            spec.validate().map_err(|e| ConfigError::InvalidValue {
                name: spec.name(),
                reason: e.to_string(),
            })?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

/// Everything one dataset preparation run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareConfig {
    pub exchange: String,
    pub symbol: String,
    pub input_data_dir: PathBuf,
    pub output_data_dir: PathBuf,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub data_length: Duration,
    pub data_step: Duration,
    pub split_ratio: f64,
    pub candle_minutes: u32,
    pub min_candle_population: usize,
    pub buffer_size: usize,
}

/// Raw invocation values, as typed on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareArgs {
    pub exchange: String,
    pub symbol: String,
    pub input_data_dir: PathBuf,
    pub output_data_dir: PathBuf,
    pub start_date: String,
    pub time_windows_days: u32,
    pub data_length_days: u32,
    pub data_step_days: u32,
    pub split_ratio: f64,
    pub candle_minutes: u32,
    pub presence_ratio: f64,
    pub buffer_size: usize,
}

impl PrepareConfig {
    pub fn from_args(args: PrepareArgs) -> Result<Self, ConfigError> {
        let start_date = parse_start_date(&args.start_date)?;
        if args.candle_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                name: "candle_size",
                reason: "must be at least one minute".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&args.split_ratio) {
            return Err(ConfigError::InvalidValue {
                name: "split_ratio",
                reason: format!("{} is outside [0, 1]", args.split_ratio),
            });
        }
        if !(0.0..=1.0).contains(&args.presence_ratio) {
            return Err(ConfigError::InvalidValue {
                name: "presence_ratio",
                reason: format!("{} is outside [0, 1]", args.presence_ratio),
            });
        }

        let end_date = start_date
            .checked_add_signed(Duration::days(args.time_windows_days as i64))
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "time_windows",
                reason: format!(
                    "{} days past {} is out of range",
                    args.time_windows_days, start_date
                ),
            })?;

        Ok(Self {
            exchange: args.exchange,
            symbol: args.symbol,
            input_data_dir: args.input_data_dir,
            output_data_dir: args.output_data_dir,
            start_date,
            end_date,
            data_length: Duration::days(args.data_length_days as i64),
            data_step: Duration::days(args.data_step_days as i64),
            split_ratio: args.split_ratio,
            candle_minutes: args.candle_minutes,
            min_candle_population: derive_min_candle_population(
                args.candle_minutes,
                args.data_length_days,
                args.presence_ratio,
            ),
            buffer_size: args.buffer_size,
        })
    }
}

/// Parse a `YYYYMMDD` date as midnight UTC.
pub fn parse_start_date(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ConfigError::InvalidDate(value.to_string()))
}

/// Minimum candles an episode must keep after resampling:
/// `floor(candles_per_day * episode_days * presence_ratio)`.
pub fn derive_min_candle_population(
    candle_minutes: u32,
    data_length_days: u32,
    presence_ratio: f64,
) -> usize {
    let candles_per_day = MINUTES_PER_DAY / candle_minutes as f64;
    (candles_per_day * data_length_days as f64 * presence_ratio).floor() as usize
}
