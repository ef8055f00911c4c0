//! Error types for feature construction, episode splitting and configuration.

use thiserror::Error;

/// Errors raised while building feature arrays.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("invalid feature spec: {0}")]
    InvalidSpec(String),

    #[error("insufficient history for {feature}: need at least {required} points, got {available}")]
    InsufficientHistory {
        feature: &'static str,
        required: usize,
        available: usize,
    },

    #[error("nothing to aggregate: {0}")]
    EmptyInput(&'static str),

    #[error("time index has {index_len} entries but {rows} aligned rows are required")]
    TimeIndexTooShort { index_len: usize, rows: usize },

    #[error("feature outputs do not share a time base (output {position} diverges)")]
    TimeBaseMismatch { position: usize },

    #[error("invalid series: {0}")]
    InvalidSeries(String),
}

/// Errors raised while generating or splitting episodes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EpisodeError {
    #[error("{name} must be a positive duration")]
    InvalidDuration { name: &'static str },

    #[error("split ratio must lie in [0, 1], got {0}")]
    InvalidSplitRatio(f64),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed feature config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid date {0:?}, expected YYYYMMDD")]
    InvalidDate(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

pub type FeatureResult<T> = Result<T, FeatureError>;
