//! Feature engineering: turns an indicator series into fixed-width lookback
//! vectors, one generator per [`FeatureSpec`].
//!
//! Every generator shares the same windowing routine, [`lookback_matrix`].
//! Row `i` of a feature array holds the window ending at raw index
//! `i + dimension - 1`, most recent value in column 0:
//!
//! ```text
//! raw:  x0 x1 x2 x3 x4        dimension = 3
//! row0: x2 x1 x0
//! row1: x3 x2 x1
//! row2: x4 x3 x2
//! ```

use crate::error::{FeatureError, FeatureResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod indicators;
mod series;

pub use aggregate::{align_and_concatenate, build, merge, FeatureMetadata, FeatureOutput};
pub use series::PriceSeries;

const DEFAULT_LOG_PRICE_NORMALIZE: f64 = 0.02;
const DEFAULT_RSI_NORMALIZE: f64 = 25.0;
const DEFAULT_RSI_OFFSET: f64 = 50.0;

fn default_log_price_normalize() -> f64 {
    DEFAULT_LOG_PRICE_NORMALIZE
}

fn default_rsi_normalize() -> f64 {
    DEFAULT_RSI_NORMALIZE
}

fn default_rsi_offset() -> f64 {
    DEFAULT_RSI_OFFSET
}

/// Log return lookback feature, normalized as `x / normalize_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPriceSpec {
    pub dimension: usize,
    #[serde(default = "default_log_price_normalize")]
    pub normalize_value: f64,
}

/// "SMA 1 crosses above SMA 2" event feature, values 0 or 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmaCrossSpec {
    pub sma_window_1: usize,
    pub sma_window_2: usize,
    pub dimension: usize,
}

/// RSI lookback feature, normalized as `(x - offset) / normalize_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiSpec {
    pub rsi_window: usize,
    pub dimension: usize,
    #[serde(default = "default_rsi_normalize")]
    pub normalize_value: f64,
    #[serde(default = "default_rsi_offset")]
    pub offset: f64,
}

/// Which feature to compute and with which parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum FeatureSpec {
    #[serde(rename = "LOG_PRICE")]
    LogPrice(LogPriceSpec),
    #[serde(rename = "SMA_CROSS")]
    SmaCross(SmaCrossSpec),
    #[serde(rename = "RSI")]
    Rsi(RsiSpec),
}

impl FeatureSpec {
    pub fn log_price(dimension: usize) -> Self {
        FeatureSpec::LogPrice(LogPriceSpec {
            dimension,
            normalize_value: DEFAULT_LOG_PRICE_NORMALIZE,
        })
    }

    pub fn sma_cross(sma_window_1: usize, sma_window_2: usize, dimension: usize) -> Self {
        FeatureSpec::SmaCross(SmaCrossSpec {
            sma_window_1,
            sma_window_2,
            dimension,
        })
    }

    pub fn rsi(rsi_window: usize, dimension: usize) -> Self {
        FeatureSpec::Rsi(RsiSpec {
            rsi_window,
            dimension,
            normalize_value: DEFAULT_RSI_NORMALIZE,
            offset: DEFAULT_RSI_OFFSET,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeatureSpec::LogPrice(_) => "LOG_PRICE",
            FeatureSpec::SmaCross(_) => "SMA_CROSS",
            FeatureSpec::Rsi(_) => "RSI",
        }
    }

    /// Lookback dimension, i.e. columns of the feature array.
    pub fn dimension(&self) -> usize {
        match self {
            FeatureSpec::LogPrice(s) => s.dimension,
            FeatureSpec::SmaCross(s) => s.dimension,
            FeatureSpec::Rsi(s) => s.dimension,
        }
    }

    /// Leading points the indicator cannot compute.
    pub fn warmup(&self) -> usize {
        match self {
            FeatureSpec::LogPrice(_) => 1,
            FeatureSpec::SmaCross(s) => s.sma_window_1.max(s.sma_window_2).saturating_sub(1),
            FeatureSpec::Rsi(s) => s.rsi_window,
        }
    }

    pub fn validate(&self) -> FeatureResult<()> {
        if self.dimension() == 0 {
            return Err(FeatureError::InvalidSpec(format!(
                "{}: dimension must be at least 1",
                self.name()
            )));
        }
        match self {
            FeatureSpec::LogPrice(s) => check_normalize(self.name(), s.normalize_value),
            FeatureSpec::SmaCross(s) => {
                if s.sma_window_1 == 0 || s.sma_window_2 == 0 {
                    return Err(FeatureError::InvalidSpec(
                        "SMA_CROSS: sma windows must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
            FeatureSpec::Rsi(s) => {
                if s.rsi_window == 0 {
                    return Err(FeatureError::InvalidSpec(
                        "RSI: rsi_window must be at least 1".to_string(),
                    ));
                }
                check_normalize(self.name(), s.normalize_value)
            }
        }
    }
}

fn check_normalize(name: &str, normalize_value: f64) -> FeatureResult<()> {
    if normalize_value.is_finite() && normalize_value > 0.0 {
        Ok(())
    } else {
        Err(FeatureError::InvalidSpec(format!(
            "{}: normalize_value must be positive, got {}",
            name, normalize_value
        )))
    }
}

/// Build the `(n - dimension + 1) x dimension` lookback matrix of `raw`.
pub fn lookback_matrix(raw: &[f64], dimension: usize) -> FeatureResult<Array2<f64>> {
    if dimension == 0 || raw.len() < dimension {
        return Err(FeatureError::InvalidSeries(format!(
            "cannot window {} points with dimension {}",
            raw.len(),
            dimension
        )));
    }
    let rows = raw.len() - dimension + 1;
    Ok(Array2::from_shape_fn((rows, dimension), |(i, j)| {
        raw[i + dimension - 1 - j]
    }))
}

/// One feature spec bound to the series it is computed from.
#[derive(Debug, Clone, Copy)]
pub struct FeatureGenerator<'a> {
    spec: &'a FeatureSpec,
    values: &'a [f64],
}

impl<'a> FeatureGenerator<'a> {
    pub fn new(spec: &'a FeatureSpec, values: &'a [f64]) -> FeatureResult<Self> {
        spec.validate()?;
        Ok(Self { spec, values })
    }

    pub fn spec(&self) -> &FeatureSpec {
        self.spec
    }

    /// Indicator series with its warm-up prefix removed.
    pub fn raw_series(&self) -> Vec<f64> {
        let indicator = match self.spec {
            FeatureSpec::LogPrice(_) => indicators::log_return(self.values),
            FeatureSpec::SmaCross(s) => {
                let sma_1 = indicators::sma(self.values, s.sma_window_1);
                let sma_2 = indicators::sma(self.values, s.sma_window_2);
                cross_over_above(&sma_1, &sma_2)
            }
            FeatureSpec::Rsi(s) => indicators::rsi(self.values, s.rsi_window),
        };
        let warmup = self.spec.warmup().min(indicator.len());
        indicator[warmup..].to_vec()
    }

    /// Declared `(rows, dimension)` of [`Self::output_feature_array`].
    pub fn shape(&self) -> FeatureResult<(usize, usize)> {
        let dimension = self.spec.dimension();
        let warmup = self.spec.warmup();
        let required = dimension + warmup;
        if self.values.len() < required {
            return Err(FeatureError::InsufficientHistory {
                feature: self.spec.name(),
                required,
                available: self.values.len(),
            });
        }
        Ok((self.values.len() - warmup - dimension + 1, dimension))
    }

    pub fn output_feature_array(&self, normalize: bool) -> FeatureResult<Array2<f64>> {
        let (rows, dimension) = self.shape()?;
        let raw = self.raw_series();
        let mut features = lookback_matrix(&raw, dimension)?;
        debug_assert_eq!(features.nrows(), rows);

        if normalize {
            match self.spec {
                FeatureSpec::LogPrice(s) => features.mapv_inplace(|x| x / s.normalize_value),
                // already 0/1
                FeatureSpec::SmaCross(_) => {}
                FeatureSpec::Rsi(s) => {
                    features.mapv_inplace(|x| (x - s.offset) / s.normalize_value)
                }
            }
        }

        Ok(features)
    }
}

/// 1.0 where `line_a - line_b` turns from negative to positive, else 0.0.
fn cross_over_above(line_a: &[f64], line_b: &[f64]) -> Vec<f64> {
    let diff: Vec<f64> = line_a
        .iter()
        .zip(line_b.iter())
        .map(|(a, b)| a - b)
        .collect();

    let mut signal = Vec::with_capacity(diff.len());
    for t in 0..diff.len() {
        let crossed = t > 0 && diff[t] > 0.0 && diff[t - 1] < 0.0;
        signal.push(if crossed { 1.0 } else { 0.0 });
    }
    signal
}
