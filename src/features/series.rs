use crate::error::{FeatureError, FeatureResult};
use anyhow::{Context, Result};
use polars::prelude::*;

/// Ordered `(timestamp_ms, value)` pairs with strictly increasing timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    timestamps: Vec<i64>,
    values: Vec<f64>,
}

impl PriceSeries {
    pub fn new(timestamps: Vec<i64>, values: Vec<f64>) -> FeatureResult<Self> {
        if timestamps.len() != values.len() {
            return Err(FeatureError::InvalidSeries(format!(
                "{} timestamps for {} values",
                timestamps.len(),
                values.len()
            )));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(FeatureError::InvalidSeries(format!(
                "timestamps must be strictly increasing (index {})",
                pos + 1
            )));
        }
        Ok(Self { timestamps, values })
    }

    /// Read `value_column` against `time_column` from a candle table.
    /// Datetime time columns are read as their millisecond value.
    pub fn from_dataframe(df: &DataFrame, time_column: &str, value_column: &str) -> Result<Self> {
        let times = df
            .column(time_column)?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .collect::<Option<Vec<i64>>>()
            .with_context(|| format!("null timestamp in column {}", time_column))?;
        let values = df
            .column(value_column)?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect::<Option<Vec<f64>>>()
            .with_context(|| format!("null value in column {}", value_column))?;
        Ok(Self::new(times, values)?)
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
