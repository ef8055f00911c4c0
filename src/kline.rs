use anyhow::{Context, Result};
use polars::prelude::*;

/// Column names of a candle table, in storage order.
pub const CANDLE_COLUMNS: [&str; 6] = ["open_time", "open", "high", "low", "close", "volume"];

/// One OHLCV candle.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: i64, // milliseconds
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Convert a slice of Klines into a Polars DataFrame (timestamps as i64).
pub fn klines_to_dataframe(klines: &[Kline]) -> Result<DataFrame> {
    let open_time: Vec<i64> = klines.iter().map(|k| k.open_time).collect();
    let open: Vec<f64> = klines.iter().map(|k| k.open).collect();
    let high: Vec<f64> = klines.iter().map(|k| k.high).collect();
    let low: Vec<f64> = klines.iter().map(|k| k.low).collect();
    let close: Vec<f64> = klines.iter().map(|k| k.close).collect();
    let volume: Vec<f64> = klines.iter().map(|k| k.volume).collect();

    let df = df!(
        "open_time" => open_time,
        "open" => open,
        "high" => high,
        "low" => low,
        "close" => close,
        "volume" => volume,
    )?;
    Ok(df)
}

/// Check that `df` carries every candle column.
pub fn ensure_candle_columns(df: &DataFrame) -> Result<()> {
    for name in CANDLE_COLUMNS {
        df.column(name)
            .with_context(|| format!("candle table is missing column {}", name))?;
    }
    Ok(())
}
