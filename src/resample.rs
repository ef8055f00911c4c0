//! OHLCV resampling to a coarser candle size.

use crate::kline::ensure_candle_columns;
use anyhow::Result;
use polars::prelude::*;

/// Columns of a resampled candle table.
pub const RESAMPLED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Resample candles to `candle_minutes` buckets.
///
/// Windows are closed on the left and labelled by their start, so the
/// 15-minute bucket `00:15` covers `[00:15, 00:30)`. Buckets with no candle
/// are not produced. Returns [`RESAMPLED_COLUMNS`] with `timestamp` as a
/// millisecond datetime.
pub fn resample(df: &DataFrame, candle_minutes: u32) -> Result<DataFrame> {
    ensure_candle_columns(df)?;
    if candle_minutes == 0 {
        anyhow::bail!("candle size must be at least one minute");
    }

    let with_timestamp = df.clone().lazy().with_column(
        col("open_time")
            .cast(DataType::Int64)
            .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
            .alias("timestamp"),
    );

    if df.height() == 0 {
        let empty = with_timestamp
            .select(RESAMPLED_COLUMNS.map(col))
            .collect()?;
        return Ok(empty);
    }

    let interval = format!("{}m", candle_minutes);
    let every = Duration::parse(&interval);
    let options = DynamicGroupOptions {
        every,
        period: every,
        offset: Duration::parse("0ns"),
        closed_window: ClosedWindow::Left,
        start_by: StartBy::WindowBound,
        include_boundaries: false,
        ..Default::default()
    };

    let resampled = with_timestamp
        .sort(vec!["timestamp"], Default::default())
        .group_by_dynamic(col("timestamp"), [], options)
        .agg([
            col("open").first(),
            col("high").max(),
            col("low").min(),
            col("close").last(),
            col("volume").sum(),
        ])
        .select(RESAMPLED_COLUMNS.map(col))
        .collect()?;

    Ok(resampled)
}
