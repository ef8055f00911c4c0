use crate::kline::{klines_to_dataframe, Kline, CANDLE_COLUMNS};
use crate::utils::format_time;
use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Historical candle store.
pub trait CandleSource {
    /// Candles with `from_ms <= open_time < to_ms`, sorted by `open_time`,
    /// laid out as [`CANDLE_COLUMNS`].
    fn get_candles(&self, symbol: &str, from_ms: i64, to_ms: i64) -> Result<DataFrame>;
}

/// Reads `<data_dir>/<exchange>/<symbol>.parquet`.
#[derive(Debug, Clone)]
pub struct ParquetCandleSource {
    data_dir: PathBuf,
    exchange: String,
}

impl ParquetCandleSource {
    pub fn new(data_dir: impl Into<PathBuf>, exchange: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            exchange: exchange.to_string(),
        }
    }

    pub fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.data_dir
            .join(&self.exchange)
            .join(format!("{}.parquet", symbol))
    }
}

impl CandleSource for ParquetCandleSource {
    fn get_candles(&self, symbol: &str, from_ms: i64, to_ms: i64) -> Result<DataFrame> {
        let path = self.symbol_path(symbol);
        if !Path::new(&path).exists() {
            anyhow::bail!("no candle file for {} at {}", symbol, path.display());
        }

        debug!(
            "Reading {} candles from {} to {}",
            symbol,
            format_time(from_ms),
            format_time(to_ms)
        );

        let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())
            .with_context(|| format!("failed to scan {}", path.display()))?
            .with_column(col("open_time").cast(DataType::Int64))
            .filter(
                col("open_time")
                    .gt_eq(lit(from_ms))
                    .and(col("open_time").lt(lit(to_ms))),
            )
            .select(CANDLE_COLUMNS.map(col))
            .sort(vec!["open_time"], Default::default())
            .collect()
            .with_context(|| format!("failed to read candles from {}", path.display()))?;

        debug!("Read {} candles for {}", df.height(), symbol);
        Ok(df)
    }
}

/// Candles held in memory, e.g. already downloaded for a single symbol.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCandleSource {
    klines: Vec<Kline>,
}

impl InMemoryCandleSource {
    pub fn new(mut klines: Vec<Kline>) -> Self {
        klines.sort_by_key(|k| k.open_time);
        Self { klines }
    }
}

impl CandleSource for InMemoryCandleSource {
    fn get_candles(&self, _symbol: &str, from_ms: i64, to_ms: i64) -> Result<DataFrame> {
        let window: Vec<Kline> = self
            .klines
            .iter()
            .filter(|k| k.open_time >= from_ms && k.open_time < to_ms)
            .cloned()
            .collect();
        klines_to_dataframe(&window)
    }
}
