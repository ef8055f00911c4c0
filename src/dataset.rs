//! Dataset assembly: episodes -> candles -> resampled partitions on disk,
//! and feature export from an assembled partition.

use crate::candle_source::CandleSource;
use crate::config::{FeatureSetConfig, PrepareConfig, DATAFILE_PREFIX};
use crate::data_storage::{load_dataframe, save_dataframe_parquet, TrainingDataStorage};
use crate::episodes::{sliding_episodes, split_episodes, DatasetLabel, Episode};
use crate::error::FeatureError;
use crate::features::{build, merge, FeatureOutput, PriceSeries};
use crate::resample::resample;
use crate::utils::measure_time;
use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

pub const SCENARIO_COLUMN: &str = "scenario";

/// Fetch, resample and store every episode, routed by label.
/// Returns `(training_rows, eval_rows)` written.
pub fn prepare_training_and_eval(
    config: &PrepareConfig,
    source: &dyn CandleSource,
) -> Result<(usize, usize)> {
    let episodes = sliding_episodes(
        config.start_date,
        config.end_date,
        config.data_length,
        config.data_step,
    )?;
    let split = split_episodes(&episodes, config.split_ratio)?;
    if split.is_empty() {
        warn!(
            "No {}-day episode fits between {} and {}",
            config.data_length.num_days(),
            config.start_date,
            config.end_date
        );
    }
    info!("num_of_data_vector: {}", split.len());

    let training_rows = save_partition(
        config,
        source,
        DatasetLabel::Training,
        split.get(DatasetLabel::Training),
    )?;
    let eval_rows = save_partition(
        config,
        source,
        DatasetLabel::Eval,
        split.get(DatasetLabel::Eval),
    )?;
    Ok((training_rows, eval_rows))
}

fn save_partition(
    config: &PrepareConfig,
    source: &dyn CandleSource,
    label: DatasetLabel,
    episodes: &[Episode],
) -> Result<usize> {
    let output_folder = config.output_data_dir.join(label.as_str());
    let (skipped, written) = TrainingDataStorage::scoped(
        output_folder,
        config.buffer_size,
        DATAFILE_PREFIX,
        |storage| {
            let mut skipped = 0usize;
            for (scenario, episode) in episodes.iter().enumerate() {
                let (from_ms, to_ms) = episode.bounds_ms();
                let candles = source
                    .get_candles(&config.symbol, from_ms, to_ms)
                    .with_context(|| format!("failed to fetch {} episode {}", label, scenario))?;
                let mut sampled = resample(&candles, config.candle_minutes)?;

                if sampled.height() < config.min_candle_population {
                    debug!(
                        "Skipping {} episode {}: {} candles < {}",
                        label,
                        scenario,
                        sampled.height(),
                        config.min_candle_population
                    );
                    skipped += 1;
                    continue;
                }

                let scenario_column = vec![scenario as u32; sampled.height()];
                sampled.with_column(Series::new(SCENARIO_COLUMN, scenario_column))?;
                storage.save_data(&sampled)?;
            }
            Ok(skipped)
        },
    )?;

    info!(
        "Written {} data: {} rows ({} of {} episodes skipped)",
        label,
        written,
        skipped,
        episodes.len()
    );
    Ok(written)
}

/// Build price (from `close`) and volume (from `volume`) features for one
/// scenario of an assembled table and merge them.
pub fn scenario_features(df: &DataFrame, features: &FeatureSetConfig) -> Result<FeatureOutput> {
    let price = PriceSeries::from_dataframe(df, "timestamp", "close")?;
    let mut outputs = vec![build(&price, &features.price)?];
    if !features.volume.is_empty() {
        let volume = PriceSeries::from_dataframe(df, "timestamp", "volume")?;
        outputs.push(build(&volume, &features.volume)?);
    }
    let output = merge(&outputs)?;
    debug!(
        "Scenario features: {:?}",
        output.metadata.specs().iter().map(|s| s.name()).collect::<Vec<_>>()
    );
    Ok(output)
}

/// Read an assembled partition file, compute features per scenario and
/// write one feature table (`timestamp`, `scenario`, `f_0..`) to `output`.
/// Scenarios too short for the configured features are skipped.
/// Returns the number of feature rows written.
pub fn export_features(input: &Path, features: &FeatureSetConfig, output: &Path) -> Result<usize> {
    let df = load_dataframe(input)?;
    let scenarios = df
        .partition_by_stable([SCENARIO_COLUMN], true)
        .context("failed to split the table by scenario")?;
    info!(
        "Loaded {} rows in {} scenarios from {}",
        df.height(),
        scenarios.len(),
        input.display()
    );

    let mut result: Option<DataFrame> = None;
    for scenario_df in &scenarios {
        let scenario = scenario_df
            .column(SCENARIO_COLUMN)?
            .cast(&DataType::UInt32)?
            .u32()?
            .get(0)
            .context("empty scenario partition")?;
        let scenario_df = scenario_df.sort(vec!["timestamp"], Default::default())?;

        let output = match scenario_features(&scenario_df, features) {
            Ok(output) => output,
            Err(e) => match e.downcast_ref::<FeatureError>() {
                Some(FeatureError::InsufficientHistory { .. }) => {
                    warn!("Skipping scenario {}: {}", scenario, e);
                    continue;
                }
                _ => return Err(e),
            },
        };

        let mut table = output.to_dataframe("f_")?;
        table.insert_column(1, Series::new(SCENARIO_COLUMN, vec![scenario; output.rows()]))?;
        match result.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&table)?;
            }
            None => result = Some(table),
        }
    }

    let Some(mut table) = result else {
        anyhow::bail!(
            "no scenario in {} is long enough for the configured features",
            input.display()
        );
    };
    table.align_chunks();
    measure_time("save feature parquet", || save_dataframe_parquet(&mut table, output))?;
    info!(
        "Wrote {} feature rows x {} columns to {}",
        table.height(),
        table.width(),
        output.display()
    );
    Ok(table.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_source::InMemoryCandleSource;
    use crate::config::{derive_min_candle_population, PrepareArgs};
    use crate::features::FeatureSpec;
    use crate::kline::Kline;
    use std::fs;
    use std::path::PathBuf;

    const MINUTE_MS: i64 = 60_000;

    /// One-minute candles for `days` days from 2020-01-01, with an optional
    /// hole (in days from the start) where no candle exists.
    fn minute_klines(days: i64, hole: Option<(i64, i64)>) -> Vec<Kline> {
        let start = 1_577_836_800_000i64;
        (0..days * 1440)
            .filter(|i| match hole {
                Some((from, to)) => *i < from * 1440 || *i >= to * 1440,
                None => true,
            })
            .map(|i| {
                let wave = ((i % 240) as f64 - 120.0).abs();
                Kline {
                    open_time: start + i * MINUTE_MS,
                    open: 1000.0 + wave,
                    high: 1001.0 + wave,
                    low: 999.0 + wave,
                    close: 1000.5 + wave,
                    volume: 1.0 + (i % 5) as f64,
                }
            })
            .collect()
    }

    fn prepare_config(output_data_dir: PathBuf) -> PrepareConfig {
        PrepareConfig::from_args(PrepareArgs {
            exchange: "kraken".to_string(),
            symbol: "ETHUSD".to_string(),
            input_data_dir: PathBuf::from("unused"),
            output_data_dir,
            start_date: "20200101".to_string(),
            time_windows_days: 10,
            data_length_days: 3,
            data_step_days: 1,
            split_ratio: 0.8,
            candle_minutes: 15,
            presence_ratio: 0.8,
            buffer_size: 100_000,
        })
        .unwrap()
    }

    #[test]
    fn test_prepare_writes_every_episode() {
        let dir = tempfile::tempdir().unwrap();
        let config = prepare_config(dir.path().to_path_buf());
        let source = InMemoryCandleSource::new(minute_klines(10, None));

        let (training_rows, eval_rows) = prepare_training_and_eval(&config, &source).unwrap();

        // 8 episodes of 3 days at 96 candles a day
        assert_eq!(training_rows + eval_rows, 8 * 3 * 96);
        assert_eq!(training_rows % (3 * 96), 0);
        assert!(dir.path().join("training").is_dir());
        assert!(dir.path().join("eval").is_dir());
    }

    #[test]
    fn test_prepare_skips_sparse_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let config = prepare_config(dir.path().to_path_buf());
        assert_eq!(config.min_candle_population, derive_min_candle_population(15, 3, 0.8));

        // day 4 missing: episodes starting on days 2, 3 and 4 fall below 80%
        let source = InMemoryCandleSource::new(minute_klines(10, Some((4, 5))));
        let (training_rows, eval_rows) = prepare_training_and_eval(&config, &source).unwrap();
        assert_eq!(training_rows + eval_rows, 5 * 3 * 96);
    }

    #[test]
    fn test_prepare_output_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = prepare_config(dir.path().to_path_buf());
        let source = InMemoryCandleSource::new(minute_klines(10, None));
        let (training_rows, _) = prepare_training_and_eval(&config, &source).unwrap();
        assert!(training_rows > 0);

        let training = load_dataframe(&dir.path().join("training").join("data_0.parquet")).unwrap();
        let names: Vec<String> = training
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["timestamp", "open", "high", "low", "close", "volume", "scenario"]);
        assert_eq!(training.height(), training_rows);

        let scenarios = training.column(SCENARIO_COLUMN).unwrap().u32().unwrap();
        assert_eq!(scenarios.get(0), Some(0));
    }

    #[test]
    fn test_export_features_per_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let config = prepare_config(dir.path().to_path_buf());
        let source = InMemoryCandleSource::new(minute_klines(10, None));
        let (training_rows, _) = prepare_training_and_eval(&config, &source).unwrap();
        let episodes_written = training_rows / (3 * 96);

        let features = FeatureSetConfig {
            price: vec![FeatureSpec::log_price(10), FeatureSpec::rsi(14, 3)],
            volume: vec![FeatureSpec::log_price(5)],
        };
        let input = dir.path().join("training").join("data_0.parquet");
        let output = dir.path().join("features.parquet");
        let rows = export_features(&input, &features, &output).unwrap();

        // per scenario: min(288 - 10, 288 - 14 - 3 + 1, 288 - 5) = 272
        assert_eq!(rows, episodes_written * 272);
        let table = load_dataframe(&output).unwrap();
        assert_eq!(table.height(), rows);
        assert_eq!(table.width(), 2 + 10 + 3 + 5);
        assert!(fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn test_export_keeps_long_scenarios_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mixed.parquet");

        // scenario 0: 40 candles, scenario 1: 3 candles
        let timestamps: Vec<i64> = (0..43).map(|i| i * 900_000).collect();
        let closes: Vec<f64> = (0..43).map(|i| 100.0 + ((i % 6) as f64 - 3.0).abs()).collect();
        let scenarios: Vec<u32> = (0..43).map(|i| if i < 40 { 0 } else { 1 }).collect();
        let mut df = df!(
            "timestamp" => timestamps,
            "open" => closes.clone(),
            "high" => closes.clone(),
            "low" => closes.clone(),
            "close" => closes,
            "volume" => vec![1.0; 43],
            "scenario" => scenarios,
        )
        .unwrap();
        save_dataframe_parquet(&mut df, &input).unwrap();

        let features = FeatureSetConfig {
            price: vec![FeatureSpec::rsi(14, 3)],
            volume: vec![],
        };
        let output = dir.path().join("out.parquet");
        let rows = export_features(&input, &features, &output).unwrap();

        // 40 - 14 - 3 + 1
        assert_eq!(rows, 24);
        let table = load_dataframe(&output).unwrap();
        assert_eq!(table.shape(), (24, 5));
        let written: Vec<u32> = table
            .column(SCENARIO_COLUMN)
            .unwrap()
            .u32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!(written.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_export_fails_when_every_scenario_is_short() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("short.parquet");
        let mut df = df!(
            "timestamp" => [0i64, 900_000, 1_800_000],
            "open" => [1.0, 1.0, 1.0],
            "high" => [1.0, 1.0, 1.0],
            "low" => [1.0, 1.0, 1.0],
            "close" => [1.0, 2.0, 3.0],
            "volume" => [1.0, 1.0, 1.0],
            "scenario" => [0u32, 0, 0],
        )
        .unwrap();
        save_dataframe_parquet(&mut df, &input).unwrap();

        let features = FeatureSetConfig {
            price: vec![FeatureSpec::rsi(14, 3)],
            volume: vec![],
        };
        let result = export_features(&input, &features, &dir.path().join("out.parquet"));
        assert!(result.is_err());
    }
}
