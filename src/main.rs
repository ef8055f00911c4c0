use anyhow::Result;
use candle_features::candle_source::ParquetCandleSource;
use candle_features::config::{
    FeatureSetConfig, PrepareArgs, PrepareConfig, DEFAULT_BUFFER_SIZE, DEFAULT_PRESENCE_RATIO,
};
use candle_features::dataset::{export_features, prepare_training_and_eval};
use candle_features::utils::measure_time;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "candle_features", about = "Candle dataset preparation and feature export")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a date range into episodes and store resampled candles per split.
    Prepare(PrepareCmd),
    /// Compute lookback features for every scenario of a prepared file.
    Features(FeaturesCmd),
}

#[derive(Args, Debug)]
struct PrepareCmd {
    #[arg(long)]
    exchange: String,
    #[arg(long)]
    symbol: String,
    #[arg(long)]
    input_data_dir: PathBuf,
    #[arg(long)]
    output_data_dir: PathBuf,
    /// First day of the range, YYYYMMDD
    #[arg(long)]
    start_date: String,
    /// Range length in days
    #[arg(long)]
    time_windows: u32,
    /// Episode length in days
    #[arg(long)]
    data_length: u32,
    /// Days between episode starts
    #[arg(long)]
    data_step: u32,
    #[arg(long)]
    split_ratio: f64,
    /// Resampled candle size in minutes
    #[arg(long)]
    candle_size: u32,
    /// Share of expected candles an episode must keep
    #[arg(long, default_value_t = DEFAULT_PRESENCE_RATIO)]
    presence_ratio: f64,
    /// Rows buffered before a parquet file is written
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
}

impl From<PrepareCmd> for PrepareArgs {
    fn from(cmd: PrepareCmd) -> Self {
        PrepareArgs {
            exchange: cmd.exchange,
            symbol: cmd.symbol,
            input_data_dir: cmd.input_data_dir,
            output_data_dir: cmd.output_data_dir,
            start_date: cmd.start_date,
            time_windows_days: cmd.time_windows,
            data_length_days: cmd.data_length,
            data_step_days: cmd.data_step,
            split_ratio: cmd.split_ratio,
            candle_minutes: cmd.candle_size,
            presence_ratio: cmd.presence_ratio,
            buffer_size: cmd.buffer_size,
        }
    }
}

#[derive(Args, Debug)]
struct FeaturesCmd {
    /// Prepared parquet file with a `scenario` column
    #[arg(long)]
    input: PathBuf,
    /// Feature set TOML
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

fn run_prepare(cmd: PrepareCmd) -> Result<()> {
    let config = PrepareConfig::from_args(cmd.into())?;
    info!(
        "Preparing {} {} from {} to {} (min candles per episode: {})",
        config.exchange,
        config.symbol,
        config.start_date,
        config.end_date,
        config.min_candle_population
    );

    let source = ParquetCandleSource::new(&config.input_data_dir, &config.exchange);
    let (training_rows, eval_rows) =
        measure_time("prepare dataset", || prepare_training_and_eval(&config, &source))?;
    info!("Training rows: {}, eval rows: {}", training_rows, eval_rows);
    Ok(())
}

fn run_features(cmd: FeaturesCmd) -> Result<()> {
    let features = FeatureSetConfig::load(&cmd.config)?;
    info!("Price features: {}", serde_json::to_string(&features.price)?);
    info!("Volume features: {}", serde_json::to_string(&features.volume)?);

    let rows = measure_time("export features", || {
        export_features(&cmd.input, &features, &cmd.output)
    })?;
    info!("Feature rows written: {}", rows);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Prepare(cmd) => run_prepare(cmd),
        Command::Features(cmd) => run_features(cmd),
    }
}
