pub mod candle_source;
pub mod config;
pub mod data_storage;
pub mod dataset;
pub mod episodes;
pub mod error;
pub mod features;
pub mod kline;
pub mod resample;
pub mod utils;
