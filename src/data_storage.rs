//! Buffered parquet output for assembled datasets.

use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Load a DataFrame from a Parquet file.
pub fn load_dataframe(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let df = ParquetReader::new(file).finish()?;
    Ok(df)
}

/// Save a DataFrame to a Parquet file (overwrites if exists).
pub fn save_dataframe_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    ParquetWriter::new(file).finish(df)?;
    Ok(())
}

/// Append-only table writer that persists one parquet file per full buffer.
///
/// Files are named `<prefix>_<n>.parquet` with `n` counting from 0. Rows
/// still buffered are only persisted by [`TrainingDataStorage::flush`];
/// [`TrainingDataStorage::scoped`] guarantees that call.
#[derive(Debug)]
pub struct TrainingDataStorage {
    output_folder: PathBuf,
    buffer_size: usize,
    datafile_prefix: String,
    buffer: Option<DataFrame>,
    buffer_save_counter: usize,
    written_rows: usize,
}

impl TrainingDataStorage {
    pub fn new(
        output_folder: impl Into<PathBuf>,
        buffer_size: usize,
        datafile_prefix: &str,
    ) -> Result<Self> {
        let output_folder = output_folder.into();
        fs::create_dir_all(&output_folder)
            .with_context(|| format!("failed to create {}", output_folder.display()))?;
        Ok(Self {
            output_folder,
            buffer_size: buffer_size.max(1),
            datafile_prefix: datafile_prefix.to_string(),
            buffer: None,
            buffer_save_counter: 0,
            written_rows: 0,
        })
    }

    /// Open a storage, hand it to `f`, and flush on every exit path.
    ///
    /// An error from `f` takes precedence over a flush error. On success
    /// returns `f`'s value and the total number of rows written.
    pub fn scoped<T, F>(
        output_folder: impl Into<PathBuf>,
        buffer_size: usize,
        datafile_prefix: &str,
        f: F,
    ) -> Result<(T, usize)>
    where
        F: FnOnce(&mut TrainingDataStorage) -> Result<T>,
    {
        let mut storage = Self::new(output_folder, buffer_size, datafile_prefix)?;
        let result = f(&mut storage);
        let flushed = storage.flush();
        info!(
            "Training data storage closed in {}, total written: {}",
            storage.output_folder.display(),
            storage.written_rows
        );

        match (result, flushed) {
            (Ok(value), Ok(())) => Ok((value, storage.written_rows)),
            (Err(e), flush_result) => {
                if let Err(flush_err) = flush_result {
                    warn!("flush after failure also failed: {:#}", flush_err);
                }
                Err(e)
            }
            (Ok(_), Err(flush_err)) => Err(flush_err),
        }
    }

    pub fn save_data(&mut self, data: &DataFrame) -> Result<()> {
        match self.buffer.as_mut() {
            Some(buffer) => {
                buffer
                    .vstack_mut(data)
                    .context("appended rows do not match the buffered schema")?;
            }
            None => self.buffer = Some(data.clone()),
        }

        if self.buffered_rows() >= self.buffer_size {
            self.save_buffer()?;
        }
        Ok(())
    }

    fn save_buffer(&mut self) -> Result<()> {
        let Some(mut buffer) = self.buffer.take() else {
            return Ok(());
        };
        let filename = format!("{}_{}.parquet", self.datafile_prefix, self.buffer_save_counter);
        let filepath = self.output_folder.join(filename);

        buffer.align_chunks();
        save_dataframe_parquet(&mut buffer, &filepath)?;
        self.written_rows += buffer.height();
        self.buffer_save_counter += 1;
        debug!("Saved {} rows to {}", buffer.height(), filepath.display());
        Ok(())
    }

    /// Persist whatever is still buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffered_rows() > 0 {
            self.save_buffer()?;
        }
        Ok(())
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.height())
    }

    pub fn written_rows(&self) -> usize {
        self.written_rows
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }
}
