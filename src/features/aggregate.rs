//! Aligns several feature arrays on their trailing rows and concatenates them
//! column-wise.
//!
//! Each indicator loses a different number of leading rows to warm-up, so
//! alignment always keeps the most recent rows: the rows that survive in
//! every array correspond to the same trailing timestamps.

use super::{FeatureGenerator, FeatureSpec, PriceSeries};
use crate::error::{FeatureError, FeatureResult};
use ndarray::{concatenate, s, Array2, ArrayView2, Axis};
use polars::prelude::*;
use tracing::debug;

/// Which specs produced the columns of a [`FeatureOutput`], in column order.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureMetadata {
    Specs(Vec<FeatureSpec>),
    Merged(Vec<FeatureMetadata>),
}

impl FeatureMetadata {
    /// Specs in column order, flattening merged groups.
    pub fn specs(&self) -> Vec<&FeatureSpec> {
        match self {
            FeatureMetadata::Specs(specs) => specs.iter().collect(),
            FeatureMetadata::Merged(groups) => groups.iter().flat_map(|g| g.specs()).collect(),
        }
    }
}

/// An aligned feature matrix and the timestamps of its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOutput {
    pub metadata: FeatureMetadata,
    pub time_index: Vec<i64>,
    pub feature_data: Array2<f64>,
}

impl FeatureOutput {
    pub fn rows(&self) -> usize {
        self.feature_data.nrows()
    }

    pub fn columns(&self) -> usize {
        self.feature_data.ncols()
    }

    /// Render as a table: `timestamp` plus one `{prefix}{j}` column per feature column.
    pub fn to_dataframe(&self, prefix: &str) -> PolarsResult<DataFrame> {
        let mut columns = Vec::with_capacity(self.columns() + 1);
        columns.push(
            Series::new("timestamp", self.time_index.clone())
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        );
        for (j, column) in self.feature_data.axis_iter(Axis(1)).enumerate() {
            columns.push(Series::new(&format!("{}{}", prefix, j), column.to_vec()));
        }
        DataFrame::new(columns)
    }
}

/// Keep the last `min rows` of every array and of `time_index`, then
/// concatenate the arrays along the column axis in input order.
pub fn align_and_concatenate(
    feature_arrays: &[Array2<f64>],
    time_index: &[i64],
) -> FeatureResult<(Array2<f64>, Vec<i64>)> {
    let rows = feature_arrays
        .iter()
        .map(|a| a.nrows())
        .min()
        .ok_or(FeatureError::EmptyInput("no feature arrays"))?;

    if time_index.len() < rows {
        return Err(FeatureError::TimeIndexTooShort {
            index_len: time_index.len(),
            rows,
        });
    }

    let views: Vec<ArrayView2<f64>> = feature_arrays
        .iter()
        .map(|a| a.slice(s![a.nrows() - rows.., ..]))
        .collect();
    let aligned = concatenate(Axis(1), &views)
        .map_err(|e| FeatureError::InvalidSeries(e.to_string()))?;

    Ok((aligned, time_index[time_index.len() - rows..].to_vec()))
}

/// Compute every spec against `series`, normalized, and align the results.
pub fn build(series: &PriceSeries, feature_specs: &[FeatureSpec]) -> FeatureResult<FeatureOutput> {
    if feature_specs.is_empty() {
        return Err(FeatureError::EmptyInput("no feature specs"));
    }

    let mut feature_set = Vec::with_capacity(feature_specs.len());
    for spec in feature_specs {
        let generator = FeatureGenerator::new(spec, series.values())?;
        let array = generator.output_feature_array(true)?;
        debug!(feature = spec.name(), rows = array.nrows(), cols = array.ncols(), "feature array");
        feature_set.push(array);
    }

    let (feature_data, time_index) = align_and_concatenate(&feature_set, series.timestamps())?;
    Ok(FeatureOutput {
        metadata: FeatureMetadata::Specs(feature_specs.to_vec()),
        time_index,
        feature_data,
    })
}

/// Combine outputs built from different series sampled on the same clock
/// (e.g. close price and volume).
///
/// The longest time index is the reference. Every output's trailing rows
/// must carry the same timestamps as the reference's, otherwise the rows
/// would be silently misaligned and [`FeatureError::TimeBaseMismatch`] is
/// returned.
pub fn merge(outputs: &[FeatureOutput]) -> FeatureResult<FeatureOutput> {
    let reference = outputs
        .iter()
        .max_by_key(|o| o.time_index.len())
        .ok_or(FeatureError::EmptyInput("no feature outputs"))?;

    let rows = outputs.iter().map(|o| o.rows()).min().unwrap_or(0);
    if reference.time_index.len() < rows {
        return Err(FeatureError::TimeIndexTooShort {
            index_len: reference.time_index.len(),
            rows,
        });
    }
    let reference_tail = &reference.time_index[reference.time_index.len() - rows..];

    for (position, output) in outputs.iter().enumerate() {
        let index = &output.time_index;
        if index.len() < rows || &index[index.len() - rows..] != reference_tail {
            return Err(FeatureError::TimeBaseMismatch { position });
        }
    }

    let arrays: Vec<Array2<f64>> = outputs.iter().map(|o| o.feature_data.clone()).collect();
    let (feature_data, time_index) = align_and_concatenate(&arrays, &reference.time_index)?;

    Ok(FeatureOutput {
        metadata: FeatureMetadata::Merged(outputs.iter().map(|o| o.metadata.clone()).collect()),
        time_index,
        feature_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::descending_then_ascending;
    use approx::assert_abs_diff_eq;

    const LOOK_BACK: usize = 3;
    const LOG_PRICE_LOOKBACK: usize = 10;

    fn hourly(values: Vec<f64>) -> PriceSeries {
        let timestamps = (0..values.len() as i64)
            .map(|i| 1_600_000_000_000 + i * 3_600_000)
            .collect();
        PriceSeries::new(timestamps, values).unwrap()
    }

    fn price_specs() -> Vec<FeatureSpec> {
        vec![
            FeatureSpec::log_price(LOG_PRICE_LOOKBACK),
            FeatureSpec::rsi(14, LOOK_BACK),
            FeatureSpec::sma_cross(20, 50, LOOK_BACK),
        ]
    }

    fn volume_specs() -> Vec<FeatureSpec> {
        vec![FeatureSpec::LogPrice(crate::features::LogPriceSpec {
            dimension: LOG_PRICE_LOOKBACK * 2,
            normalize_value: 5.0,
        })]
    }

    #[test]
    fn test_align_keeps_trailing_rows() {
        let a = Array2::from_shape_fn((5, 2), |(i, j)| (i * 10 + j) as f64);
        let b = Array2::from_shape_fn((3, 1), |(i, _)| 100.0 + i as f64);
        let index: Vec<i64> = (0..6).collect();

        let (aligned, time_index) = align_and_concatenate(&[a.clone(), b.clone()], &index).unwrap();
        assert_eq!(aligned.dim(), (3, 3));
        assert_eq!(time_index, vec![3, 4, 5]);
        assert_eq!(aligned.slice(s![.., ..2]), a.slice(s![2.., ..]));
        assert_eq!(aligned.slice(s![.., 2..]), b);
    }

    #[test]
    fn test_align_errors() {
        assert_eq!(
            align_and_concatenate(&[], &[1, 2]),
            Err(FeatureError::EmptyInput("no feature arrays"))
        );
        let a = Array2::<f64>::zeros((4, 1));
        assert!(matches!(
            align_and_concatenate(&[a], &[1, 2]),
            Err(FeatureError::TimeIndexTooShort { index_len: 2, rows: 4 })
        ));
    }

    #[test]
    fn test_build_matches_individual_generators() {
        let series = hourly(descending_then_ascending(100, 100.0));
        let specs = price_specs();

        let arrays: Vec<Array2<f64>> = specs
            .iter()
            .map(|spec| {
                FeatureGenerator::new(spec, series.values())
                    .unwrap()
                    .output_feature_array(true)
                    .unwrap()
            })
            .collect();
        let expected_rows = arrays.iter().map(|a| a.nrows()).min().unwrap();

        let output = build(&series, &specs).unwrap();
        assert_eq!(output.feature_data.dim(), (expected_rows, LOG_PRICE_LOOKBACK + 2 * LOOK_BACK));
        assert_eq!(output.time_index.len(), output.rows());
        assert_eq!(output.metadata, FeatureMetadata::Specs(specs.clone()));
        assert_eq!(
            output.time_index.as_slice(),
            &series.timestamps()[series.len() - expected_rows..]
        );

        let mut offset = 0;
        for array in &arrays {
            let width = array.ncols();
            let expected = array.slice(s![array.nrows() - expected_rows.., ..]);
            let actual = output.feature_data.slice(s![.., offset..offset + width]);
            for (x, y) in actual.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(x, y, epsilon = 1e-12);
            }
            offset += width;
        }
    }

    #[test]
    fn test_build_rejects_short_series() {
        let series = hourly(descending_then_ascending(30, 100.0));
        assert!(matches!(
            build(&series, &price_specs()),
            Err(FeatureError::InsufficientHistory { feature: "SMA_CROSS", .. })
        ));
        assert!(matches!(build(&series, &[]), Err(FeatureError::EmptyInput(_))));
    }

    #[test]
    fn test_merge_price_and_volume() {
        let closes = descending_then_ascending(500, 100.0);
        let volumes: Vec<f64> = (0..500).map(|i| 50.0 + (i % 7) as f64 * 3.0).collect();
        let price_output = build(&hourly(closes), &price_specs()).unwrap();
        let volume_output = build(&hourly(volumes), &volume_specs()).unwrap();

        let merged = merge(&[price_output.clone(), volume_output.clone()]).unwrap();
        let rows = price_output.rows().min(volume_output.rows());
        assert_eq!(merged.rows(), rows);
        assert_eq!(merged.columns(), price_output.columns() + volume_output.columns());
        assert_eq!(merged.time_index.len(), rows);

        let longest = if price_output.time_index.len() > volume_output.time_index.len() {
            &price_output.time_index
        } else {
            &volume_output.time_index
        };
        assert_eq!(merged.time_index.as_slice(), &longest[longest.len() - rows..]);

        let width = price_output.columns();
        assert_eq!(
            merged.feature_data.slice(s![.., ..width]),
            price_output.feature_data.slice(s![price_output.rows() - rows.., ..])
        );
        assert_eq!(
            merged.feature_data.slice(s![.., width..]),
            volume_output.feature_data.slice(s![volume_output.rows() - rows.., ..])
        );
        assert_eq!(
            merged.metadata,
            FeatureMetadata::Merged(vec![
                price_output.metadata.clone(),
                volume_output.metadata.clone(),
            ])
        );
        assert_eq!(merged.metadata.specs().len(), 4);
    }

    #[test]
    fn test_merge_rejects_different_time_base() {
        let closes = descending_then_ascending(200, 100.0);
        let price_output = build(&hourly(closes.clone()), &price_specs()).unwrap();

        let shifted = PriceSeries::new(
            (0..200i64).map(|i| 1_700_000_000_000 + i * 60_000).collect(),
            closes,
        )
        .unwrap();
        let other = build(&shifted, &volume_specs()).unwrap();

        assert!(matches!(
            merge(&[price_output, other]),
            Err(FeatureError::TimeBaseMismatch { .. })
        ));
        assert!(matches!(merge(&[]), Err(FeatureError::EmptyInput(_))));
    }

    #[test]
    fn test_to_dataframe_columns() {
        let series = hourly(descending_then_ascending(100, 100.0));
        let output = build(&series, &[FeatureSpec::rsi(14, LOOK_BACK)]).unwrap();
        let df = output.to_dataframe("f_").unwrap();
        assert_eq!(df.height(), output.rows());
        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["timestamp", "f_0", "f_1", "f_2"]);
    }
}
