//! Tabular input handling
//!
//! Wraps a polars [`DataFrame`] parsed from comma-separated text with a
//! header row. Column lookups are exact and case-sensitive.

use crate::error::{ExoError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// Parsed CSV table
#[derive(Debug, Clone)]
pub struct TabularData {
    df: DataFrame,
}

impl TabularData {
    /// Parse CSV text held in memory
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ExoError::InvalidTabularFormat("CSV input is empty".to_string()));
        }
        let df = CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| ExoError::InvalidTabularFormat(format!("Invalid CSV file format: {}", e)))?;
        Ok(Self { df })
    }

    /// Read and parse a CSV file from disk
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_csv_bytes(&bytes)
    }

    /// Number of data rows (header excluded)
    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.column(name).is_ok()
    }

    /// Every name from `required` that is absent, in the order given
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Fail with [`ExoError::MissingColumns`] listing every absent column
    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ExoError::MissingColumns(missing))
        }
    }

    /// Numeric view of a column; nulls and unparseable cells become `None`
    pub fn float_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self
            .df
            .column(name)
            .map_err(|_| ExoError::MissingColumns(vec![name.to_string()]))?;
        let as_f64 = column.as_materialized_series().cast(&DataType::Float64)?;
        Ok(as_f64.f64()?.into_iter().collect())
    }

    /// Textual view of a column. Numeric cells are rendered with `Display`
    /// so a code column `1.0` reads as `"1"`.
    pub fn text_column(&self, name: &str) -> Result<Vec<Option<String>>> {
        let column = self
            .df
            .column(name)
            .map_err(|_| ExoError::MissingColumns(vec![name.to_string()]))?;
        let series = column.as_materialized_series();
        match series.dtype() {
            DataType::String => Ok(series
                .str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect()),
            _ => {
                let as_f64 = series.cast(&DataType::Float64)?;
                Ok(as_f64
                    .f64()?
                    .into_iter()
                    .map(|v| v.map(|x| x.to_string()))
                    .collect())
            }
        }
    }

    /// Per-row feature columns in schema order, `None` where a cell is missing
    pub fn feature_rows(&self) -> Result<Vec<[Option<f64>; FEATURE_COUNT]>> {
        self.require_columns(&FEATURE_NAMES)?;
        let columns = FEATURE_NAMES
            .iter()
            .map(|name| self.float_column(name))
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.height())
            .map(|r| std::array::from_fn(|c| columns[c][r]))
            .collect())
    }

    /// Feature vectors for every row. A missing or non-numeric cell fails with
    /// [`ExoError::InvalidTabularFormat`] naming the 1-based row and column.
    pub fn feature_vectors(&self) -> Result<Vec<FeatureVector>> {
        self.feature_rows()?
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let mut values = [0.0; FEATURE_COUNT];
                for (c, cell) in row.iter().enumerate() {
                    values[c] = cell.ok_or_else(|| {
                        ExoError::InvalidTabularFormat(format!(
                            "row {} has a missing or non-numeric value in column '{}'",
                            i + 1,
                            FEATURE_NAMES[c]
                        ))
                    })?;
                }
                Ok(FeatureVector::from_values(values))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "orbital_period,transit_duration,transit_depth,planet_radius,signal_to_noise,koi_score,label\n\
54.32,3.45,0.0012,1.8,15.6,0.85,CONFIRMED\n\
12.45,2.11,0.0008,1.2,8.9,0.45,FALSE POSITIVE\n\
23.89,,0.0009,1.5,11.2,0.52,CANDIDATE\n";

    #[test]
    fn test_parse_and_inspect_columns() {
        let table = TabularData::from_csv_bytes(CSV.as_bytes()).unwrap();
        assert_eq!(table.height(), 3);
        assert!(table.has_column("koi_score"));
        assert!(!table.has_column("KOI_SCORE"));
        assert!(table.missing_columns(&FEATURE_NAMES).is_empty());
    }

    #[test]
    fn test_missing_cells_become_none() {
        let table = TabularData::from_csv_bytes(CSV.as_bytes()).unwrap();
        let durations = table.float_column("transit_duration").unwrap();
        assert_eq!(durations[0], Some(3.45));
        assert_eq!(durations[2], None);
    }

    #[test]
    fn test_text_column_reads_strings_and_codes() {
        let table = TabularData::from_csv_bytes(CSV.as_bytes()).unwrap();
        let labels = table.text_column("label").unwrap();
        assert_eq!(labels[1].as_deref(), Some("FALSE POSITIVE"));

        let coded = TabularData::from_csv_bytes(b"a,label\n1.0,1\n2.0,0\n").unwrap();
        let labels = coded.text_column("label").unwrap();
        assert_eq!(labels[0].as_deref(), Some("1"));
        assert_eq!(labels[1].as_deref(), Some("0"));
    }

    #[test]
    fn test_feature_vectors_reject_missing_cell() {
        let table = TabularData::from_csv_bytes(CSV.as_bytes()).unwrap();
        match table.feature_vectors() {
            Err(ExoError::InvalidTabularFormat(msg)) => {
                assert!(msg.contains("row 3"), "{}", msg);
                assert!(msg.contains("transit_duration"), "{}", msg);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_require_columns_lists_all_missing() {
        let table = TabularData::from_csv_bytes(b"orbital_period,transit_depth\n1.0,2.0\n").unwrap();
        match table.require_columns(&FEATURE_NAMES) {
            Err(ExoError::MissingColumns(cols)) => assert_eq!(
                cols,
                vec!["transit_duration", "planet_radius", "signal_to_noise", "koi_score"]
            ),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_only_absent_score_column_is_reported() {
        let table = TabularData::from_csv_bytes(
            b"orbital_period,transit_duration,transit_depth,planet_radius,signal_to_noise\n1,2,3,4,5\n",
        )
        .unwrap();
        match table.feature_vectors() {
            Err(ExoError::MissingColumns(cols)) => assert_eq!(cols, vec!["koi_score".to_string()]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_is_invalid() {
        assert!(matches!(
            TabularData::from_csv_bytes(b"   \n"),
            Err(ExoError::InvalidTabularFormat(_))
        ));
    }
}
