//! CSV table loading for measurements, site metadata and SLR references
//!
//! Every table is read with polars with all columns as strings, then parsed
//! cell by cell so that errors can name the table, row and column. Header
//! names are trimmed and lower-cased before lookup. Cells matching one of
//! [`NULL_MARKERS`](crate::constants::NULL_MARKERS) are treated as missing.
//!
//! # Architecture
//!
//! - [`measurements`] - pin readings with calendar dates and normalised heights
//! - [`metadata`] - per-SET site metadata
//! - [`slr`] - per-reserve sea-level-rise references

pub mod measurements;
pub mod metadata;
pub mod slr;

#[cfg(test)]
pub mod tests;

pub use measurements::load_measurements;
pub use metadata::load_metadata;
pub use slr::load_slr_references;

use crate::constants::NULL_MARKERS;
use crate::{Error, Result};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Read a CSV file with every column as a string
pub fn read_table(path: &Path, table: &str) -> Result<DataFrame> {
    let context = format!("{} table {}", table, path.display());
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| Error::polars(context.clone(), e))?;

    let normalized: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| normalize_header(name.as_str()))
        .collect();
    df.set_column_names(normalized)
        .map_err(|e| Error::polars(context, e))?;

    debug!(
        "Read {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// String cells of one column, with null markers mapped to `None`
pub(crate) struct TextColumn {
    table: &'static str,
    name: String,
    values: Vec<Option<String>>,
}

impl TextColumn {
    /// Required column; absence is a missing-column error
    pub fn required(df: &DataFrame, table: &'static str, name: &str) -> Result<Self> {
        Self::optional(df, table, name)?.ok_or_else(|| Error::missing_column(table, name))
    }

    /// Optional column; `None` when the table does not have it
    pub fn optional(df: &DataFrame, table: &'static str, name: &str) -> Result<Option<Self>> {
        if !has_column(df, name) {
            return Ok(None);
        }
        let context = format!("{} table column '{}'", table, name);
        let series = df
            .column(name)
            .and_then(|c| c.as_materialized_series().cast(&DataType::String))
            .map_err(|e| Error::polars(context.clone(), e))?;
        let values = series
            .str()
            .map_err(|e| Error::polars(context, e))?
            .into_iter()
            .map(clean_cell)
            .collect();
        Ok(Some(Self {
            table,
            name: name.to_string(),
            values,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cell text for a row, if present
    pub fn text(&self, row: usize) -> Option<&str> {
        self.values.get(row).and_then(|v| v.as_deref())
    }

    /// Cell text that must be present
    pub fn require_text(&self, row: usize) -> Result<&str> {
        self.text(row)
            .ok_or_else(|| Error::value_parsing(self.table, row + 1, &self.name, "missing value"))
    }

    /// Cell parsed as a number; missing cells are `None`
    pub fn number(&self, row: usize) -> Result<Option<f64>> {
        self.text(row)
            .map(|text| {
                text.parse::<f64>().map_err(|_| {
                    Error::value_parsing(
                        self.table,
                        row + 1,
                        &self.name,
                        format!("'{}' is not a number", text),
                    )
                })
            })
            .transpose()
    }

    /// Cell parsed as a whole number; accepts integral decimals such as `2015.0`
    pub fn integer(&self, row: usize) -> Result<Option<i64>> {
        let Some(value) = self.number(row)? else {
            return Ok(None);
        };
        if value.fract() != 0.0 || !value.is_finite() {
            return Err(Error::value_parsing(
                self.table,
                row + 1,
                &self.name,
                format!("{} is not a whole number", value),
            ));
        }
        Ok(Some(value as i64))
    }
}

/// True when the table has a column with this (normalised) name
pub(crate) fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

fn clean_cell(cell: Option<&str>) -> Option<String> {
    let trimmed = cell?.trim();
    if NULL_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}
