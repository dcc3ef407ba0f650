//! Measurement table parsing

use super::{TextColumn, has_column, read_table};
use crate::app::models::Measurement;
use crate::constants::columns;
use crate::{Error, Result};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::info;

const TABLE: &str = "measurement";

/// Load and parse the measurement table
pub fn load_measurements(path: &Path) -> Result<Vec<Measurement>> {
    let df = read_table(path, TABLE)?;
    let measurements = measurements_from_frame(&df)?;
    info!(
        "Loaded {} pin readings from {}",
        measurements.len(),
        path.display()
    );
    Ok(measurements)
}

/// Parse measurement rows from an all-string frame
pub fn measurements_from_frame(df: &DataFrame) -> Result<Vec<Measurement>> {
    let reserve = TextColumn::required(df, TABLE, columns::RESERVE)?;
    let set_id = TextColumn::required(df, TABLE, columns::SET_ID)?;
    let arm = TextColumn::required(df, TABLE, columns::ARM_POSITION)?;
    let pin = TextColumn::required(df, TABLE, columns::PIN_NUMBER)?;
    let year = TextColumn::required(df, TABLE, columns::YEAR)?;
    let month = TextColumn::required(df, TABLE, columns::MONTH)?;
    let day = TextColumn::required(df, TABLE, columns::DAY)?;
    let (height, to_mm) = height_column(df)?;
    let qaqc = TextColumn::optional(df, TABLE, columns::QAQC_CODE)?;
    let arm_qaqc = TextColumn::optional(df, TABLE, columns::ARM_QAQC_CODE)?;

    let mut measurements = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        measurements.push(Measurement {
            reserve: reserve.require_text(row)?.to_string(),
            set_id: set_id.require_text(row)?.to_string(),
            arm_position: arm.require_text(row)?.to_string(),
            pin_number: pin.require_text(row)?.to_string(),
            date: parse_date(row, &year, &month, &day)?,
            pin_height: height.number(row)?.map(|h| h * to_mm),
            qaqc_code: qaqc.as_ref().and_then(|c| c.text(row)).map(str::to_string),
            arm_qaqc_code: arm_qaqc
                .as_ref()
                .and_then(|c| c.text(row))
                .map(str::to_string),
        });
    }
    Ok(measurements)
}

/// First accepted height column with its multiplier to millimetres
fn height_column(df: &DataFrame) -> Result<(TextColumn, f64)> {
    for (name, to_mm) in columns::PIN_HEIGHT_CANDIDATES {
        if has_column(df, name) {
            return Ok((TextColumn::required(df, TABLE, name)?, *to_mm));
        }
    }
    Err(Error::missing_column(
        TABLE,
        columns::PIN_HEIGHT_CANDIDATES[0].0,
    ))
}

fn parse_date(
    row: usize,
    year: &TextColumn,
    month: &TextColumn,
    day: &TextColumn,
) -> Result<NaiveDate> {
    let part = |column: &TextColumn| -> Result<i64> {
        column.integer(row)?.ok_or_else(|| {
            Error::value_parsing(TABLE, row + 1, column.name(), "missing value")
        })
    };
    let (y, m, d) = (part(year)?, part(month)?, part(day)?);

    let invalid = || Error::InvalidDate {
        row: row + 1,
        year: y as i32,
        month: m as u32,
        day: d as u32,
    };
    let (Ok(y32), Ok(m32), Ok(d32)) = (i32::try_from(y), u32::try_from(m), u32::try_from(d)) else {
        return Err(invalid());
    };
    NaiveDate::from_ymd_opt(y32, m32, d32).ok_or_else(invalid)
}
