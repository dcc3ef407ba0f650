//! Sea-level-rise reference table parsing

use super::{TextColumn, read_table};
use crate::Result;
use crate::app::models::SlrReference;
use crate::constants::columns;
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::{info, warn};

const TABLE: &str = "SLR";

/// Load and parse the sea-level-rise reference table
pub fn load_slr_references(path: &Path) -> Result<Vec<SlrReference>> {
    let df = read_table(path, TABLE)?;
    let references = slr_from_frame(&df)?;
    info!(
        "Loaded {} sea-level-rise references from {}",
        references.len(),
        path.display()
    );
    Ok(references)
}

/// Parse reference rows; rows without a rate or interval are skipped
pub fn slr_from_frame(df: &DataFrame) -> Result<Vec<SlrReference>> {
    let reserve = TextColumn::required(df, TABLE, columns::RESERVE)?;
    let rate = TextColumn::required(df, TABLE, columns::SLR_RATE)?;
    let ci = TextColumn::required(df, TABLE, columns::SLR_CI_95)?;
    let station = TextColumn::optional(df, TABLE, columns::NEAREST_STATION)?;
    let number = TextColumn::optional(df, TABLE, columns::STATION_NUMBER)?;
    let start = TextColumn::optional(df, TABLE, columns::DATA_START)?;
    let end = TextColumn::optional(df, TABLE, columns::DATA_END)?;

    let text = |column: &Option<TextColumn>, row: usize| {
        column
            .as_ref()
            .and_then(|c| c.text(row))
            .map(str::to_string)
    };

    let mut references = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let Some(name) = reserve.text(row) else {
            continue;
        };
        let (Some(slr_rate), Some(ci_95)) = (rate.number(row)?, ci.number(row)?) else {
            warn!("Sea-level-rise row for reserve {} has no rate or interval; skipped", name);
            continue;
        };
        references.push(SlrReference {
            reserve: name.to_string(),
            slr_rate,
            ci_95,
            nearest_station: text(&station, row),
            station_number: text(&number, row),
            data_start: text(&start, row),
            data_end: text(&end, row),
        });
    }
    Ok(references)
}
