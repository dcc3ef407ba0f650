//! Site metadata table parsing

use super::{TextColumn, read_table};
use crate::Result;
use crate::app::models::SiteMetadata;
use crate::constants::columns;
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::info;

const TABLE: &str = "metadata";

/// Load and parse the site metadata table
pub fn load_metadata(path: &Path) -> Result<Vec<SiteMetadata>> {
    let df = read_table(path, TABLE)?;
    let metadata = metadata_from_frame(&df)?;
    info!("Loaded metadata for {} sites from {}", metadata.len(), path.display());
    Ok(metadata)
}

/// Parse metadata rows; only `unique_set_id` and `reserve` are required
pub fn metadata_from_frame(df: &DataFrame) -> Result<Vec<SiteMetadata>> {
    let id = TextColumn::required(df, TABLE, columns::UNIQUE_SET_ID)?;
    let reserve = TextColumn::required(df, TABLE, columns::RESERVE)?;
    let latitude = TextColumn::optional(df, TABLE, columns::LATITUDE)?;
    let longitude = TextColumn::optional(df, TABLE, columns::LONGITUDE)?;
    let order = TextColumn::optional(df, TABLE, columns::NUMERICAL_ORDER)?;
    let name = TextColumn::optional(df, TABLE, columns::USER_FRIENDLY_SET_NAME)?;
    let set_type = TextColumn::optional(df, TABLE, columns::SET_TYPE)?;
    let species = TextColumn::optional(df, TABLE, columns::DOMINANT_SPECIES)?;

    let text = |column: &Option<TextColumn>, row: usize| {
        column
            .as_ref()
            .and_then(|c| c.text(row))
            .map(str::to_string)
    };

    let mut rows = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let Some(unique_set_id) = id.text(row) else {
            continue;
        };
        rows.push(SiteMetadata {
            unique_set_id: unique_set_id.to_string(),
            reserve: reserve.require_text(row)?.to_string(),
            latitude: latitude.as_ref().map(|c| c.number(row)).transpose()?.flatten(),
            longitude: longitude.as_ref().map(|c| c.number(row)).transpose()?.flatten(),
            numerical_order: order.as_ref().map(|c| c.integer(row)).transpose()?.flatten(),
            user_friendly_set_name: text(&name, row),
            set_type: text(&set_type, row),
            dominant_species: text(&species, row),
        });
    }
    Ok(rows)
}
