//! Tests for metadata and sea-level-rise table parsing

use super::*;
use crate::Error;
use crate::app::services::table_loader::{load_metadata, load_slr_references};
use tempfile::TempDir;

#[test]
fn test_load_metadata() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        dir.path(),
        "set_metadata.csv",
        "unique_set_id,reserve,latitude,longitude,numerical_order,user_friendly_set_name,set_type,dominant_species\n\
         GTM-1,GTM,29.71,-81.25,2,Pellicer Creek,RSET,Spartina alterniflora\n\
         GTM-2,GTM,29.72,-81.26,NA,,RSET,\n",
    );

    let metadata = load_metadata(&path).unwrap();
    assert_eq!(metadata.len(), 2);
    assert_eq!(metadata[0].unique_set_id, "GTM-1");
    assert_eq!(metadata[0].latitude, Some(29.71));
    assert_eq!(metadata[0].numerical_order, Some(2));
    assert_eq!(
        metadata[0].user_friendly_set_name.as_deref(),
        Some("Pellicer Creek")
    );
    assert_eq!(metadata[1].numerical_order, None);
    assert_eq!(metadata[1].user_friendly_set_name, None);
    assert_eq!(metadata[1].dominant_species, None);
}

#[test]
fn test_metadata_optional_columns_may_be_absent() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        dir.path(),
        "metadata.csv",
        "unique_set_id,reserve\nGTM-1,GTM\n",
    );

    let metadata = load_metadata(&path).unwrap();
    assert_eq!(metadata[0].latitude, None);
    assert_eq!(metadata[0].set_type, None);
}

#[test]
fn test_load_slr_references() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        dir.path(),
        "slr_rates.csv",
        "reserve,slr_rate_mm_yr,ci_95_percent,nearest_station,station_number,data_start,data_end\n\
         GTM,2.2,0.19,Fernandina Beach,8720030,1897,2023\n\
         WQB,,,Woods Hole,8447930,1932,2023\n",
    );

    let references = load_slr_references(&path).unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].reserve, "GTM");
    assert_eq!(references[0].slr_rate, 2.2);
    assert_eq!(references[0].ci_95, 0.19);
    assert_eq!(references[0].station_number.as_deref(), Some("8720030"));
}

#[test]
fn test_slr_requires_rate_column() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "slr.csv", "reserve,ci_95_percent\nGTM,0.2\n");

    let error = load_slr_references(&path).unwrap_err();
    assert!(matches!(error, Error::MissingColumn { ref column, .. } if column == "slr_rate_mm_yr"));
}
