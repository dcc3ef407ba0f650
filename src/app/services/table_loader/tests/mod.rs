//! Shared fixtures for table loader tests

use std::fs;
use std::path::{Path, PathBuf};

pub mod reference_tests;

/// Write `content` to `dir/name` and return the path
pub fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub const MEASUREMENTS_CSV: &str = "\
reserve,set_id,arm_position,pin_number,year,month,day,pin_height,qaqc_code,arm_qaqc_code
GTM,GTM-1,1,1,2015,3,1,152.0,,
GTM,GTM-1,1,2,2015,3,1,NA,D1,
GTM,GTM-1,2,1,2016,2,29,155.5,,SV
";
