//! Application constants for SET processor
//!
//! This module contains thresholds, default values, column names and
//! classification labels used throughout the SET processor application.

// =============================================================================
// Time Conversion
// =============================================================================

/// Average Gregorian year length in days, used for elapsed years and mm/yr
pub const DAYS_PER_YEAR: f64 = 365.25;

// =============================================================================
// Eligibility Thresholds
// =============================================================================

/// Minimum span between first and last sampling date, in years
pub const DEFAULT_MIN_YEARS_SAMPLED: f64 = 4.5;

/// Minimum number of distinct sampling dates
pub const DEFAULT_MIN_SAMPLE_EVENTS: usize = 5;

// =============================================================================
// Model Fitting
// =============================================================================

/// Default confidence level for fixed-effect intervals
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Maximum number of deviance evaluations per optimisation
pub const DEFAULT_MAX_EVALUATIONS: usize = 4000;

/// Convergence tolerance on the spread of simplex deviances
pub const DEFAULT_OPTIMIZER_TOLERANCE: f64 = 1e-9;

/// Relative covariance factors below this are reported as a singular fit
pub const SINGULAR_THETA_THRESHOLD: f64 = 1e-4;

/// Initial simplex step for the relative covariance parameters
pub const INITIAL_SIMPLEX_STEP: f64 = 0.25;

// =============================================================================
// Input Tables
// =============================================================================

/// Input table column names
pub mod columns {
    pub const RESERVE: &str = "reserve";
    pub const SET_ID: &str = "set_id";
    pub const ARM_POSITION: &str = "arm_position";
    pub const PIN_NUMBER: &str = "pin_number";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const DAY: &str = "day";
    pub const QAQC_CODE: &str = "qaqc_code";
    pub const ARM_QAQC_CODE: &str = "arm_qaqc_code";

    /// Accepted pin height columns and their multiplier to millimetres
    pub const PIN_HEIGHT_CANDIDATES: &[(&str, f64)] = &[
        ("pin_height", 1.0),
        ("pin_height_mm", 1.0),
        ("pin_height_cm", 10.0),
    ];

    pub const UNIQUE_SET_ID: &str = "unique_set_id";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const NUMERICAL_ORDER: &str = "numerical_order";
    pub const USER_FRIENDLY_SET_NAME: &str = "user_friendly_set_name";
    pub const SET_TYPE: &str = "set_type";
    pub const DOMINANT_SPECIES: &str = "dominant_species";

    pub const SLR_RATE: &str = "slr_rate_mm_yr";
    pub const SLR_CI_95: &str = "ci_95_percent";
    pub const NEAREST_STATION: &str = "nearest_station";
    pub const STATION_NUMBER: &str = "station_number";
    pub const DATA_START: &str = "data_start";
    pub const DATA_END: &str = "data_end";
}

/// Cell values treated as missing
pub const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

/// Default glob patterns used to find input tables in a directory
pub const DEFAULT_DATA_PATTERN: &str = "*set_data*.csv";
pub const DEFAULT_METADATA_PATTERN: &str = "*metadata*.csv";
pub const DEFAULT_SLR_PATTERN: &str = "*slr*.csv";

// =============================================================================
// Output Artifacts
// =============================================================================

pub const RATES_FILE_STEM: &str = "set_rates";

/// Leading columns of the rates table, in order; read by mapping and document tooling
pub const CONTRACT_COLUMNS: [&str; 11] = [
    "reserve",
    "set_id",
    "rate",
    "CI_low",
    "CI_high",
    "slr_rate",
    "slr_CI_low",
    "slr_CI_high",
    "set_slr_ratio",
    "dir_0",
    "dir_slr",
];
pub const CUMULATIVE_CHANGE_FILE: &str = "cumulative_change.csv";
pub const EXCLUDED_FILE: &str = "excluded_measurements.csv";
pub const ELIGIBILITY_FILE: &str = "eligibility.csv";

/// Default output directory when none is given
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Trend direction labels as written to reports
pub mod trend_labels {
    pub const DEC_SIG: &str = "dec_sig";
    pub const INC_SIG: &str = "inc_sig";
    pub const DEC_NONSIG: &str = "dec_nonsig";
    pub const INC_NONSIG: &str = "inc_nonsig";
    pub const NONSIG: &str = "nonsig";
}
