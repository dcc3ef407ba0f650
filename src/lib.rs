//! SET Processor Library
//!
//! A Rust library for estimating long-term rates of wetland surface-elevation
//! change from repeated Surface Elevation Table (SET) pin readings.
//!
//! This library provides tools for:
//! - Loading SET measurement, site metadata and sea-level-rise reference tables
//! - Excluding pin readings flagged with QA/QC codes
//! - Selecting sites with a long enough sampling record
//! - Fitting a per-site linear mixed model with nested arm/pin random effects
//! - Classifying each site's trend against zero and against local sea-level rise
//! - Writing the per-site summary, cumulative change and exclusion reports

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod pipeline;
    pub mod services {
        pub mod cumulative_change;
        pub mod eligibility;
        pub mod qaqc_filter;
        pub mod rate_estimator;
        pub mod report;
        pub mod site_registry;
        pub mod slr_reference;
        pub mod table_loader;
        pub mod trend_classifier;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
    pub mod input;
}

// Re-export commonly used types
pub use app::models::{
    Measurement, RateEstimate, SiteKey, SiteSummary, SlrReference, TrendClassification,
    TrendDirection,
};
pub use config::Config;

/// Result type alias for the SET processor
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for SET processing operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Polars table reading or writing failed
    #[error("Table error in '{context}': {source}")]
    Polars {
        context: String,
        #[source]
        source: polars::error::PolarsError,
    },

    /// Required input is missing or has the wrong shape
    #[error("Input error: {message}")]
    InputShape { message: String },

    /// Required column missing from an input table
    #[error("Column '{column}' missing from {table} table")]
    MissingColumn { table: String, column: String },

    /// A cell could not be parsed into the expected type
    #[error("Value parsing error in {table} table, row {row}, column '{column}': {message}")]
    ValueParsing {
        table: String,
        row: usize,
        column: String,
        message: String,
    },

    /// Invalid calendar date in the measurement table
    #[error("Invalid date {year}-{month}-{day} in row {row}")]
    InvalidDate {
        row: usize,
        year: i32,
        month: u32,
        day: u32,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Mixed model could not be fit for a site
    #[error("Model fit failed for site {reserve}/{set_id}: {reason}")]
    ModelFit {
        reserve: String,
        set_id: String,
        reason: String,
    },

    /// Worker task panicked or was cancelled
    #[error("Worker task failed: {message}")]
    Worker { message: String },

    /// Run stopped before completion
    #[error("Processing interrupted: {message}")]
    Interrupted { message: String },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a polars error with the table or file it concerns
    pub fn polars(context: impl Into<String>, source: polars::error::PolarsError) -> Self {
        Self::Polars {
            context: context.into(),
            source,
        }
    }

    /// Create an input shape error
    pub fn input_shape(message: impl Into<String>) -> Self {
        Self::InputShape {
            message: message.into(),
        }
    }

    /// Create a missing column error
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a value parsing error
    pub fn value_parsing(
        table: impl Into<String>,
        row: usize,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ValueParsing {
            table: table.into(),
            row,
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a model fit error
    pub fn model_fit(site: &SiteKey, reason: impl Into<String>) -> Self {
        Self::ModelFit {
            reserve: site.reserve.clone(),
            set_id: site.set_id.clone(),
            reason: reason.into(),
        }
    }

    /// Create a worker error
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Create an interruption error
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted {
            message: message.into(),
        }
    }

    /// True for errors that abort the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ModelFit { .. })
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

impl From<polars::error::PolarsError> for Error {
    fn from(error: polars::error::PolarsError) -> Self {
        Self::Polars {
            context: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration {
            message: format!("Invalid configuration file: {}", error),
        }
    }
}

impl From<glob::PatternError> for Error {
    fn from(error: glob::PatternError) -> Self {
        Self::Configuration {
            message: format!("Invalid file pattern: {}", error),
        }
    }
}
