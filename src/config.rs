//! Configuration management and validation.
//!
//! Provides configuration structures for QA/QC exclusion, site eligibility
//! thresholds, mixed-model fitting, worker counts and input/output
//! locations. Configuration is read once at the start of a run and passed
//! explicitly into each component.

use crate::constants::{
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_DATA_PATTERN, DEFAULT_MAX_EVALUATIONS,
    DEFAULT_METADATA_PATTERN, DEFAULT_MIN_SAMPLE_EVENTS, DEFAULT_MIN_YEARS_SAMPLED,
    DEFAULT_OPTIMIZER_TOLERANCE, DEFAULT_OUTPUT_DIR, DEFAULT_SLR_PATTERN,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// QA/QC exclusion configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaqcConfig {
    /// Codes whose readings are nulled out (exact match against pin or arm code)
    pub excluded_codes: BTreeSet<String>,
}

impl QaqcConfig {
    /// True when no exclusion is configured
    pub fn is_empty(&self) -> bool {
        self.excluded_codes.is_empty()
    }
}

/// Site eligibility thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Minimum span between first and last sampling date, in years
    pub min_years_sampled: f64,

    /// Minimum number of distinct sampling dates
    pub min_sample_events: usize,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            min_years_sampled: DEFAULT_MIN_YEARS_SAMPLED,
            min_sample_events: DEFAULT_MIN_SAMPLE_EVENTS,
        }
    }
}

/// Confidence interval method for the elapsed-time coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiMethod {
    /// Wald interval with Student t quantile on within-group degrees of freedom
    WaldT,
    /// Wald interval with standard normal quantile
    WaldNormal,
}

impl CiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiMethod::WaldT => "wald_t",
            CiMethod::WaldNormal => "wald_normal",
        }
    }
}

/// Mixed-model fitting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Add a random slope on elapsed time at the pin-within-arm level
    pub random_slopes: bool,

    /// Confidence level for the fixed-effect interval
    pub confidence_level: f64,

    /// Interval method
    pub ci_method: CiMethod,

    /// Maximum deviance evaluations per optimisation
    pub max_evaluations: usize,

    /// Convergence tolerance on simplex deviance spread
    pub tolerance: f64,

    /// Also fit trend and intercept-only models by ML for AICc comparison
    pub compare_models: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            random_slopes: false,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            ci_method: CiMethod::WaldT,
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            tolerance: DEFAULT_OPTIMIZER_TOLERANCE,
            compare_models: true,
        }
    }
}

/// Worker configuration for per-site fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of sites fitted concurrently
    pub workers: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
        }
    }
}

/// Input table locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory searched with the patterns below when explicit paths are absent
    pub directory: Option<PathBuf>,

    /// Explicit measurement table path
    pub data_file: Option<PathBuf>,

    /// Explicit site metadata table path
    pub metadata_file: Option<PathBuf>,

    /// Explicit sea-level-rise reference table path
    pub slr_file: Option<PathBuf>,

    pub data_pattern: String,
    pub metadata_pattern: String,
    pub slr_pattern: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            data_file: None,
            metadata_file: None,
            slr_file: None,
            data_pattern: DEFAULT_DATA_PATTERN.to_string(),
            metadata_pattern: DEFAULT_METADATA_PATTERN.to_string(),
            slr_pattern: DEFAULT_SLR_PATTERN.to_string(),
        }
    }
}

/// Output artifact configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving all report files
    pub directory: PathBuf,

    /// Also write the rate summary as Parquet
    pub write_parquet: bool,

    /// Replace existing report files
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            write_parquet: false,
            overwrite: true,
        }
    }
}

/// Global configuration for a SET processing run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub qaqc: QaqcConfig,
    pub eligibility: EligibilityConfig,
    pub model: ModelConfig,
    pub performance: PerformanceConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file, filling gaps with defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::io(
                format!("Failed to read config file '{}'", path.display()),
                e,
            )
        })?;
        let config: Config = toml::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let level = self.model.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(Error::configuration(format!(
                "confidence_level must lie in (0, 1), got {}",
                level
            )));
        }
        if self.model.max_evaluations == 0 {
            return Err(Error::configuration("max_evaluations must be positive"));
        }
        if !(self.model.tolerance > 0.0) {
            return Err(Error::configuration("tolerance must be positive"));
        }
        if self.performance.workers == 0 {
            return Err(Error::configuration("workers must be at least 1"));
        }
        if !(self.eligibility.min_years_sampled >= 0.0) {
            return Err(Error::configuration(
                "min_years_sampled must be zero or positive",
            ));
        }
        if self.qaqc.excluded_codes.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::configuration("excluded QA/QC codes must not be blank"));
        }
        Ok(())
    }

    /// Add codes to the QA/QC exclusion set
    pub fn with_excluded_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.qaqc
            .excluded_codes
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// Set the number of concurrent fitting workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.performance.workers = workers;
        self
    }

    /// Set the output directory
    pub fn with_output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output.directory = directory.into();
        self
    }

    /// Enable random slopes at the pin-within-arm level
    pub fn with_random_slopes(mut self) -> Self {
        self.model.random_slopes = true;
        self
    }

    /// Select the confidence interval method
    pub fn with_ci_method(mut self, method: CiMethod) -> Self {
        self.model.ci_method = method;
        self
    }
}
