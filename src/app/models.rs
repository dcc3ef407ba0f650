//! Core data structures for SET rate processing.
//!
//! Defines pin measurements, site groupings and metadata, eligibility
//! summaries, rate estimates with fit diagnostics, sea-level-rise reference
//! records, trend classifications and the per-site summary record that forms
//! the output contract consumed by mapping and document tooling.

use crate::constants::{DAYS_PER_YEAR, trend_labels};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One pin reading from a Surface Elevation Table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Reserve the SET belongs to
    pub reserve: String,
    /// SET identifier
    pub set_id: String,
    /// Arm/direction position the pin was read from
    pub arm_position: String,
    /// Pin number along the arm
    pub pin_number: String,
    /// Sampling date
    pub date: NaiveDate,
    /// Pin height in millimetres; `None` when absent or excluded by QA/QC
    pub pin_height: Option<f64>,
    /// Per-pin QA/QC code
    pub qaqc_code: Option<String>,
    /// Per-arm QA/QC code
    pub arm_qaqc_code: Option<String>,
}

impl Measurement {
    /// Key identifying the site this reading belongs to
    pub fn site_key(&self) -> SiteKey {
        SiteKey {
            reserve: self.reserve.clone(),
            set_id: self.set_id.clone(),
        }
    }

    /// True when the reading carries a usable height
    pub fn has_height(&self) -> bool {
        self.pin_height.is_some_and(f64::is_finite)
    }
}

/// Reserve + SET identifier pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteKey {
    pub reserve: String,
    pub set_id: String,
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.reserve, self.set_id)
    }
}

/// Site metadata row keyed by unique SET identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMetadata {
    pub unique_set_id: String,
    pub reserve: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Display order within a reserve
    pub numerical_order: Option<i64>,
    pub user_friendly_set_name: Option<String>,
    pub set_type: Option<String>,
    pub dominant_species: Option<String>,
}

/// All readings sharing a SET identifier, joined with metadata
#[derive(Debug, Clone)]
pub struct Site {
    pub key: SiteKey,
    pub measurements: Vec<Measurement>,
    pub metadata: Option<SiteMetadata>,
}

impl Site {
    pub fn set_id(&self) -> &str {
        &self.key.set_id
    }

    pub fn reserve(&self) -> &str {
        &self.key.reserve
    }

    /// Latitude/longitude from metadata when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let meta = self.metadata.as_ref()?;
        Some((meta.latitude?, meta.longitude?))
    }

    /// Sort key used by reporting; sites without an order go last
    pub fn display_order(&self) -> i64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.numerical_order)
            .unwrap_or(i64::MAX)
    }

    /// Number of readings with a usable height
    pub fn usable_readings(&self) -> usize {
        self.measurements.iter().filter(|m| m.has_height()).count()
    }
}

/// Sampling-record summary used to decide whether a site is analysed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteEligibility {
    pub reserve: String,
    pub set_id: String,
    pub first_sampled: NaiveDate,
    pub last_sampled: NaiveDate,
    pub years_sampled: f64,
    pub sample_events: usize,
    pub eligible: bool,
}

impl SiteEligibility {
    /// Span in years using the average Gregorian year
    pub fn span_years(first: NaiveDate, last: NaiveDate) -> f64 {
        (last - first).num_days() as f64 / DAYS_PER_YEAR
    }
}

/// Source of the QA/QC code that excluded a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSource {
    Pin,
    Arm,
}

impl CodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeSource::Pin => "pin",
            CodeSource::Arm => "arm",
        }
    }
}

/// A reading nulled by QA/QC, captured before its height was removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRecord {
    pub measurement: Measurement,
    pub matched_code: String,
    pub source: CodeSource,
}

/// Which fixed-effects structure had the lower ML AICc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredModel {
    Trend,
    InterceptOnly,
}

impl PreferredModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferredModel::Trend => "trend",
            PreferredModel::InterceptOnly => "intercept_only",
        }
    }
}

/// Variance of one random-effect component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceComponent {
    pub group: String,
    pub term: String,
    pub variance: f64,
}

/// Fit statistics reported alongside a rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// REML log-likelihood of the trend model
    pub log_likelihood: f64,
    /// AIC of the REML trend fit
    pub aic: f64,
    /// Residual variance (mm^2)
    pub residual_variance: f64,
    pub variance_components: Vec<VarianceComponent>,
    /// Slope and standard error in mm/day
    pub slope_per_day: f64,
    pub slope_std_error_per_day: f64,
    /// Degrees of freedom behind the interval quantile; `None` for normal intervals
    pub degrees_of_freedom: Option<f64>,
    pub ci_method: String,
    pub n_observations: usize,
    pub n_arms: usize,
    pub n_pins: usize,
    pub evaluations: usize,
    pub singular: bool,
    /// ML AICc of the trend model, when compared
    pub aicc_trend: Option<f64>,
    /// ML AICc of the intercept-only model, when compared
    pub aicc_intercept_only: Option<f64>,
    pub preferred_model: Option<PreferredModel>,
}

/// Rate of elevation change for one eligible site, in mm/yr
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    pub reserve: String,
    pub set_id: String,
    pub rate: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub diagnostics: FitDiagnostics,
}

/// Published local sea-level-rise rate for a reserve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlrReference {
    pub reserve: String,
    /// Rate in mm/yr
    pub slr_rate: f64,
    /// 95% confidence interval half-width in mm/yr
    pub ci_95: f64,
    pub nearest_station: Option<String>,
    pub station_number: Option<String>,
    pub data_start: Option<String>,
    pub data_end: Option<String>,
}

impl SlrReference {
    pub fn ci_low(&self) -> f64 {
        self.slr_rate - self.ci_95
    }

    pub fn ci_high(&self) -> f64 {
        self.slr_rate + self.ci_95
    }
}

/// Direction and significance of a rate relative to a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    DecSig,
    IncSig,
    DecNonsig,
    IncNonsig,
    Nonsig,
}

impl TrendDirection {
    pub const ALL: [TrendDirection; 5] = [
        TrendDirection::DecSig,
        TrendDirection::IncSig,
        TrendDirection::DecNonsig,
        TrendDirection::IncNonsig,
        TrendDirection::Nonsig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::DecSig => trend_labels::DEC_SIG,
            TrendDirection::IncSig => trend_labels::INC_SIG,
            TrendDirection::DecNonsig => trend_labels::DEC_NONSIG,
            TrendDirection::IncNonsig => trend_labels::INC_NONSIG,
            TrendDirection::Nonsig => trend_labels::NONSIG,
        }
    }

    pub fn is_significant(&self) -> bool {
        matches!(self, TrendDirection::DecSig | TrendDirection::IncSig)
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trend labels derived from a rate estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendClassification {
    pub dir_0: TrendDirection,
    /// `None` when the reserve has no sea-level-rise reference
    pub dir_slr: Option<TrendDirection>,
    /// `None` without a reference or when the reference rate is zero
    pub set_slr_ratio: Option<f64>,
}

/// Outcome of fitting one eligible site
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Fitted(RateEstimate),
    Failed { reason: String },
}

impl FitOutcome {
    pub fn estimate(&self) -> Option<&RateEstimate> {
        match self {
            FitOutcome::Fitted(estimate) => Some(estimate),
            FitOutcome::Failed { .. } => None,
        }
    }
}

/// Per-site output record
///
/// The first eleven fields form the contract read by mapping and document
/// tooling; the remaining fields carry metadata and fit diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSummary {
    pub reserve: String,
    pub set_id: String,
    pub rate: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
    pub slr_rate: Option<f64>,
    pub slr_ci_low: Option<f64>,
    pub slr_ci_high: Option<f64>,
    pub set_slr_ratio: Option<f64>,
    pub dir_0: Option<TrendDirection>,
    pub dir_slr: Option<TrendDirection>,

    pub user_friendly_set_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub numerical_order: Option<i64>,
    pub set_type: Option<String>,
    pub dominant_species: Option<String>,
    pub first_sampled: NaiveDate,
    pub last_sampled: NaiveDate,
    pub years_sampled: f64,
    pub sample_events: usize,
    pub fit_failure: Option<String>,
    pub diagnostics: Option<FitDiagnostics>,
}

/// Mean change since first reading for one SET on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeChange {
    pub reserve: String,
    pub set_id: String,
    pub date: NaiveDate,
    pub mean_change_mm: f64,
    /// Standard deviation across arms; `None` with fewer than two arms
    pub sd_mm: Option<f64>,
    pub se_mm: Option<f64>,
    pub n_arms: usize,
}

/// Non-fatal condition surfaced at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunWarning {
    /// Several files matched a table pattern; the first alphabetically was used
    MultipleCandidates {
        table: String,
        chosen: String,
        candidates: Vec<String>,
    },
    /// Optional table not supplied
    MissingTable { table: String },
    /// Site identifiers differ between measurements and metadata
    SiteIdMismatch {
        in_data_only: Vec<String>,
        in_metadata_only: Vec<String>,
    },
    /// No sea-level-rise reference for a reserve
    MissingSlrReference { reserve: String },
    /// Duplicate reference rows for a reserve; the first was kept
    DuplicateSlrReference { reserve: String },
    /// No site met the eligibility thresholds
    NoEligibleSites,
    /// A site had no readings with usable heights
    NoUsableReadings { site: SiteKey },
    /// Mixed model could not be fit for a site
    ModelFitFailed { site: SiteKey, reason: String },
    /// Random-effect covariance estimated on the boundary
    SingularFit { site: SiteKey },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::MultipleCandidates {
                table,
                chosen,
                candidates,
            } => write!(
                f,
                "{} candidate files for the {} table; using {}",
                candidates.len(),
                table,
                chosen
            ),
            RunWarning::MissingTable { table } => {
                write!(f, "no {} table supplied", table)
            }
            RunWarning::SiteIdMismatch {
                in_data_only,
                in_metadata_only,
            } => write!(
                f,
                "site IDs differ between data and metadata (data only: [{}]; metadata only: [{}])",
                in_data_only.join(", "),
                in_metadata_only.join(", ")
            ),
            RunWarning::MissingSlrReference { reserve } => write!(
                f,
                "no sea-level-rise reference for reserve {}; SLR comparison skipped",
                reserve
            ),
            RunWarning::DuplicateSlrReference { reserve } => write!(
                f,
                "duplicate sea-level-rise rows for reserve {}; first row used",
                reserve
            ),
            RunWarning::NoEligibleSites => {
                write!(f, "no site met the eligibility thresholds")
            }
            RunWarning::NoUsableReadings { site } => {
                write!(f, "site {} has no usable pin heights", site)
            }
            RunWarning::ModelFitFailed { site, reason } => {
                write!(f, "model fit failed for site {}: {}", site, reason)
            }
            RunWarning::SingularFit { site } => write!(
                f,
                "singular random-effect covariance for site {}",
                site
            ),
        }
    }
}
