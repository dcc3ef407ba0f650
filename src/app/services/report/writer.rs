//! CSV and Parquet report writer
//!
//! Every table is built as a polars `DataFrame` and written with a header.
//! Dates are written as ISO `YYYY-MM-DD` strings.

use crate::app::models::{
    CumulativeChange, ExclusionRecord, FitDiagnostics, SiteEligibility, SiteSummary,
};
use crate::app::services::rate_estimator::design::{ARM_GROUP, ELAPSED_YEARS, INTERCEPT, PIN_GROUP};
use crate::config::OutputConfig;
use crate::constants::{
    CONTRACT_COLUMNS, CUMULATIVE_CHANGE_FILE, ELIGIBILITY_FILE, EXCLUDED_FILE, RATES_FILE_STEM,
};
use crate::{Error, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Writes the run's report tables into one output directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    directory: PathBuf,
    write_parquet: bool,
    overwrite: bool,
}

impl ReportWriter {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            write_parquet: config.write_parquet,
            overwrite: config.overwrite,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the output directory if needed
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.directory).map_err(|e| {
            Error::io(
                format!(
                    "Failed to create output directory '{}'",
                    self.directory.display()
                ),
                e,
            )
        })
    }

    /// Per-site rates table, plus Parquet when enabled
    pub fn write_rates(&self, summaries: &[SiteSummary]) -> Result<Vec<PathBuf>> {
        let mut df = rates_frame(summaries)?;
        let mut written = vec![self.write_csv(&format!("{}.csv", RATES_FILE_STEM), &mut df)?];
        if self.write_parquet {
            written.push(self.write_parquet_file(&format!("{}.parquet", RATES_FILE_STEM), &mut df)?);
        }
        Ok(written)
    }

    pub fn write_cumulative_change(&self, rows: &[CumulativeChange]) -> Result<PathBuf> {
        let mut df = cumulative_change_frame(rows)?;
        self.write_csv(CUMULATIVE_CHANGE_FILE, &mut df)
    }

    pub fn write_exclusions(&self, records: &[ExclusionRecord]) -> Result<PathBuf> {
        let mut df = exclusions_frame(records)?;
        self.write_csv(EXCLUDED_FILE, &mut df)
    }

    pub fn write_eligibility(&self, records: &[SiteEligibility]) -> Result<PathBuf> {
        let mut df = eligibility_frame(records)?;
        self.write_csv(ELIGIBILITY_FILE, &mut df)
    }

    fn create(&self, name: &str) -> Result<(PathBuf, File)> {
        let path = self.directory.join(name);
        if !self.overwrite && path.exists() {
            return Err(Error::io(
                format!("Refusing to overwrite '{}'", path.display()),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "output file exists"),
            ));
        }
        let file = File::create(&path)
            .map_err(|e| Error::io(format!("Failed to create '{}'", path.display()), e))?;
        Ok((path, file))
    }

    fn write_csv(&self, name: &str, df: &mut DataFrame) -> Result<PathBuf> {
        let (path, mut file) = self.create(name)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| Error::polars(path.display().to_string(), e))?;
        info!("Wrote {} rows to {}", df.height(), path.display());
        Ok(path)
    }

    fn write_parquet_file(&self, name: &str, df: &mut DataFrame) -> Result<PathBuf> {
        let (path, file) = self.create(name)?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(df)
            .map_err(|e| Error::polars(path.display().to_string(), e))?;
        info!("Wrote {} rows to {}", df.height(), path.display());
        Ok(path)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn variance_of(diagnostics: Option<&FitDiagnostics>, group: &str, term: &str) -> Option<f64> {
    diagnostics?
        .variance_components
        .iter()
        .find(|c| c.group == group && c.term == term)
        .map(|c| c.variance)
}

/// Rates table: contract columns first, then metadata and diagnostics
pub fn rates_frame(summaries: &[SiteSummary]) -> Result<DataFrame> {
    let diag: Vec<Option<&FitDiagnostics>> =
        summaries.iter().map(|s| s.diagnostics.as_ref()).collect();
    let text = |f: fn(&SiteSummary) -> Option<&str>| -> Vec<Option<String>> {
        summaries.iter().map(|s| f(s).map(str::to_string)).collect()
    };
    let float = |f: fn(&SiteSummary) -> Option<f64>| -> Vec<Option<f64>> {
        summaries.iter().map(f).collect()
    };
    let fit_stat = |f: fn(&FitDiagnostics) -> Option<f64>| -> Vec<Option<f64>> {
        diag.iter().map(|d| d.and_then(f)).collect()
    };
    let fit_count = |f: fn(&FitDiagnostics) -> usize| -> Vec<Option<u32>> {
        diag.iter().map(|d| d.map(|d| f(d) as u32)).collect()
    };
    let variance = |group: &str, term: &str| -> Vec<Option<f64>> {
        diag.iter().map(|d| variance_of(*d, group, term)).collect()
    };

    let [reserve, set_id, rate, ci_low, ci_high, slr_rate, slr_ci_low, slr_ci_high, ratio, dir_0, dir_slr] =
        CONTRACT_COLUMNS;

    let columns = vec![
        Column::new(reserve.into(), text(|s| Some(s.reserve.as_str()))),
        Column::new(set_id.into(), text(|s| Some(s.set_id.as_str()))),
        Column::new(rate.into(), float(|s| s.rate)),
        Column::new(ci_low.into(), float(|s| s.ci_low)),
        Column::new(ci_high.into(), float(|s| s.ci_high)),
        Column::new(slr_rate.into(), float(|s| s.slr_rate)),
        Column::new(slr_ci_low.into(), float(|s| s.slr_ci_low)),
        Column::new(slr_ci_high.into(), float(|s| s.slr_ci_high)),
        Column::new(ratio.into(), float(|s| s.set_slr_ratio)),
        Column::new(dir_0.into(), text(|s| s.dir_0.map(|d| d.as_str()))),
        Column::new(dir_slr.into(), text(|s| s.dir_slr.map(|d| d.as_str()))),
        Column::new(
            "user_friendly_set_name".into(),
            text(|s| s.user_friendly_set_name.as_deref()),
        ),
        Column::new("latitude".into(), float(|s| s.latitude)),
        Column::new("longitude".into(), float(|s| s.longitude)),
        Column::new(
            "numerical_order".into(),
            summaries.iter().map(|s| s.numerical_order).collect::<Vec<_>>(),
        ),
        Column::new("set_type".into(), text(|s| s.set_type.as_deref())),
        Column::new("dominant_species".into(), text(|s| s.dominant_species.as_deref())),
        Column::new(
            "first_sampled".into(),
            summaries
                .iter()
                .map(|s| format_date(s.first_sampled))
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "last_sampled".into(),
            summaries
                .iter()
                .map(|s| format_date(s.last_sampled))
                .collect::<Vec<_>>(),
        ),
        Column::new("years_sampled".into(), float(|s| Some(s.years_sampled))),
        Column::new(
            "sample_events".into(),
            summaries
                .iter()
                .map(|s| s.sample_events as u32)
                .collect::<Vec<_>>(),
        ),
        Column::new("fit_failure".into(), text(|s| s.fit_failure.as_deref())),
        Column::new("log_likelihood".into(), fit_stat(|d| Some(d.log_likelihood))),
        Column::new("aic".into(), fit_stat(|d| Some(d.aic))),
        Column::new("residual_variance".into(), fit_stat(|d| Some(d.residual_variance))),
        Column::new("pin_intercept_variance".into(), variance(PIN_GROUP, INTERCEPT)),
        Column::new("pin_slope_variance".into(), variance(PIN_GROUP, ELAPSED_YEARS)),
        Column::new("arm_intercept_variance".into(), variance(ARM_GROUP, INTERCEPT)),
        Column::new("n_observations".into(), fit_count(|d| d.n_observations)),
        Column::new("n_arms".into(), fit_count(|d| d.n_arms)),
        Column::new("n_pins".into(), fit_count(|d| d.n_pins)),
        Column::new("degrees_of_freedom".into(), fit_stat(|d| d.degrees_of_freedom)),
        Column::new(
            "ci_method".into(),
            diag.iter()
                .map(|d| d.map(|d| d.ci_method.clone()))
                .collect::<Vec<_>>(),
        ),
        Column::new("evaluations".into(), fit_count(|d| d.evaluations)),
        Column::new(
            "singular".into(),
            diag.iter().map(|d| d.map(|d| d.singular)).collect::<Vec<_>>(),
        ),
        Column::new("aicc_trend".into(), fit_stat(|d| d.aicc_trend)),
        Column::new("aicc_intercept_only".into(), fit_stat(|d| d.aicc_intercept_only)),
        Column::new(
            "preferred_model".into(),
            diag.iter()
                .map(|d| d.and_then(|d| d.preferred_model).map(|p| p.as_str()))
                .collect::<Vec<_>>(),
        ),
    ];

    debug!("Built rates table with {} rows", summaries.len());
    DataFrame::new(columns).map_err(|e| Error::polars("rates table", e))
}

pub fn cumulative_change_frame(rows: &[CumulativeChange]) -> Result<DataFrame> {
    df!(
        "reserve" => rows.iter().map(|r| r.reserve.clone()).collect::<Vec<_>>(),
        "set_id" => rows.iter().map(|r| r.set_id.clone()).collect::<Vec<_>>(),
        "date" => rows.iter().map(|r| format_date(r.date)).collect::<Vec<_>>(),
        "mean_change_mm" => rows.iter().map(|r| r.mean_change_mm).collect::<Vec<_>>(),
        "sd_mm" => rows.iter().map(|r| r.sd_mm).collect::<Vec<_>>(),
        "se_mm" => rows.iter().map(|r| r.se_mm).collect::<Vec<_>>(),
        "n_arms" => rows.iter().map(|r| r.n_arms as u32).collect::<Vec<_>>()
    )
    .map_err(|e| Error::polars("cumulative change table", e))
}

pub fn exclusions_frame(records: &[ExclusionRecord]) -> Result<DataFrame> {
    let column = |f: fn(&ExclusionRecord) -> String| records.iter().map(f).collect::<Vec<_>>();
    df!(
        "reserve" => column(|r| r.measurement.reserve.clone()),
        "set_id" => column(|r| r.measurement.set_id.clone()),
        "arm_position" => column(|r| r.measurement.arm_position.clone()),
        "pin_number" => column(|r| r.measurement.pin_number.clone()),
        "date" => column(|r| format_date(r.measurement.date)),
        "pin_height" => records.iter().map(|r| r.measurement.pin_height).collect::<Vec<_>>(),
        "qaqc_code" => records.iter().map(|r| r.measurement.qaqc_code.clone()).collect::<Vec<_>>(),
        "arm_qaqc_code" => records
            .iter()
            .map(|r| r.measurement.arm_qaqc_code.clone())
            .collect::<Vec<_>>(),
        "matched_code" => column(|r| r.matched_code.clone()),
        "code_source" => column(|r| r.source.as_str().to_string())
    )
    .map_err(|e| Error::polars("exclusion table", e))
}

pub fn eligibility_frame(records: &[SiteEligibility]) -> Result<DataFrame> {
    df!(
        "reserve" => records.iter().map(|r| r.reserve.clone()).collect::<Vec<_>>(),
        "set_id" => records.iter().map(|r| r.set_id.clone()).collect::<Vec<_>>(),
        "first_sampled" => records.iter().map(|r| format_date(r.first_sampled)).collect::<Vec<_>>(),
        "last_sampled" => records.iter().map(|r| format_date(r.last_sampled)).collect::<Vec<_>>(),
        "years_sampled" => records.iter().map(|r| r.years_sampled).collect::<Vec<_>>(),
        "sample_events" => records.iter().map(|r| r.sample_events as u32).collect::<Vec<_>>(),
        "eligible" => records.iter().map(|r| r.eligible).collect::<Vec<_>>()
    )
    .map_err(|e| Error::polars("eligibility table", e))
}
