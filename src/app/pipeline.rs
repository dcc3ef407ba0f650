//! End-to-end SET analysis run
//!
//! Inputs are read once, filtered, and every eligible site is fitted as an
//! independent blocking task. Results are gathered, joined with metadata and
//! sea-level-rise references, and sorted for reporting.

use crate::app::models::{
    CumulativeChange, ExclusionRecord, FitOutcome, Measurement, RunWarning, Site,
    SiteEligibility, SiteMetadata, SiteSummary, SlrReference,
};
use crate::app::services::cumulative_change::cumulative_change;
use crate::app::services::eligibility::filter_eligible;
use crate::app::services::qaqc_filter::apply_qaqc_exclusions;
use crate::app::services::rate_estimator::{FitFailure, RateEstimator};
use crate::app::services::report::{ReportWriter, assemble_summary, sort_summaries};
use crate::app::services::site_registry::SiteRegistry;
use crate::app::services::slr_reference::SlrRegistry;
use crate::app::services::table_loader::{load_measurements, load_metadata, load_slr_references};
use crate::config::Config;
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use tracing::{debug, info, warn};

/// Resolved input table locations
#[derive(Debug, Clone, PartialEq)]
pub struct InputPaths {
    pub data: PathBuf,
    pub metadata: Option<PathBuf>,
    pub slr: Option<PathBuf>,
}

/// Parsed input tables plus warnings raised while finding them
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub measurements: Vec<Measurement>,
    /// `None` when no metadata table was supplied
    pub metadata: Option<Vec<SiteMetadata>>,
    /// `None` when no sea-level-rise table was supplied
    pub slr_references: Option<Vec<SlrReference>>,
    pub warnings: Vec<RunWarning>,
}

impl RunInputs {
    /// Read every table named in `paths`
    pub fn load(paths: &InputPaths) -> Result<Self> {
        let mut warnings = Vec::new();
        let measurements = load_measurements(&paths.data)?;

        let metadata = match &paths.metadata {
            Some(path) => Some(load_metadata(path)?),
            None => {
                warnings.push(RunWarning::MissingTable {
                    table: "metadata".to_string(),
                });
                None
            }
        };
        let slr_references = match &paths.slr {
            Some(path) => Some(load_slr_references(path)?),
            None => {
                warnings.push(RunWarning::MissingTable {
                    table: "SLR".to_string(),
                });
                None
            }
        };

        Ok(Self {
            measurements,
            metadata,
            slr_references,
            warnings,
        })
    }
}

/// Sites after QA/QC and eligibility filtering, before any fit
#[derive(Debug, Clone, Default)]
pub struct PreparedRun {
    pub eligible: Vec<(Site, SiteEligibility)>,
    /// Eligibility of every site, eligible or not
    pub eligibility: Vec<SiteEligibility>,
    pub exclusions: Vec<ExclusionRecord>,
    pub cumulative_change: Vec<CumulativeChange>,
    pub slr: SlrRegistry,
    pub warnings: Vec<RunWarning>,
    pub n_measurements: usize,
    pub n_sites: usize,
}

/// Everything a run produces
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub summaries: Vec<SiteSummary>,
    pub eligibility: Vec<SiteEligibility>,
    pub cumulative_change: Vec<CumulativeChange>,
    pub exclusions: Vec<ExclusionRecord>,
    pub warnings: Vec<RunWarning>,
    pub n_measurements: usize,
    pub n_sites: usize,
    pub elapsed: Duration,
}

impl RunOutput {
    pub fn n_eligible(&self) -> usize {
        self.summaries.len()
    }

    pub fn n_ineligible(&self) -> usize {
        self.n_sites - self.n_eligible()
    }

    pub fn failed(&self) -> impl Iterator<Item = &SiteSummary> {
        self.summaries.iter().filter(|s| s.fit_failure.is_some())
    }

    pub fn n_fitted(&self) -> usize {
        self.summaries.iter().filter(|s| s.rate.is_some()).count()
    }
}

/// QA/QC, site grouping, cumulative change and eligibility
///
/// No readings, or no sites, is a fatal input error. Zero eligible sites is
/// a warning and leaves an empty working set.
pub fn prepare_run(inputs: RunInputs, config: &Config) -> Result<PreparedRun> {
    let mut warnings = inputs.warnings;
    if inputs.measurements.is_empty() {
        return Err(Error::input_shape("measurement table has no rows"));
    }
    let n_measurements = inputs.measurements.len();

    let qaqc = apply_qaqc_exclusions(inputs.measurements, &config.qaqc);
    let registry = SiteRegistry::build(qaqc.measurements, inputs.metadata);
    if registry.is_empty() {
        return Err(Error::input_shape("no sites found in measurement table"));
    }
    warnings.extend(registry.warnings.iter().cloned());
    let n_sites = registry.len();

    let cumulative_change = cumulative_change(&registry.sites);
    let (eligible, eligibility) = filter_eligible(registry.sites, &config.eligibility);
    if eligible.is_empty() {
        warn!("No site met the eligibility thresholds; nothing to fit");
        warnings.push(RunWarning::NoEligibleSites);
    }

    let slr = match inputs.slr_references {
        Some(references) => {
            let registry = SlrRegistry::new(references);
            warnings.extend(registry.warnings(eligible.iter().map(|(site, _)| site.reserve())));
            registry
        }
        None => SlrRegistry::default(),
    };

    Ok(PreparedRun {
        eligible,
        eligibility,
        exclusions: qaqc.excluded,
        cumulative_change,
        slr,
        warnings,
        n_measurements,
        n_sites,
    })
}

/// Full analysis: prepare, fit every eligible site concurrently, assemble
pub async fn run_analysis(
    inputs: RunInputs,
    config: &Config,
    show_progress: bool,
) -> Result<RunOutput> {
    let start = Instant::now();
    let prepared = prepare_run(inputs, config)?;
    info!(
        "Fitting {} eligible sites with {} workers",
        prepared.eligible.len(),
        config.performance.workers
    );

    let estimator = Arc::new(RateEstimator::new(config.model.clone()));
    let progress = create_progress_bar(prepared.eligible.len() as u64, show_progress);
    let fitted = fit_sites(
        prepared.eligible,
        estimator,
        config.performance.workers,
        progress.clone(),
    )
    .await;
    progress.finish_and_clear();

    let mut warnings = prepared.warnings;
    let mut summaries = Vec::with_capacity(fitted.len());
    for (site, eligibility, outcome) in fitted {
        match &outcome {
            FitOutcome::Failed { reason } if site.usable_readings() == 0 => {
                debug!("Site {} skipped: {}", site.key, reason);
                warnings.push(RunWarning::NoUsableReadings {
                    site: site.key.clone(),
                });
            }
            FitOutcome::Failed { reason } => {
                warn!("Model fit failed for site {}: {}", site.key, reason);
                warnings.push(RunWarning::ModelFitFailed {
                    site: site.key.clone(),
                    reason: reason.clone(),
                });
            }
            FitOutcome::Fitted(estimate) if estimate.diagnostics.singular => {
                warnings.push(RunWarning::SingularFit {
                    site: site.key.clone(),
                });
            }
            FitOutcome::Fitted(_) => {}
        }
        let slr = prepared.slr.lookup(site.reserve());
        summaries.push(assemble_summary(&site, &eligibility, &outcome, slr));
    }
    sort_summaries(&mut summaries);

    let elapsed = start.elapsed();
    info!(
        "Analysis complete in {:.2?}: {} sites, {} eligible, {} fitted",
        elapsed,
        prepared.n_sites,
        summaries.len(),
        summaries.iter().filter(|s| s.rate.is_some()).count()
    );

    Ok(RunOutput {
        summaries,
        eligibility: prepared.eligibility,
        cumulative_change: prepared.cumulative_change,
        exclusions: prepared.exclusions,
        warnings,
        n_measurements: prepared.n_measurements,
        n_sites: prepared.n_sites,
        elapsed,
    })
}

/// Fit each site on the blocking pool, at most `workers` at a time
///
/// A panicking or cancelled task fails only its own site.
async fn fit_sites(
    sites: Vec<(Site, SiteEligibility)>,
    estimator: Arc<RateEstimator>,
    workers: usize,
    progress: ProgressBar,
) -> Vec<(Site, SiteEligibility, FitOutcome)> {
    stream::iter(sites.into_iter().map(|(site, eligibility)| {
        let estimator = Arc::clone(&estimator);
        let progress = progress.clone();
        async move {
            let site = Arc::new(site);
            let outcome = if site.usable_readings() == 0 {
                FitOutcome::Failed {
                    reason: FitFailure::NoUsableReadings.to_string(),
                }
            } else {
                let worker_site = Arc::clone(&site);
                let handle = task::spawn_blocking(move || {
                    estimator.estimate(&worker_site.key, &worker_site.measurements)
                });
                match handle.await {
                    Ok(Ok(estimate)) => FitOutcome::Fitted(estimate),
                    Ok(Err(Error::ModelFit { reason, .. })) => FitOutcome::Failed { reason },
                    Ok(Err(other)) => FitOutcome::Failed {
                        reason: other.to_string(),
                    },
                    Err(join_error) => FitOutcome::Failed {
                        reason: Error::worker(join_error.to_string()).to_string(),
                    },
                }
            };
            progress.inc(1);
            progress.set_message(site.set_id().to_string());
            let site = Arc::try_unwrap(site).unwrap_or_else(|shared| (*shared).clone());
            (site, eligibility, outcome)
        }
    }))
    .buffer_unordered(workers.max(1))
    .collect()
    .await
}

fn create_progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Fitting sites");
    pb
}

/// Write every report table for a finished run
pub fn write_reports(output: &RunOutput, writer: &ReportWriter) -> Result<Vec<PathBuf>> {
    writer.prepare()?;
    let mut written = writer.write_rates(&output.summaries)?;
    written.push(writer.write_cumulative_change(&output.cumulative_change)?);
    written.push(writer.write_exclusions(&output.exclusions)?);
    written.push(writer.write_eligibility(&output.eligibility)?);
    Ok(written)
}
