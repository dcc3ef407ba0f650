//! Report assembly and output
//!
//! Joins each eligible site's fit outcome with its metadata, eligibility
//! record and sea-level-rise reference into a [`SiteSummary`], then writes
//! the run's tables and prints the console summary.
//!
//! # Architecture
//!
//! - [`writer`] - CSV and Parquet artifacts via polars
//! - [`console`] - coloured end-of-run summary

pub mod console;
pub mod writer;

#[cfg(test)]
pub mod tests;

pub use writer::ReportWriter;

use crate::app::models::{FitOutcome, Site, SiteEligibility, SiteSummary, SlrReference};
use crate::app::services::trend_classifier::classify;

/// Build the output record for one eligible site
///
/// A failed fit keeps the site in the table with null rate and labels and
/// the failure reason recorded.
pub fn assemble_summary(
    site: &Site,
    eligibility: &SiteEligibility,
    outcome: &FitOutcome,
    slr: Option<&SlrReference>,
) -> SiteSummary {
    let metadata = site.metadata.as_ref();
    let estimate = outcome.estimate();
    let classification = estimate.map(|e| classify(e, slr));

    SiteSummary {
        reserve: site.reserve().to_string(),
        set_id: site.set_id().to_string(),
        rate: estimate.map(|e| e.rate),
        ci_low: estimate.map(|e| e.ci_low),
        ci_high: estimate.map(|e| e.ci_high),
        slr_rate: slr.map(|s| s.slr_rate),
        slr_ci_low: slr.map(SlrReference::ci_low),
        slr_ci_high: slr.map(SlrReference::ci_high),
        set_slr_ratio: classification.as_ref().and_then(|c| c.set_slr_ratio),
        dir_0: classification.as_ref().map(|c| c.dir_0),
        dir_slr: classification.as_ref().and_then(|c| c.dir_slr),

        user_friendly_set_name: metadata.and_then(|m| m.user_friendly_set_name.clone()),
        latitude: metadata.and_then(|m| m.latitude),
        longitude: metadata.and_then(|m| m.longitude),
        numerical_order: metadata.and_then(|m| m.numerical_order),
        set_type: metadata.and_then(|m| m.set_type.clone()),
        dominant_species: metadata.and_then(|m| m.dominant_species.clone()),
        first_sampled: eligibility.first_sampled,
        last_sampled: eligibility.last_sampled,
        years_sampled: eligibility.years_sampled,
        sample_events: eligibility.sample_events,
        fit_failure: match outcome {
            FitOutcome::Failed { reason } => Some(reason.clone()),
            FitOutcome::Fitted(_) => None,
        },
        diagnostics: estimate.map(|e| e.diagnostics.clone()),
    }
}

/// Order by reserve, then display order (unordered last), then SET id
pub fn sort_summaries(summaries: &mut [SiteSummary]) {
    summaries.sort_by(|a, b| {
        a.reserve
            .cmp(&b.reserve)
            .then_with(|| {
                a.numerical_order
                    .unwrap_or(i64::MAX)
                    .cmp(&b.numerical_order.unwrap_or(i64::MAX))
            })
            .then_with(|| a.set_id.cmp(&b.set_id))
    });
}
