//! Site eligibility filtering
//!
//! A site is analysed only when its sampling record spans at least
//! `min_years_sampled` years and contains at least `min_sample_events`
//! distinct sampling dates. Every row counts towards the record, including
//! rows whose height was nulled by QA/QC.

use crate::app::models::{Measurement, Site, SiteEligibility};
use crate::config::EligibilityConfig;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Summarise a site's sampling record; `None` when it has no readings
pub fn assess_site(
    reserve: &str,
    set_id: &str,
    measurements: &[Measurement],
    config: &EligibilityConfig,
) -> Option<SiteEligibility> {
    let dates: BTreeSet<_> = measurements.iter().map(|m| m.date).collect();
    let first_sampled = *dates.first()?;
    let last_sampled = *dates.last()?;

    let years_sampled = SiteEligibility::span_years(first_sampled, last_sampled);
    let sample_events = dates.len();
    let eligible =
        years_sampled >= config.min_years_sampled && sample_events >= config.min_sample_events;

    Some(SiteEligibility {
        reserve: reserve.to_string(),
        set_id: set_id.to_string(),
        first_sampled,
        last_sampled,
        years_sampled,
        sample_events,
        eligible,
    })
}

/// Split sites into the eligible working set and the full eligibility table
///
/// Ineligible sites are dropped from everything downstream. An empty
/// working set is a valid result.
pub fn filter_eligible(
    sites: Vec<Site>,
    config: &EligibilityConfig,
) -> (Vec<(Site, SiteEligibility)>, Vec<SiteEligibility>) {
    let mut working = Vec::new();
    let mut table = Vec::new();

    for site in sites {
        let Some(summary) = assess_site(site.reserve(), site.set_id(), &site.measurements, config)
        else {
            debug!("Site {} has no readings", site.key);
            continue;
        };

        table.push(summary.clone());
        if summary.eligible {
            working.push((site, summary));
        } else {
            debug!(
                "Site {} not eligible: {:.2} years, {} events",
                site.key, summary.years_sampled, summary.sample_events
            );
        }
    }

    info!(
        "Eligibility: {} of {} sites meet >= {} years and >= {} events",
        working.len(),
        table.len(),
        config.min_years_sampled,
        config.min_sample_events
    );

    (working, table)
}
