//! QA/QC exclusion for SET pin readings
//!
//! Readings whose per-pin or per-arm QA/QC code is an exact member of the
//! configured exclusion set keep their row but lose their height. Each
//! excluded reading is captured, with its original height, in an exclusion
//! report before it is modified.
//!
//! Matching is exact string equality: a reading coded `"D1 SV"` is not
//! excluded by `"D1"`.

use crate::app::models::{CodeSource, ExclusionRecord, Measurement};
use crate::config::QaqcConfig;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::{debug, info};

/// Readings after exclusion plus the report of what was excluded
#[derive(Debug, Clone, Default)]
pub struct QaqcOutcome {
    pub measurements: Vec<Measurement>,
    pub excluded: Vec<ExclusionRecord>,
}

impl QaqcOutcome {
    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }
}

/// Null out heights of readings flagged with an excluded code
///
/// With no codes configured the input is returned untouched and no report
/// is produced.
pub fn apply_qaqc_exclusions(
    mut measurements: Vec<Measurement>,
    config: &QaqcConfig,
) -> QaqcOutcome {
    if config.is_empty() {
        debug!("No QA/QC codes configured for exclusion");
        return QaqcOutcome {
            measurements,
            excluded: Vec::new(),
        };
    }

    let excluded: Vec<ExclusionRecord> = measurements
        .iter()
        .filter_map(|m| {
            matching_code(m, &config.excluded_codes).map(|(code, source)| ExclusionRecord {
                measurement: m.clone(),
                matched_code: code.to_string(),
                source,
            })
        })
        .collect();

    if !excluded.is_empty() {
        info!("{}", exclusion_report(&excluded));
    }

    for measurement in measurements.iter_mut() {
        if matching_code(measurement, &config.excluded_codes).is_some() {
            measurement.pin_height = None;
        }
    }

    info!(
        "QA/QC exclusion complete: {} of {} readings nulled using codes [{}]",
        excluded.len(),
        measurements.len(),
        config
            .excluded_codes
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );

    QaqcOutcome {
        measurements,
        excluded,
    }
}

/// Return the excluded code carried by a reading, pin code first
pub fn matching_code<'a>(
    measurement: &'a Measurement,
    codes: &BTreeSet<String>,
) -> Option<(&'a str, CodeSource)> {
    if let Some(code) = measurement.qaqc_code.as_deref() {
        if codes.contains(code) {
            return Some((code, CodeSource::Pin));
        }
    }
    if let Some(code) = measurement.arm_qaqc_code.as_deref() {
        if codes.contains(code) {
            return Some((code, CodeSource::Arm));
        }
    }
    None
}

/// Human-readable listing of excluded readings grouped by site
pub fn exclusion_report(excluded: &[ExclusionRecord]) -> String {
    let mut report = format!("{} readings excluded by QA/QC code:", excluded.len());
    let mut current_site: Option<(&str, &str)> = None;

    for record in excluded {
        let m = &record.measurement;
        let site = (m.reserve.as_str(), m.set_id.as_str());
        if current_site != Some(site) {
            let _ = write!(report, "\n  {} / {}", site.0, site.1);
            current_site = Some(site);
        }
        let height = m
            .pin_height
            .map(|h| format!("{:.1} mm", h))
            .unwrap_or_else(|| "NA".to_string());
        let _ = write!(
            report,
            "\n    {} arm {} pin {}: {} ({} code {})",
            m.date,
            m.arm_position,
            m.pin_number,
            height,
            record.source.as_str(),
            record.matched_code
        );
    }

    report
}
