//! Cumulative elevation change since each pin's first reading
//!
//! Pin changes are averaged per arm on each date, then arm means are
//! averaged per date with their spread across arms.

use crate::app::models::{CumulativeChange, Measurement, Site};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Cumulative change series for one site, ordered by date
pub fn site_cumulative_change(site: &Site) -> Vec<CumulativeChange> {
    let baselines = pin_baselines(&site.measurements);

    // date -> arm -> pin changes
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();
    for m in site.measurements.iter().filter(|m| m.has_height()) {
        let key = (m.arm_position.as_str(), m.pin_number.as_str());
        let (Some(height), Some(baseline)) = (m.pin_height, baselines.get(&key)) else {
            continue;
        };
        by_date
            .entry(m.date)
            .or_default()
            .entry(m.arm_position.as_str())
            .or_default()
            .push(height - baseline);
    }

    by_date
        .into_iter()
        .map(|(date, arms)| {
            let arm_means: Vec<f64> = arms.values().map(|changes| mean(changes)).collect();
            let (sd_mm, se_mm) = spread(&arm_means);
            CumulativeChange {
                reserve: site.reserve().to_string(),
                set_id: site.set_id().to_string(),
                date,
                mean_change_mm: mean(&arm_means),
                sd_mm,
                se_mm,
                n_arms: arm_means.len(),
            }
        })
        .collect()
}

/// Cumulative change for every site, in site order
pub fn cumulative_change(sites: &[Site]) -> Vec<CumulativeChange> {
    sites.iter().flat_map(site_cumulative_change).collect()
}

/// Earliest usable height for each (arm, pin)
fn pin_baselines(measurements: &[Measurement]) -> BTreeMap<(&str, &str), f64> {
    let mut first: BTreeMap<(&str, &str), (NaiveDate, f64)> = BTreeMap::new();
    for m in measurements {
        let Some(height) = m.pin_height.filter(|h| h.is_finite()) else {
            continue;
        };
        let key = (m.arm_position.as_str(), m.pin_number.as_str());
        first
            .entry(key)
            .and_modify(|entry| {
                if m.date < entry.0 {
                    *entry = (m.date, height);
                }
            })
            .or_insert((m.date, height));
    }
    first.into_iter().map(|(key, (_, h))| (key, h)).collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation and standard error; `None` below two values
fn spread(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.len() < 2 {
        return (None, None);
    }
    let n = values.len() as f64;
    let m = mean(values);
    let sd = (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    (Some(sd), Some(sd / n.sqrt()))
}
