//! Shared fixtures for rate estimator tests

use crate::app::models::Measurement;
use chrono::{Duration, NaiveDate};


/// Deterministic jitter in [-1, 1]
pub fn jitter(pin: usize, event: usize) -> f64 {
    ((pin * 31 + event * 17 + 5) % 13) as f64 / 6.0 - 1.0
}

/// Sampling dates spaced `spacing_days` apart from 2010-06-01
pub fn sampling_dates(events: usize, spacing_days: i64) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2010, 6, 1).unwrap();
    (0..events)
        .map(|i| start + Duration::days(i as i64 * spacing_days))
        .collect()
}

/// Parameters for a synthetic SET
pub struct SyntheticSite {
    pub reserve: &'static str,
    pub set_id: &'static str,
    pub arms: usize,
    pub pins_per_arm: usize,
    pub dates: Vec<NaiveDate>,
    /// True elevation change in mm/yr
    pub rate: f64,
    /// Amplitude of the per-reading jitter in mm
    pub noise: f64,
    /// Amplitude of per-arm and per-pin offsets in mm
    pub offsets: f64,
    /// Amplitude of per-pin departures from the site rate in mm/yr
    pub pin_rate_spread: f64,
}

impl Default for SyntheticSite {
    fn default() -> Self {
        Self {
            reserve: "GTM",
            set_id: "GTM-1",
            arms: 4,
            pins_per_arm: 9,
            dates: sampling_dates(8, 365),
            rate: 2.0,
            noise: 1.0,
            offsets: 5.0,
            pin_rate_spread: 0.0,
        }
    }
}

impl SyntheticSite {
    pub fn measurements(&self) -> Vec<Measurement> {
        let epoch = self.dates[0];
        let mut readings = Vec::new();
        for arm in 0..self.arms {
            let arm_offset = self.offsets * (arm as f64 - 1.5) / 2.0;
            for pin in 0..self.pins_per_arm {
                let pin_index = arm * self.pins_per_arm + pin;
                let pin_offset = self.offsets * jitter(pin_index, 7) / 2.0;
                let pin_rate = self.rate + self.pin_rate_spread * jitter(pin_index, 3);
                for (event, date) in self.dates.iter().enumerate() {
                    let years = (*date - epoch).num_days() as f64 / 365.25;
                    let height = 150.0
                        + arm_offset
                        + pin_offset
                        + pin_rate * years
                        + self.noise * jitter(pin_index, event);
                    readings.push(Measurement {
                        reserve: self.reserve.to_string(),
                        set_id: self.set_id.to_string(),
                        arm_position: (arm + 1).to_string(),
                        pin_number: (pin + 1).to_string(),
                        date: *date,
                        pin_height: Some(height),
                        qaqc_code: None,
                        arm_qaqc_code: None,
                    });
                }
            }
        }
        readings
    }
}

/// Two single-pin arms rising exactly 0.01 mm/day from the same height
pub fn perfectly_linear_site(events: usize) -> Vec<Measurement> {
    SyntheticSite {
        arms: 2,
        pins_per_arm: 1,
        dates: sampling_dates(events, 365),
        rate: 0.01 * 365.25,
        noise: 0.0,
        offsets: 0.0,
        ..SyntheticSite::default()
    }
    .measurements()
}
