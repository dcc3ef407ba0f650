//! Shared fixtures for report tests

use crate::app::models::{
    FitDiagnostics, RateEstimate, Site, SiteEligibility, SiteKey, SiteMetadata, SlrReference,
    VarianceComponent,
};
use chrono::NaiveDate;


pub fn diagnostics() -> FitDiagnostics {
    FitDiagnostics {
        log_likelihood: -120.5,
        aic: 251.0,
        residual_variance: 1.2,
        variance_components: vec![
            VarianceComponent {
                group: "pin_number:arm_position".to_string(),
                term: "(Intercept)".to_string(),
                variance: 4.0,
            },
            VarianceComponent {
                group: "arm_position".to_string(),
                term: "(Intercept)".to_string(),
                variance: 2.5,
            },
        ],
        slope_per_day: 5.0 / 365.25,
        slope_std_error_per_day: 0.001,
        degrees_of_freedom: Some(251.0),
        ci_method: "wald_t".to_string(),
        n_observations: 288,
        n_arms: 4,
        n_pins: 36,
        evaluations: 140,
        singular: false,
        aicc_trend: Some(240.0),
        aicc_intercept_only: Some(300.0),
        preferred_model: None,
    }
}

pub fn estimate(set_id: &str, rate: f64, ci_low: f64, ci_high: f64) -> RateEstimate {
    RateEstimate {
        reserve: "X".to_string(),
        set_id: set_id.to_string(),
        rate,
        ci_low,
        ci_high,
        diagnostics: diagnostics(),
    }
}

pub fn site(set_id: &str, order: Option<i64>) -> Site {
    Site {
        key: SiteKey {
            reserve: "X".to_string(),
            set_id: set_id.to_string(),
        },
        measurements: Vec::new(),
        metadata: Some(SiteMetadata {
            unique_set_id: set_id.to_string(),
            reserve: "X".to_string(),
            latitude: Some(30.0),
            longitude: Some(-81.0),
            numerical_order: order,
            user_friendly_set_name: Some(format!("Marsh {}", set_id)),
            set_type: Some("RSET".to_string()),
            dominant_species: Some("Juncus roemerianus".to_string()),
        }),
    }
}

pub fn eligibility(set_id: &str) -> SiteEligibility {
    let first = NaiveDate::from_ymd_opt(2012, 5, 1).unwrap();
    let last = NaiveDate::from_ymd_opt(2019, 5, 1).unwrap();
    SiteEligibility {
        reserve: "X".to_string(),
        set_id: set_id.to_string(),
        first_sampled: first,
        last_sampled: last,
        years_sampled: SiteEligibility::span_years(first, last),
        sample_events: 8,
        eligible: true,
    }
}

pub fn slr() -> SlrReference {
    SlrReference {
        reserve: "X".to_string(),
        slr_rate: 3.0,
        ci_95: 0.5,
        nearest_station: Some("Mayport".to_string()),
        station_number: Some("8720218".to_string()),
        data_start: Some("1928".to_string()),
        data_end: Some("2023".to_string()),
    }
}
