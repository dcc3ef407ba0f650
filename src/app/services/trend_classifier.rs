//! Trend classification against zero and against local sea-level rise
//!
//! Both comparisons use the same ordered rule set: a confidence interval
//! entirely below or above the reference is significant; otherwise only the
//! sign of the difference is reported. Significance is tested first.

use crate::app::models::{RateEstimate, SlrReference, TrendClassification, TrendDirection};

/// Interval around a rate, or around a reference value
#[derive(Debug, Clone, Copy)]
struct Bounds {
    value: f64,
    low: f64,
    high: f64,
}

fn direction(site: Bounds, reference: Bounds) -> TrendDirection {
    if site.high < reference.low {
        TrendDirection::DecSig
    } else if site.low > reference.high {
        TrendDirection::IncSig
    } else if site.value < reference.value {
        TrendDirection::DecNonsig
    } else if site.value > reference.value {
        TrendDirection::IncNonsig
    } else {
        TrendDirection::Nonsig
    }
}

/// Direction of the site's rate relative to zero
pub fn direction_vs_zero(estimate: &RateEstimate) -> TrendDirection {
    let zero = Bounds {
        value: 0.0,
        low: 0.0,
        high: 0.0,
    };
    direction(site_bounds(estimate), zero)
}

/// Direction of the site's rate relative to the reserve's sea-level rise
pub fn direction_vs_slr(estimate: &RateEstimate, slr: &SlrReference) -> TrendDirection {
    let reference = Bounds {
        value: slr.slr_rate,
        low: slr.ci_low(),
        high: slr.ci_high(),
    };
    direction(site_bounds(estimate), reference)
}

fn site_bounds(estimate: &RateEstimate) -> Bounds {
    Bounds {
        value: estimate.rate,
        low: estimate.ci_low,
        high: estimate.ci_high,
    }
}

/// Ratio of site rate to sea-level rise; `None` when the reference rate is zero
pub fn slr_ratio(estimate: &RateEstimate, slr: &SlrReference) -> Option<f64> {
    if slr.slr_rate == 0.0 || !slr.slr_rate.is_finite() {
        return None;
    }
    let ratio = estimate.rate / slr.slr_rate;
    ratio.is_finite().then_some(ratio)
}

/// Classify a site against zero and, when available, its reserve's SLR
pub fn classify(estimate: &RateEstimate, slr: Option<&SlrReference>) -> TrendClassification {
    TrendClassification {
        dir_0: direction_vs_zero(estimate),
        dir_slr: slr.map(|s| direction_vs_slr(estimate, s)),
        set_slr_ratio: slr.and_then(|s| slr_ratio(estimate, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::FitDiagnostics;

    fn estimate(rate: f64, ci_low: f64, ci_high: f64) -> RateEstimate {
        RateEstimate {
            reserve: "X".to_string(),
            set_id: "X-1".to_string(),
            rate,
            ci_low,
            ci_high,
            diagnostics: FitDiagnostics {
                log_likelihood: -10.0,
                aic: 30.0,
                residual_variance: 1.0,
                variance_components: Vec::new(),
                slope_per_day: rate / 365.25,
                slope_std_error_per_day: 0.001,
                degrees_of_freedom: Some(20.0),
                ci_method: "wald_t".to_string(),
                n_observations: 40,
                n_arms: 4,
                n_pins: 36,
                evaluations: 100,
                singular: false,
                aicc_trend: None,
                aicc_intercept_only: None,
                preferred_model: None,
            },
        }
    }

    fn slr(rate: f64, ci: f64) -> SlrReference {
        SlrReference {
            reserve: "X".to_string(),
            slr_rate: rate,
            ci_95: ci,
            nearest_station: None,
            station_number: None,
            data_start: None,
            data_end: None,
        }
    }

    #[test]
    fn test_direction_vs_zero() {
        assert_eq!(direction_vs_zero(&estimate(-2.0, -3.0, -1.0)), TrendDirection::DecSig);
        assert_eq!(direction_vs_zero(&estimate(2.0, 1.0, 3.0)), TrendDirection::IncSig);
        assert_eq!(direction_vs_zero(&estimate(-0.5, -1.0, 0.5)), TrendDirection::DecNonsig);
        assert_eq!(direction_vs_zero(&estimate(0.5, -0.5, 1.0)), TrendDirection::IncNonsig);
        assert_eq!(direction_vs_zero(&estimate(0.0, -1.0, 1.0)), TrendDirection::Nonsig);
    }

    #[test]
    fn test_interval_touching_zero_is_not_significant() {
        assert_eq!(direction_vs_zero(&estimate(1.0, 0.0, 2.0)), TrendDirection::IncNonsig);
        assert_eq!(direction_vs_zero(&estimate(-1.0, -2.0, 0.0)), TrendDirection::DecNonsig);
    }

    #[test]
    fn test_near_zero_rate_labelled_by_sign() {
        let flat = estimate(-6.9e-13, -3.0e-8, 3.0e-8);
        assert_eq!(direction_vs_zero(&flat), TrendDirection::DecNonsig);
    }

    #[test]
    fn test_site_above_sea_level_rise() {
        let classification = classify(&estimate(5.0, 4.0, 6.0), Some(&slr(3.0, 0.5)));

        assert_eq!(classification.dir_0, TrendDirection::IncSig);
        assert_eq!(classification.dir_slr, Some(TrendDirection::IncSig));
        let ratio = classification.set_slr_ratio.unwrap();
        assert!((ratio - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_direction_vs_slr_overlap() {
        let reference = slr(3.0, 0.5);
        let cases = [
            ((1.0, 0.5, 2.0), TrendDirection::DecSig),
            ((2.8, 2.0, 3.6), TrendDirection::DecNonsig),
            ((3.2, 2.4, 4.0), TrendDirection::IncNonsig),
            ((3.0, 2.0, 4.0), TrendDirection::Nonsig),
        ];
        for ((rate, low, high), expected) in cases {
            assert_eq!(
                direction_vs_slr(&estimate(rate, low, high), &reference),
                expected
            );
        }
    }

    #[test]
    fn test_missing_reference_still_classifies_zero() {
        let classification = classify(&estimate(-2.0, -3.0, -1.0), None);

        assert_eq!(classification.dir_0, TrendDirection::DecSig);
        assert_eq!(classification.dir_slr, None);
        assert_eq!(classification.set_slr_ratio, None);
    }

    #[test]
    fn test_zero_sea_level_rise_has_no_ratio() {
        let classification = classify(&estimate(2.0, 1.0, 3.0), Some(&slr(0.0, 0.5)));

        assert_eq!(classification.set_slr_ratio, None);
        assert_eq!(classification.dir_slr, Some(TrendDirection::IncSig));
    }

    #[test]
    fn test_exactly_one_label_for_every_interval() {
        let values = [-2.0, -0.5, 0.0, 0.5, 2.0];
        for &low in &values {
            for &high in values.iter().filter(|&&h| h >= low) {
                for rate in [low, (low + high) / 2.0, high] {
                    let label = direction_vs_zero(&estimate(rate, low, high));
                    let matches = TrendDirection::ALL.iter().filter(|&&d| d == label).count();
                    assert_eq!(matches, 1);
                    if label.is_significant() {
                        assert!(high < 0.0 || low > 0.0);
                    } else {
                        assert!(low <= 0.0 && high >= 0.0);
                    }
                }
            }
        }
    }
}
