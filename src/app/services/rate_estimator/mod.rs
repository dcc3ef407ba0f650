//! Mixed-effects rate estimation for SET sites
//!
//! Each eligible site is fit independently with a linear mixed model:
//!
//! ```text
//! pin_height ~ elapsed_days + (1 | arm_position / pin_number)
//! ```
//!
//! optionally with a random slope on elapsed time for each pin. The reported
//! coefficients come from the REML fit of this trend model. When model
//! comparison is enabled the trend model and an intercept-only model are
//! also fit by maximum likelihood and their AICc values are recorded; the
//! comparison never changes which coefficients are reported.
//!
//! The confidence interval on the elapsed-time slope is a Wald interval,
//! `slope +/- q * se`, with `q` from Student's t on the within-group
//! degrees of freedom (or the standard normal, if configured). The slope and
//! its bounds are converted from mm/day to mm/yr by multiplying by 365.25.
//!
//! # Architecture
//!
//! - [`design`] - response, fixed-effects and random-effects matrices for one site
//! - [`backend`] - the [`MixedModelBackend`] seam and the profiled-deviance solver
//! - [`optimizer`] - bounded Nelder-Mead minimiser
//! - [`distributions`] - t and normal quantiles

pub mod backend;
pub mod design;
pub mod distributions;
pub mod optimizer;

#[cfg(test)]
pub mod tests;

pub use backend::{Criterion, FitFailure, MixedModelBackend, MixedModelFit, ProfiledDevianceBackend};
pub use design::{MixedModelProblem, SiteDesign, build_site_design};

use crate::app::models::{FitDiagnostics, Measurement, PreferredModel, RateEstimate, SiteKey};
use crate::config::{CiMethod, ModelConfig};
use crate::constants::{DAYS_PER_YEAR, INITIAL_SIMPLEX_STEP};
use crate::{Error, Result};
use distributions::{normal_quantile, student_t_quantile};
use optimizer::NelderMeadOptions;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-site rate estimator
#[derive(Debug, Clone)]
pub struct RateEstimator {
    backend: Arc<dyn MixedModelBackend>,
    config: ModelConfig,
}

impl RateEstimator {
    /// Create an estimator using the profiled-deviance backend
    pub fn new(config: ModelConfig) -> Self {
        let options = NelderMeadOptions {
            max_evaluations: config.max_evaluations,
            tolerance: config.tolerance,
            initial_step: INITIAL_SIMPLEX_STEP,
        };
        Self {
            backend: Arc::new(ProfiledDevianceBackend::new(options)),
            config,
        }
    }

    /// Create an estimator with a custom backend
    pub fn with_backend(config: ModelConfig, backend: Arc<dyn MixedModelBackend>) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fit one site and return its rate in mm/yr
    ///
    /// Failures are returned as [`Error::ModelFit`] naming the site so the
    /// caller can record them without stopping other sites.
    pub fn estimate(&self, key: &SiteKey, measurements: &[Measurement]) -> Result<RateEstimate> {
        self.estimate_site(key, measurements)
            .map_err(|failure| Error::model_fit(key, failure.to_string()))
    }

    fn estimate_site(
        &self,
        key: &SiteKey,
        measurements: &[Measurement],
    ) -> std::result::Result<RateEstimate, FitFailure> {
        let design = build_site_design(measurements, self.config.random_slopes)?;
        debug!(
            "Fitting site {}: {} readings, {} arms, {} pins",
            key,
            design.n_obs(),
            design.n_arms,
            design.n_pins
        );

        let fit = self.backend.fit(&design.problem, Criterion::Reml)?;

        let slope = fit.coefficients[SiteDesign::SLOPE_INDEX];
        let std_error = fit.std_error(SiteDesign::SLOPE_INDEX);
        if !slope.is_finite() || !std_error.is_finite() {
            return Err(FitFailure::NonFiniteStandardError);
        }

        let (quantile, degrees_of_freedom) = self.interval_quantile(&design)?;
        let ci_low = slope - quantile * std_error;
        let ci_high = slope + quantile * std_error;

        let comparison = if self.config.compare_models {
            self.compare_fixed_effects(key, &design.problem)
        } else {
            None
        };

        if fit.singular {
            debug!("Site {} fit is singular (theta = {:?})", key, fit.theta);
        }

        Ok(RateEstimate {
            reserve: key.reserve.clone(),
            set_id: key.set_id.clone(),
            rate: slope * DAYS_PER_YEAR,
            ci_low: ci_low * DAYS_PER_YEAR,
            ci_high: ci_high * DAYS_PER_YEAR,
            diagnostics: FitDiagnostics {
                log_likelihood: fit.log_likelihood(),
                aic: fit.aic(),
                residual_variance: fit.residual_variance,
                variance_components: fit.variance_components.clone(),
                slope_per_day: slope,
                slope_std_error_per_day: std_error,
                degrees_of_freedom,
                ci_method: self.config.ci_method.as_str().to_string(),
                n_observations: design.n_obs(),
                n_arms: design.n_arms,
                n_pins: design.n_pins,
                evaluations: fit.evaluations,
                singular: fit.singular,
                aicc_trend: comparison.and_then(|c| c.0),
                aicc_intercept_only: comparison.and_then(|c| c.1),
                preferred_model: comparison.and_then(|c| c.2),
            },
        })
    }

    /// Two-sided quantile for the configured level and method
    fn interval_quantile(
        &self,
        design: &SiteDesign,
    ) -> std::result::Result<(f64, Option<f64>), FitFailure> {
        let upper = 1.0 - (1.0 - self.config.confidence_level) / 2.0;
        match self.config.ci_method {
            CiMethod::WaldNormal => Ok((normal_quantile(upper), None)),
            CiMethod::WaldT => {
                let df = design.slope_degrees_of_freedom();
                if df < 1.0 {
                    return Err(FitFailure::NoDegreesOfFreedom {
                        degrees_of_freedom: df,
                    });
                }
                Ok((student_t_quantile(upper, df), Some(df)))
            }
        }
    }

    /// ML AICc of the trend and intercept-only models, for diagnostics only
    fn compare_fixed_effects(
        &self,
        key: &SiteKey,
        problem: &MixedModelProblem,
    ) -> Option<(Option<f64>, Option<f64>, Option<PreferredModel>)> {
        let trend = self.backend.fit(problem, Criterion::Ml);
        let intercept_only = self.backend.fit(&problem.intercept_only(), Criterion::Ml);

        match (trend, intercept_only) {
            (Ok(trend), Ok(intercept_only)) => {
                let trend_aicc = trend.aicc();
                let null_aicc = intercept_only.aicc();
                let preferred = match (trend_aicc, null_aicc) {
                    (Some(t), Some(i)) if i < t => Some(PreferredModel::InterceptOnly),
                    (Some(_), Some(_)) => Some(PreferredModel::Trend),
                    _ => None,
                };
                if preferred == Some(PreferredModel::InterceptOnly) {
                    debug!(
                        "Site {}: intercept-only model has lower AICc; trend model still reported",
                        key
                    );
                }
                Some((trend_aicc, null_aicc, preferred))
            }
            (trend, intercept_only) => {
                warn!(
                    "Site {}: ML model comparison unavailable (trend: {}, intercept-only: {})",
                    key,
                    trend.err().map(|e| e.to_string()).unwrap_or_else(|| "ok".into()),
                    intercept_only
                        .err()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "ok".into())
                );
                None
            }
        }
    }
}
