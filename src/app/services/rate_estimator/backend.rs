//! Mixed-model fitting backend
//!
//! The estimator depends on [`MixedModelBackend`] only. The default
//! [`ProfiledDevianceBackend`] profiles the fixed effects and residual
//! variance out of the (restricted) likelihood by penalised least squares and
//! minimises the resulting deviance over the relative covariance parameters
//! with Nelder-Mead.
//!
//! For covariance parameters `theta` with relative factor `Lambda`, the
//! system
//!
//! ```text
//! [ Lambda'Z'Z Lambda + I   Lambda'Z'X ] [u]   [Lambda'Z'y]
//! [ X'Z Lambda              X'X        ] [b] = [X'y       ]
//! ```
//!
//! is Cholesky-factored once per evaluation. The first `q` diagonal entries
//! give `log|L|^2`, the last `p` give `log|R_X|^2`, and the penalised residual
//! sum of squares closes the deviance.

use super::design::MixedModelProblem;
use super::optimizer::{NelderMeadOptions, minimize};
use crate::app::models::VarianceComponent;
use crate::constants::SINGULAR_THETA_THRESHOLD;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use std::f64::consts::PI;
use tracing::debug;

/// Covariance parameters beyond this magnitude are treated as infeasible
const THETA_LIMIT: f64 = 1e4;

/// Penalised RSS floor relative to the total sum of squares
const PWRSS_RELATIVE_FLOOR: f64 = 1e-10;

/// Smallest acceptable ratio of Cholesky diagonals of X'X
const RANK_TOLERANCE: f64 = 1e-10;

/// Fitting criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Restricted maximum likelihood
    Reml,
    /// Maximum likelihood
    Ml,
}

/// Reasons a site's model could not be fit
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FitFailure {
    #[error("no readings with usable pin heights")]
    NoUsableReadings,

    #[error("{observations} observations cannot support {required} model columns")]
    TooFewObservations { observations: usize, required: usize },

    #[error("fixed-effects design is rank deficient (no variation in elapsed time)")]
    RankDeficient,

    #[error("deviance is not finite at the optimum")]
    NonFiniteDeviance,

    #[error("optimizer did not converge within {evaluations} evaluations")]
    NotConverged { evaluations: usize },

    #[error("standard error of the elapsed-time coefficient is not finite")]
    NonFiniteStandardError,

    #[error("{degrees_of_freedom} degrees of freedom cannot support a t interval")]
    NoDegreesOfFreedom { degrees_of_freedom: f64 },
}

/// Result of one mixed-model fit
#[derive(Debug, Clone)]
pub struct MixedModelFit {
    pub criterion: Criterion,
    /// Fixed-effect estimates, in the order of the problem's columns
    pub coefficients: DVector<f64>,
    /// Covariance matrix of the fixed-effect estimates
    pub covariance: DMatrix<f64>,
    pub residual_variance: f64,
    pub theta: Vec<f64>,
    /// Minimised deviance (-2 log-likelihood for the criterion)
    pub deviance: f64,
    pub variance_components: Vec<VarianceComponent>,
    pub n_obs: usize,
    pub n_parameters: usize,
    pub evaluations: usize,
    pub singular: bool,
}

impl MixedModelFit {
    pub fn log_likelihood(&self) -> f64 {
        -0.5 * self.deviance
    }

    pub fn aic(&self) -> f64 {
        self.deviance + 2.0 * self.n_parameters as f64
    }

    /// Small-sample corrected AIC; `None` when n <= k + 1
    pub fn aicc(&self) -> Option<f64> {
        let n = self.n_obs as f64;
        let k = self.n_parameters as f64;
        if n - k - 1.0 <= 0.0 {
            return None;
        }
        Some(self.aic() + 2.0 * k * (k + 1.0) / (n - k - 1.0))
    }

    pub fn std_error(&self, index: usize) -> f64 {
        self.covariance[(index, index)].sqrt()
    }
}

/// Pluggable mixed-model solver
pub trait MixedModelBackend: Send + Sync + std::fmt::Debug {
    fn fit(
        &self,
        problem: &MixedModelProblem,
        criterion: Criterion,
    ) -> std::result::Result<MixedModelFit, FitFailure>;
}

/// Profiled-deviance solver with Nelder-Mead over covariance parameters
#[derive(Debug, Clone, Default)]
pub struct ProfiledDevianceBackend {
    options: NelderMeadOptions,
}

impl ProfiledDevianceBackend {
    pub fn new(options: NelderMeadOptions) -> Self {
        Self { options }
    }
}

impl MixedModelBackend for ProfiledDevianceBackend {
    fn fit(
        &self,
        problem: &MixedModelProblem,
        criterion: Criterion,
    ) -> std::result::Result<MixedModelFit, FitFailure> {
        check_fixed_rank(&problem.fixed)?;
        check_dimensions(problem)?;

        let profile = ProfiledDeviance::new(problem, criterion);
        let result = minimize(
            |theta| profile.deviance(theta),
            &problem.initial_theta(),
            &self.options,
        );
        debug!(
            "{:?} optimisation: deviance {:.4} after {} evaluations (converged: {})",
            criterion, result.minimum, result.evaluations, result.converged
        );

        if !result.converged {
            return Err(FitFailure::NotConverged {
                evaluations: result.evaluations,
            });
        }
        if !result.minimum.is_finite() {
            return Err(FitFailure::NonFiniteDeviance);
        }

        let theta = problem.canonical_theta(&result.minimizer);
        let solution = profile.solve(&theta).ok_or(FitFailure::NonFiniteDeviance)?;
        let residual_variance = solution.pwrss / profile.residual_denominator();

        let q = problem.n_random();
        let p = problem.n_fixed();
        let inverse = solution
            .cholesky
            .inverse()
            .view((q, q), (p, p))
            .into_owned();
        let covariance = inverse * residual_variance;

        let singular = problem
            .diagonal_theta_indices()
            .iter()
            .any(|&i| theta[i].abs() < SINGULAR_THETA_THRESHOLD);

        Ok(MixedModelFit {
            criterion,
            coefficients: solution.beta,
            covariance,
            residual_variance,
            variance_components: variance_components(problem, &theta, residual_variance),
            theta,
            deviance: solution.deviance,
            n_obs: problem.n_obs(),
            n_parameters: problem.n_parameters(),
            evaluations: result.evaluations,
            singular,
        })
    }
}

fn check_dimensions(problem: &MixedModelProblem) -> std::result::Result<(), FitFailure> {
    let n = problem.n_obs();
    let p = problem.n_fixed();
    if n <= p {
        return Err(FitFailure::TooFewObservations {
            observations: n,
            required: p + 1,
        });
    }
    if let Some(term) = problem.terms.iter().find(|t| t.n_columns() >= n) {
        return Err(FitFailure::TooFewObservations {
            observations: n,
            required: term.n_columns() + 1,
        });
    }
    Ok(())
}

fn check_fixed_rank(fixed: &DMatrix<f64>) -> std::result::Result<(), FitFailure> {
    let gram = fixed.transpose() * fixed;
    let cholesky = gram.cholesky().ok_or(FitFailure::RankDeficient)?;
    let diagonal = cholesky.l_dirty().diagonal();
    let max = diagonal.max();
    let min = diagonal.min();
    if !(max > 0.0) || min / max < RANK_TOLERANCE {
        return Err(FitFailure::RankDeficient);
    }
    Ok(())
}

/// Random-effect variances per term component, scaled by sigma^2
fn variance_components(
    problem: &MixedModelProblem,
    theta: &[f64],
    residual_variance: f64,
) -> Vec<VarianceComponent> {
    let mut components = Vec::new();
    let mut offset = 0;
    for term in &problem.terms {
        let factor = term.lower_factor(&theta[offset..offset + term.n_theta()]);
        let relative = &factor * factor.transpose();
        for (index, name) in term.components.iter().enumerate() {
            components.push(VarianceComponent {
                group: term.group.clone(),
                term: name.clone(),
                variance: relative[(index, index)] * residual_variance,
            });
        }
        offset += term.n_theta();
    }
    components
}

/// Penalised least-squares solution at fixed covariance parameters
struct PlsSolution {
    beta: DVector<f64>,
    pwrss: f64,
    deviance: f64,
    cholesky: Cholesky<f64, Dyn>,
}

/// Deviance profiled over fixed effects and residual variance
struct ProfiledDeviance<'a> {
    problem: &'a MixedModelProblem,
    criterion: Criterion,
    z: DMatrix<f64>,
    xtx: DMatrix<f64>,
    xty: DVector<f64>,
    pwrss_floor: f64,
}

impl<'a> ProfiledDeviance<'a> {
    fn new(problem: &'a MixedModelProblem, criterion: Criterion) -> Self {
        let x = &problem.fixed;
        let y = &problem.response;
        let mean = y.mean();
        let total_ss: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();

        Self {
            problem,
            criterion,
            z: problem.random_design(),
            xtx: x.transpose() * x,
            xty: x.transpose() * y,
            pwrss_floor: PWRSS_RELATIVE_FLOOR * total_ss.max(1.0),
        }
    }

    fn residual_denominator(&self) -> f64 {
        match self.criterion {
            Criterion::Ml => self.problem.n_obs() as f64,
            Criterion::Reml => (self.problem.n_obs() - self.problem.n_fixed()) as f64,
        }
    }

    fn deviance(&self, theta: &[f64]) -> f64 {
        if theta.iter().any(|t| !t.is_finite() || t.abs() > THETA_LIMIT) {
            return f64::INFINITY;
        }
        self.solve(theta)
            .map(|s| s.deviance)
            .filter(|d| d.is_finite())
            .unwrap_or(f64::INFINITY)
    }

    fn solve(&self, theta: &[f64]) -> Option<PlsSolution> {
        let x = &self.problem.fixed;
        let y = &self.problem.response;
        let n = self.problem.n_obs();
        let q = self.problem.n_random();
        let p = self.problem.n_fixed();

        let lambda = self.problem.relative_factor(theta);
        let zl = &self.z * &lambda;
        let zlt = zl.transpose();

        let mut system = DMatrix::<f64>::zeros(q + p, q + p);
        let upper_left = &zlt * &zl + DMatrix::<f64>::identity(q, q);
        let upper_right = &zlt * x;
        system.view_mut((0, 0), (q, q)).copy_from(&upper_left);
        system.view_mut((0, q), (q, p)).copy_from(&upper_right);
        system
            .view_mut((q, 0), (p, q))
            .copy_from(&upper_right.transpose());
        system.view_mut((q, q), (p, p)).copy_from(&self.xtx);

        let mut rhs = DVector::<f64>::zeros(q + p);
        rhs.rows_mut(0, q).copy_from(&(&zlt * y));
        rhs.rows_mut(q, p).copy_from(&self.xty);

        let cholesky = system.cholesky()?;
        let (logdet_l, logdet_rx) = {
            let l = cholesky.l_dirty();
            let logdet_l: f64 = (0..q).map(|i| 2.0 * l[(i, i)].ln()).sum();
            let logdet_rx: f64 = (q..q + p).map(|i| 2.0 * l[(i, i)].ln()).sum();
            (logdet_l, logdet_rx)
        };

        let solution = cholesky.solve(&rhs);
        let u = solution.rows(0, q).into_owned();
        let beta = solution.rows(q, p).into_owned();

        let residual = y - x * &beta - &zl * &u;
        let pwrss = (residual.norm_squared() + u.norm_squared()).max(self.pwrss_floor);

        let deviance = match self.criterion {
            Criterion::Ml => {
                let n = n as f64;
                logdet_l + n * (1.0 + (2.0 * PI * pwrss / n).ln())
            }
            Criterion::Reml => {
                let dof = (n - p) as f64;
                logdet_l + logdet_rx + dof * (1.0 + (2.0 * PI * pwrss / dof).ln())
            }
        };

        Some(PlsSolution {
            beta,
            pwrss,
            deviance,
            cholesky,
        })
    }
}
