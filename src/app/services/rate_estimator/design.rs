//! Model matrices for a single SET
//!
//! Turns one site's readings into the response vector, the fixed-effects
//! matrix `[1, elapsed_days]` and the nested random-effect terms
//! (pin within arm, then arm). The relative covariance factor for a vector of
//! covariance parameters `theta` is built here as well.

use super::backend::FitFailure;
use crate::app::models::Measurement;
use crate::constants::DAYS_PER_YEAR;
use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

pub const PIN_GROUP: &str = "pin_number:arm_position";
pub const ARM_GROUP: &str = "arm_position";
pub const INTERCEPT: &str = "(Intercept)";
pub const ELAPSED_DAYS: &str = "elapsed_days";
pub const ELAPSED_YEARS: &str = "elapsed_years";

/// One random-effect term: a grouping factor and the columns that vary by it
#[derive(Debug, Clone, PartialEq)]
pub struct RandomTerm {
    /// Grouping factor name
    pub group: String,
    /// Names of the random components, intercept first
    pub components: Vec<String>,
    /// Number of levels of the grouping factor
    pub n_levels: usize,
    /// Level index of each observation
    pub level_of: Vec<usize>,
    /// Component covariate values, `covariates[component][observation]`
    pub covariates: Vec<Vec<f64>>,
}

impl RandomTerm {
    /// Number of components per level
    pub fn dim(&self) -> usize {
        self.components.len()
    }

    /// Number of covariance parameters (lower triangle of the factor)
    pub fn n_theta(&self) -> usize {
        let d = self.dim();
        d * (d + 1) / 2
    }

    /// Number of random-effect columns contributed to Z
    pub fn n_columns(&self) -> usize {
        self.n_levels * self.dim()
    }

    /// Positions of the diagonal entries within this term's theta slice
    pub fn diagonal_positions(&self) -> Vec<usize> {
        let d = self.dim();
        let mut positions = Vec::with_capacity(d);
        let mut index = 0;
        for col in 0..d {
            positions.push(index);
            index += d - col;
        }
        positions
    }

    /// Lower-triangular factor from this term's theta slice, column-major
    pub fn lower_factor(&self, theta: &[f64]) -> DMatrix<f64> {
        let d = self.dim();
        let mut factor = DMatrix::<f64>::zeros(d, d);
        let mut index = 0;
        for col in 0..d {
            for row in col..d {
                factor[(row, col)] = theta[index];
                index += 1;
            }
        }
        factor
    }
}

/// Response, fixed effects and random-effect terms of a linear mixed model
#[derive(Debug, Clone, PartialEq)]
pub struct MixedModelProblem {
    pub response: DVector<f64>,
    pub fixed: DMatrix<f64>,
    pub fixed_names: Vec<String>,
    pub terms: Vec<RandomTerm>,
}

impl MixedModelProblem {
    pub fn n_obs(&self) -> usize {
        self.response.len()
    }

    pub fn n_fixed(&self) -> usize {
        self.fixed.ncols()
    }

    pub fn n_theta(&self) -> usize {
        self.terms.iter().map(RandomTerm::n_theta).sum()
    }

    pub fn n_random(&self) -> usize {
        self.terms.iter().map(RandomTerm::n_columns).sum()
    }

    /// Fixed effects + covariance parameters + residual variance
    pub fn n_parameters(&self) -> usize {
        self.n_fixed() + self.n_theta() + 1
    }

    /// Starting covariance parameters: identity factors
    pub fn initial_theta(&self) -> Vec<f64> {
        let mut theta = vec![0.0; self.n_theta()];
        let mut offset = 0;
        for term in &self.terms {
            for position in term.diagonal_positions() {
                theta[offset + position] = 1.0;
            }
            offset += term.n_theta();
        }
        theta
    }

    /// Indices of diagonal entries across the full theta vector
    pub fn diagonal_theta_indices(&self) -> Vec<usize> {
        let mut indices = Vec::new();
        let mut offset = 0;
        for term in &self.terms {
            indices.extend(term.diagonal_positions().into_iter().map(|p| offset + p));
            offset += term.n_theta();
        }
        indices
    }

    /// Flip factor columns with negative diagonals; the covariance is unchanged
    pub fn canonical_theta(&self, theta: &[f64]) -> Vec<f64> {
        let mut canonical = theta.to_vec();
        let mut offset = 0;
        for term in &self.terms {
            let d = term.dim();
            let mut index = offset;
            for col in 0..d {
                let len = d - col;
                if canonical[index] < 0.0 {
                    for value in &mut canonical[index..index + len] {
                        *value = -*value;
                    }
                }
                index += len;
            }
            offset += term.n_theta();
        }
        canonical
    }

    /// Random-effects design matrix Z (n x q)
    pub fn random_design(&self) -> DMatrix<f64> {
        let mut z = DMatrix::<f64>::zeros(self.n_obs(), self.n_random());
        let mut offset = 0;
        for term in &self.terms {
            let d = term.dim();
            for (obs, &level) in term.level_of.iter().enumerate() {
                for component in 0..d {
                    z[(obs, offset + level * d + component)] = term.covariates[component][obs];
                }
            }
            offset += term.n_columns();
        }
        z
    }

    /// Block-diagonal relative covariance factor Lambda (q x q)
    pub fn relative_factor(&self, theta: &[f64]) -> DMatrix<f64> {
        let q = self.n_random();
        let mut lambda = DMatrix::<f64>::zeros(q, q);
        let mut column_offset = 0;
        let mut theta_offset = 0;
        for term in &self.terms {
            let d = term.dim();
            let factor = term.lower_factor(&theta[theta_offset..theta_offset + term.n_theta()]);
            for level in 0..term.n_levels {
                let start = column_offset + level * d;
                lambda.view_mut((start, start), (d, d)).copy_from(&factor);
            }
            column_offset += term.n_columns();
            theta_offset += term.n_theta();
        }
        lambda
    }

    /// Same random structure with an intercept-only fixed part
    pub fn intercept_only(&self) -> Self {
        Self {
            response: self.response.clone(),
            fixed: DMatrix::from_element(self.n_obs(), 1, 1.0),
            fixed_names: vec![INTERCEPT.to_string()],
            terms: self.terms.clone(),
        }
    }
}

/// Model problem for one site plus the grouping counts behind it
#[derive(Debug, Clone)]
pub struct SiteDesign {
    pub problem: MixedModelProblem,
    /// Date from which elapsed days are counted
    pub epoch: NaiveDate,
    pub n_arms: usize,
    pub n_pins: usize,
    pub random_slopes: bool,
}

impl SiteDesign {
    /// Column index of the elapsed-time coefficient
    pub const SLOPE_INDEX: usize = 1;

    pub fn n_obs(&self) -> usize {
        self.problem.n_obs()
    }

    /// Denominator degrees of freedom for the elapsed-time coefficient
    ///
    /// Elapsed time varies within pins, so without random slopes it is
    /// estimated at the observation level: `n - pins - 1`. With a random
    /// slope per pin it is estimated at the pin level: `pins - arms - 1`.
    pub fn slope_degrees_of_freedom(&self) -> f64 {
        if self.random_slopes {
            self.n_pins as f64 - self.n_arms as f64 - 1.0
        } else {
            self.n_obs() as f64 - self.n_pins as f64 - 1.0
        }
    }
}

/// Build the nested-random-effects problem for one site's readings
///
/// Readings without a usable height are skipped. Elapsed time is counted in
/// days from the earliest usable reading.
pub fn build_site_design(
    measurements: &[Measurement],
    random_slopes: bool,
) -> std::result::Result<SiteDesign, FitFailure> {
    let usable: Vec<&Measurement> = measurements.iter().filter(|m| m.has_height()).collect();
    let epoch = usable
        .iter()
        .map(|m| m.date)
        .min()
        .ok_or(FitFailure::NoUsableReadings)?;

    let mut arms: BTreeMap<&str, usize> = BTreeMap::new();
    let mut pins: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for m in &usable {
        let next_arm = arms.len();
        arms.entry(m.arm_position.as_str()).or_insert(next_arm);
        let next_pin = pins.len();
        pins.entry((m.arm_position.as_str(), m.pin_number.as_str()))
            .or_insert(next_pin);
    }

    let n = usable.len();
    let mut response = DVector::<f64>::zeros(n);
    let mut fixed = DMatrix::<f64>::zeros(n, 2);
    let mut arm_level = Vec::with_capacity(n);
    let mut pin_level = Vec::with_capacity(n);
    let mut elapsed_years = Vec::with_capacity(n);

    for (i, m) in usable.iter().enumerate() {
        let days = (m.date - epoch).num_days() as f64;
        // has_height() guarantees a finite value
        response[i] = m.pin_height.unwrap_or_default();
        fixed[(i, 0)] = 1.0;
        fixed[(i, 1)] = days;
        arm_level.push(arms[m.arm_position.as_str()]);
        pin_level.push(pins[&(m.arm_position.as_str(), m.pin_number.as_str())]);
        elapsed_years.push(days / DAYS_PER_YEAR);
    }

    let mut pin_components = vec![INTERCEPT.to_string()];
    let mut pin_covariates = vec![vec![1.0; n]];
    if random_slopes {
        pin_components.push(ELAPSED_YEARS.to_string());
        pin_covariates.push(elapsed_years);
    }

    // Terms ordered by decreasing number of levels
    let terms = vec![
        RandomTerm {
            group: PIN_GROUP.to_string(),
            components: pin_components,
            n_levels: pins.len(),
            level_of: pin_level,
            covariates: pin_covariates,
        },
        RandomTerm {
            group: ARM_GROUP.to_string(),
            components: vec![INTERCEPT.to_string()],
            n_levels: arms.len(),
            level_of: arm_level,
            covariates: vec![vec![1.0; n]],
        },
    ];

    Ok(SiteDesign {
        problem: MixedModelProblem {
            response,
            fixed,
            fixed_names: vec![INTERCEPT.to_string(), ELAPSED_DAYS.to_string()],
            terms,
        },
        epoch,
        n_arms: arms.len(),
        n_pins: pins.len(),
        random_slopes,
    })
}
