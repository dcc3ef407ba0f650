//! Nelder-Mead simplex minimisation
//!
//! Derivative-free minimiser used for the covariance parameters. The
//! evaluation count is bounded; a run that hits the bound reports
//! `converged = false`. After a first convergence the search restarts once
//! from the best vertex with a fresh simplex to guard against premature
//! collapse.

use crate::constants::{DEFAULT_MAX_EVALUATIONS, DEFAULT_OPTIMIZER_TOLERANCE, INITIAL_SIMPLEX_STEP};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Simplex diameter below which the parameters are considered settled
const X_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq)]
pub struct NelderMeadOptions {
    pub max_evaluations: usize,
    /// Relative tolerance on the spread of function values over the simplex
    pub tolerance: f64,
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            tolerance: DEFAULT_OPTIMIZER_TOLERANCE,
            initial_step: INITIAL_SIMPLEX_STEP,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub minimizer: Vec<f64>,
    pub minimum: f64,
    pub evaluations: usize,
    pub converged: bool,
}

/// Minimise `f` from `start`, restarting once after convergence
pub fn minimize<F>(mut f: F, start: &[f64], options: &NelderMeadOptions) -> OptimizationResult
where
    F: FnMut(&[f64]) -> f64,
{
    let first = nelder_mead(&mut f, start, options);
    if !first.converged {
        return first;
    }

    let remaining = NelderMeadOptions {
        max_evaluations: options.max_evaluations.saturating_sub(first.evaluations),
        ..options.clone()
    };
    if remaining.max_evaluations == 0 {
        return first;
    }

    let second = nelder_mead(&mut f, &first.minimizer, &remaining);
    let evaluations = first.evaluations + second.evaluations;
    if second.minimum <= first.minimum {
        OptimizationResult {
            evaluations,
            ..second
        }
    } else {
        OptimizationResult {
            evaluations,
            ..first
        }
    }
}

/// Single Nelder-Mead run
pub fn nelder_mead<F>(f: &mut F, start: &[f64], options: &NelderMeadOptions) -> OptimizationResult
where
    F: FnMut(&[f64]) -> f64,
{
    let n = start.len();
    let mut evaluations = 0;
    let mut evaluate = |x: &[f64], evaluations: &mut usize| {
        *evaluations += 1;
        let value = f(x);
        if value.is_nan() { f64::INFINITY } else { value }
    };

    if n == 0 {
        let minimum = evaluate(start, &mut evaluations);
        return OptimizationResult {
            minimizer: Vec::new(),
            minimum,
            evaluations,
            converged: true,
        };
    }

    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    let value = evaluate(start, &mut evaluations);
    simplex.push((start.to_vec(), value));
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += options.initial_step;
        let value = evaluate(&vertex, &mut evaluations);
        simplex.push((vertex, value));
    }

    let mut converged = false;
    loop {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = simplex[0].1;
        let worst = simplex[n].1;
        if best.is_finite() && worst.is_finite() {
            let f_spread = worst - best;
            let x_spread = simplex[1..]
                .iter()
                .flat_map(|(x, _)| x.iter().zip(&simplex[0].0).map(|(a, b)| (a - b).abs()))
                .fold(0.0_f64, f64::max);
            if f_spread <= options.tolerance * (1.0 + best.abs()) && x_spread <= X_TOLERANCE {
                converged = true;
                break;
            }
        }
        if evaluations >= options.max_evaluations {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|(x, _)| x[j]).sum::<f64>() / n as f64)
            .collect();
        let worst_point = simplex[n].0.clone();
        let along = |scale: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&worst_point)
                .map(|(c, w)| c + scale * (c - w))
                .collect()
        };

        let reflected = along(REFLECTION);
        let f_reflected = evaluate(&reflected, &mut evaluations);

        if f_reflected < best {
            let expanded = along(REFLECTION * EXPANSION);
            let f_expanded = evaluate(&expanded, &mut evaluations);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }

        if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let (contracted, f_contracted, accept) = if f_reflected < worst {
            let point = along(REFLECTION * CONTRACTION);
            let value = evaluate(&point, &mut evaluations);
            let accept = value <= f_reflected;
            (point, value, accept)
        } else {
            let point = along(-CONTRACTION);
            let value = evaluate(&point, &mut evaluations);
            let accept = value < worst;
            (point, value, accept)
        };

        if accept {
            simplex[n] = (contracted, f_contracted);
            continue;
        }

        let best_point = simplex[0].0.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let shrunk: Vec<f64> = best_point
                .iter()
                .zip(&vertex.0)
                .map(|(b, x)| b + SHRINK * (x - b))
                .collect();
            let value = evaluate(&shrunk, &mut evaluations);
            *vertex = (shrunk, value);
        }
    }

    let (minimizer, minimum) = simplex.swap_remove(0);
    OptimizationResult {
        minimizer,
        minimum,
        evaluations,
        converged,
    }
}
