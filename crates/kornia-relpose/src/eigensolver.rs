//! Rotation estimation by minimizing the smallest eigenvalue of the epipolar normal
//! scatter matrix (Kneip and Lynen).
//!
//! For the true rotation all normals `n_i = b1_i x (R b2_i)` lie in the plane
//! orthogonal to the translation, so `M(R) = sum n_i n_i^T` is rank-deficient and its
//! smallest eigenvalue vanishes. Starting from a prior, the rotation is updated as
//! `R exp([w]x)` with damped Newton steps on numerically differentiated
//! derivatives of that eigenvalue.

use crate::bearing::Correspondences;
use crate::ops::{check_rotation, orient_translation, rotate_right};
use crate::types::RelPoseError;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

/// Minimal number of correspondences.
pub const SAMPLE_SIZE: usize = 2;

/// Parameters controlling the eigensolver iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigensolverParams {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Initial damping factor (lambda), relative to the Hessian diagonal.
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_factor: f64,
    /// Lower bound lambda is clamped to after accepted steps.
    pub lambda_min: f64,
    /// Finite-difference step in radians.
    pub derivative_step: f64,
    /// Stop once the smallest eigenvalue drops below this fraction of `trace(M)` at the prior.
    pub cost_tolerance: f64,
    /// Stop once an accepted step decreases the cost by less than this fraction.
    pub relative_decrease: f64,
    /// Stop once the gradient norm drops below this value.
    pub gradient_tolerance: f64,
    /// Stop once the rotation step drops below this value (radians).
    pub step_tolerance: f64,
}

impl Default for EigensolverParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            lambda_init: 1e-3,
            lambda_factor: 10.0,
            lambda_min: 1e-12,
            derivative_step: 1e-4,
            cost_tolerance: 1e-14,
            relative_decrease: 1e-10,
            gradient_tolerance: 1e-12,
            step_tolerance: 1e-12,
        }
    }
}

impl EigensolverParams {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the cost tolerance.
    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    /// Set the damping floor.
    pub fn with_lambda_min(mut self, lambda_min: f64) -> Self {
        self.lambda_min = lambda_min;
        self
    }
}

/// Result of [`rotation_eigensolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct EigensolverOutput {
    /// Estimated rotation.
    pub rotation: Matrix3<f64>,
    /// Unit translation direction (eigenvector of the smallest eigenvalue), signed by cheirality.
    pub translation: Vector3<f64>,
    /// Eigenvalues of `M(R)` in increasing order.
    pub eigenvalues: Vector3<f64>,
    /// Number of iterations run.
    pub iterations: usize,
}

/// Refine a rotation prior against two or more correspondences.
pub fn rotation_eigensolver(
    corr: &Correspondences,
    prior: &Matrix3<f64>,
    params: &EigensolverParams,
) -> Result<EigensolverOutput, RelPoseError> {
    corr.require(SAMPLE_SIZE)?;
    check_rotation(prior, corr.tol())?;

    let minimum = minimize(corr, prior, params);
    log::debug!(
        "eigensolver: {} iterations, smallest eigenvalue {:e}",
        minimum.iterations,
        minimum.cost
    );
    if !minimum.converged {
        return Err(RelPoseError::ConvergenceFailure {
            iterations: minimum.iterations,
            cost: minimum.cost,
        });
    }

    let (eigenvalues, eigenvectors) = sorted_eigen(&scatter(corr, &minimum.rotation));
    let t: Vector3<f64> = eigenvectors.column(0).normalize();
    Ok(EigensolverOutput {
        rotation: minimum.rotation,
        translation: orient_translation(&minimum.rotation, &t, corr),
        eigenvalues,
        iterations: minimum.iterations,
    })
}

pub(crate) struct Minimum {
    pub rotation: Matrix3<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Damped Newton descent on the smallest eigenvalue, starting at `prior`.
pub(crate) fn minimize(
    corr: &Correspondences,
    prior: &Matrix3<f64>,
    params: &EigensolverParams,
) -> Minimum {
    let mut rotation = *prior;
    let mut cost = cost_at(corr, &rotation);
    let mut lambda = params.lambda_init;
    let threshold = params.cost_tolerance * scatter(corr, prior).trace();

    let done = |rotation, cost, iterations| Minimum {
        rotation,
        cost,
        iterations,
        converged: true,
    };

    for iteration in 0..params.max_iterations {
        if cost <= threshold {
            return done(rotation, cost, iteration);
        }
        let (gradient, hessian) = derivatives(corr, &rotation, cost, params.derivative_step);
        if gradient.norm() <= params.gradient_tolerance {
            return done(rotation, cost, iteration);
        }

        let scale = hessian.diagonal().amax().max(f64::EPSILON);
        let damped = hessian + Matrix3::identity() * (lambda * scale);
        let Some(step) = damped.lu().solve(&-gradient) else {
            lambda *= params.lambda_factor;
            continue;
        };

        let candidate = rotate_right(&rotation, &step);
        let candidate_cost = cost_at(corr, &candidate);
        if candidate_cost < cost {
            let decrease = cost - candidate_cost;
            let previous = cost;
            rotation = candidate;
            cost = candidate_cost;
            lambda = (lambda / params.lambda_factor).max(params.lambda_min);
            if step.norm() <= params.step_tolerance
                || decrease <= params.relative_decrease * previous
            {
                return done(rotation, cost, iteration + 1);
            }
        } else {
            if step.norm() <= params.step_tolerance {
                return done(rotation, cost, iteration + 1);
            }
            lambda *= params.lambda_factor;
        }
    }

    Minimum {
        rotation,
        cost,
        iterations: params.max_iterations,
        converged: cost <= threshold,
    }
}

/// `sum n_i n_i^T` with `n_i = b1_i x (R b2_i)`.
fn scatter(corr: &Correspondences, rotation: &Matrix3<f64>) -> Matrix3<f64> {
    corr.iter().fold(Matrix3::zeros(), |acc, (b1, b2)| {
        let n = b1.cross(&(rotation * b2));
        acc + n * n.transpose()
    })
}

fn sorted_eigen(m: &Matrix3<f64>) -> (Vector3<f64>, Matrix3<f64>) {
    let eigen = SymmetricEigen::new(*m);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let mut values = Vector3::zeros();
    let mut vectors = Matrix3::zeros();
    for (dst, &src) in order.iter().enumerate() {
        values[dst] = eigen.eigenvalues[src];
        vectors.set_column(dst, &eigen.eigenvectors.column(src));
    }
    (values, vectors)
}

/// Smallest eigenvalue of the scatter matrix at `rotation`.
pub(crate) fn cost_at(corr: &Correspondences, rotation: &Matrix3<f64>) -> f64 {
    let eigen = SymmetricEigen::new(scatter(corr, rotation));
    eigen.eigenvalues.min().max(0.0)
}

/// Central-difference gradient and Hessian of the cost in the tangent space at `rotation`.
fn derivatives(
    corr: &Correspondences,
    rotation: &Matrix3<f64>,
    cost: f64,
    h: f64,
) -> (Vector3<f64>, Matrix3<f64>) {
    let f = |w: Vector3<f64>| cost_at(corr, &rotate_right(rotation, &w));
    let axis = |i: usize| Vector3::ith(i, h);

    let mut gradient = Vector3::zeros();
    let mut hessian = Matrix3::zeros();
    for i in 0..3 {
        let plus = f(axis(i));
        let minus = f(-axis(i));
        gradient[i] = (plus - minus) / (2.0 * h);
        hessian[(i, i)] = (plus - 2.0 * cost + minus) / (h * h);
    }
    for i in 0..3 {
        for j in (i + 1)..3 {
            let pp = f(axis(i) + axis(j));
            let pm = f(axis(i) - axis(j));
            let mp = f(-axis(i) + axis(j));
            let mm = f(-axis(i) - axis(j));
            let value = (pp - pm - mp + mm) / (4.0 * h * h);
            hessian[(i, j)] = value;
            hessian[(j, i)] = value;
        }
    }
    (gradient, hessian)
}
