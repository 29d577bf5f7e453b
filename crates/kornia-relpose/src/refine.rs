//! Levenberg–Marquardt refinement of a relative pose.

use crate::bearing::Correspondences;
use crate::ops::{check_rotation, rotate_right};
use crate::types::RelPoseError;
use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// Minimal number of correspondences.
pub const SAMPLE_SIZE: usize = 5;

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LMRefineParams {
    /// Maximum number of LM iterations.
    pub max_iterations: usize,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_factor: f64,
    /// Lower bound lambda is clamped to after accepted steps.
    pub lambda_min: f64,
    /// Converged when an accepted step decreases the cost by less than this fraction.
    pub cost_tolerance: f64,
    /// Converged when the gradient `J^T r` drops below this norm.
    pub gradient_tolerance: f64,
    /// Converged when the step drops below this fraction of the parameter norm.
    pub step_tolerance: f64,
    /// Finite-difference step for the Jacobian (radians, and units scaled by `|t|`).
    pub derivative_step: f64,
}

impl Default for LMRefineParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            lambda_init: 1e-3,
            lambda_factor: 10.0,
            lambda_min: 1e-12,
            cost_tolerance: 1e-12,
            gradient_tolerance: 1e-14,
            step_tolerance: 1e-12,
            derivative_step: 1e-6,
        }
    }
}

impl LMRefineParams {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative cost decrease tolerance.
    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    /// Set the initial damping factor.
    pub fn with_lambda_init(mut self, lambda_init: f64) -> Self {
        self.lambda_init = lambda_init;
        self
    }

    /// Set the damping floor.
    pub fn with_lambda_min(mut self, lambda_min: f64) -> Self {
        self.lambda_min = lambda_min;
        self
    }
}

/// Result of [`refine_relative_pose`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefineResult {
    /// Refined rotation.
    pub rotation: Matrix3<f64>,
    /// Refined translation, with the magnitude of the seed.
    pub translation: Vector3<f64>,
    /// Root-mean-square algebraic epipolar residual.
    pub rms: f64,
    /// Number of iterations run.
    pub iterations: usize,
}

/// Refine a seed pose by minimizing `sum (b1 . (t_hat x R b2))^2`.
///
/// The rotation is updated multiplicatively as `R exp([w]x)`. Since the epipolar
/// residuals only see the direction of `t`, an extra residual `|t| - |t_seed|` keeps
/// the scale fixed.
pub fn refine_relative_pose(
    corr: &Correspondences,
    seed_translation: &Vector3<f64>,
    seed_rotation: &Matrix3<f64>,
    params: &LMRefineParams,
) -> Result<RefineResult, RelPoseError> {
    corr.require(SAMPLE_SIZE)?;
    check_rotation(seed_rotation, corr.tol())?;
    let scale = seed_translation.norm();
    if !scale.is_finite() || scale < corr.tol().min_bearing_norm {
        return Err(RelPoseError::DegenerateConfiguration(
            "seed translation is zero".into(),
        ));
    }

    let n = corr.len();
    let mut rotation = *seed_rotation;
    let mut translation = *seed_translation;

    let mut residuals = vec![0.0; n + 1];
    let mut residuals_p = vec![0.0; n + 1];
    let mut residuals_m = vec![0.0; n + 1];
    let mut cost = evaluate(corr, &rotation, &translation, scale, &mut residuals);

    let mut lambda = params.lambda_init;
    let mut jacobian = vec![Vector6::<f64>::zeros(); n + 1];
    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < params.max_iterations {
        iterations += 1;
        if cost <= f64::MIN_POSITIVE {
            converged = true;
            break;
        }

        // Central differences around the current estimate
        let h_rot = params.derivative_step;
        let h_trans = params.derivative_step * translation.amax().max(1.0);
        for k in 0..6 {
            let h = if k < 3 { h_rot } else { h_trans };
            let mut delta = Vector6::zeros();
            delta[k] = h;
            let (r_p, t_p) = apply(&rotation, &translation, &delta);
            let (r_m, t_m) = apply(&rotation, &translation, &-delta);
            evaluate(corr, &r_p, &t_p, scale, &mut residuals_p);
            evaluate(corr, &r_m, &t_m, scale, &mut residuals_m);
            for (row, (p, m)) in jacobian.iter_mut().zip(residuals_p.iter().zip(&residuals_m)) {
                row[k] = (p - m) / (2.0 * h);
            }
        }

        // Normal equations: (J^T J + lambda I) delta = -J^T r
        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        for (row, &r) in jacobian.iter().zip(&residuals) {
            jtj += row * row.transpose();
            jtr += row * r;
        }
        if jtr.norm() <= params.gradient_tolerance {
            converged = true;
            break;
        }
        let damped = jtj + Matrix6::identity() * lambda;

        let Some(delta) = damped.lu().solve(&-jtr) else {
            // Singular system, increase damping
            lambda *= params.lambda_factor;
            continue;
        };
        let small_step = delta.norm()
            <= params.step_tolerance * (translation.norm() + params.step_tolerance);

        let (r_new, t_new) = apply(&rotation, &translation, &delta);
        let cost_new = evaluate(corr, &r_new, &t_new, scale, &mut residuals_p);
        if cost_new < cost {
            let decrease = cost - cost_new;
            let previous = cost;
            rotation = r_new;
            translation = t_new;
            cost = cost_new;
            residuals.copy_from_slice(&residuals_p);
            lambda = (lambda / params.lambda_factor).max(params.lambda_min);
            if small_step || decrease <= params.cost_tolerance * previous {
                converged = true;
                break;
            }
        } else {
            if small_step {
                converged = true;
                break;
            }
            // Reject step, increase damping
            lambda *= params.lambda_factor;
        }
    }

    if !converged {
        return Err(RelPoseError::ConvergenceFailure { iterations, cost });
    }

    let epipolar_sq: f64 = residuals[..n].iter().map(|r| r * r).sum();
    log::debug!("lm refine: converged after {iterations} iterations, cost {cost:e}");
    Ok(RefineResult {
        rotation,
        translation,
        rms: (epipolar_sq / n as f64).sqrt(),
        iterations,
    })
}

fn apply(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    delta: &Vector6<f64>,
) -> (Matrix3<f64>, Vector3<f64>) {
    let w = Vector3::new(delta[0], delta[1], delta[2]);
    let dt = Vector3::new(delta[3], delta[4], delta[5]);
    (rotate_right(rotation, &w), translation + dt)
}

/// Writes the residuals into `out` and returns the squared cost.
fn evaluate(
    corr: &Correspondences,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    scale: f64,
    out: &mut [f64],
) -> f64 {
    let norm = translation.norm();
    let t_hat = translation / norm.max(f64::MIN_POSITIVE);
    let mut sum_sq = 0.0;
    for ((b1, b2), r) in corr.iter().zip(out.iter_mut()) {
        *r = b1.dot(&t_hat.cross(&(rotation * b2)));
        sum_sq += *r * *r;
    }
    let gauge = norm - scale;
    out[corr.len()] = gauge;
    sum_sq + gauge * gauge
}
