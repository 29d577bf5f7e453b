//! Essential matrix construction, decomposition and epipolar residuals.

use crate::bearing::Correspondences;
use crate::ops::{canonicalize_essential, count_in_front, sorted_svd3};
use crate::types::RelPoseError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Residual used to score a correspondence against an essential matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EpipolarResidual {
    /// `|b1^T E b2|`.
    #[default]
    Algebraic,
    /// First-order geometric error on the tangent planes of both bearings.
    Sampson,
}

impl EpipolarResidual {
    /// Evaluate the residual of one correspondence.
    pub fn evaluate(&self, e: &Matrix3<f64>, b1: &Vector3<f64>, b2: &Vector3<f64>) -> f64 {
        match self {
            Self::Algebraic => algebraic_error(e, b1, b2),
            Self::Sampson => sampson_error(e, b1, b2),
        }
    }
}

/// Canonical essential matrix of a pose: `[t]x R` scaled to unit Frobenius norm.
pub fn essential_from_pose(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
) -> Result<Matrix3<f64>, RelPoseError> {
    canonicalize_essential(&(translation.cross_matrix() * rotation)).ok_or_else(|| {
        RelPoseError::DegenerateConfiguration("zero translation has no essential matrix".into())
    })
}

/// Decompose an essential matrix into its four `(R, t)` candidates, `t` of unit norm.
pub fn decompose_essential(
    e: &Matrix3<f64>,
) -> Result<[(Matrix3<f64>, Vector3<f64>); 4], RelPoseError> {
    let (mut u, _, mut v) = sorted_svd3(e)
        .ok_or_else(|| {
            RelPoseError::DegenerateConfiguration("SVD of essential matrix failed".into())
        })?;
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v.determinant() < 0.0 {
        v.column_mut(2).neg_mut();
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v.transpose();
    let r2 = u * w.transpose() * v.transpose();
    let t: Vector3<f64> = u.column(2).into_owned();

    Ok([(r1, t), (r1, -t), (r2, t), (r2, -t)])
}

/// The decomposition of `e` with the most correspondences in front of both cameras.
pub fn pose_from_essential(
    e: &Matrix3<f64>,
    corr: &Correspondences,
) -> Result<(Matrix3<f64>, Vector3<f64>), RelPoseError> {
    let candidates = decompose_essential(e)?;
    let mut best = candidates[0];
    let mut best_count = 0usize;
    for (r, t) in candidates {
        let count = count_in_front(&r, &t, corr);
        if count > best_count {
            best_count = count;
            best = (r, t);
        }
    }
    Ok(best)
}

/// Algebraic epipolar error `|b1^T E b2|`.
pub fn algebraic_error(e: &Matrix3<f64>, b1: &Vector3<f64>, b2: &Vector3<f64>) -> f64 {
    b1.dot(&(e * b2)).abs()
}

/// Sampson error with gradients projected onto the tangent plane of each bearing.
pub fn sampson_error(e: &Matrix3<f64>, b1: &Vector3<f64>, b2: &Vector3<f64>) -> f64 {
    let e_b2 = e * b2;
    let et_b1 = e.transpose() * b1;
    let g1 = e_b2 - b1 * b1.dot(&e_b2);
    let g2 = et_b1 - b2 * b2.dot(&et_b1);
    let denom = (g1.norm_squared() + g2.norm_squared()).sqrt();
    let num = b1.dot(&e_b2).abs();
    if denom < f64::EPSILON {
        return num;
    }
    num / denom
}
