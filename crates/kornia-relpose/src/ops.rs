use crate::bearing::Correspondences;
use crate::types::{NumericTol, RelPoseError};
use nalgebra::{DMatrix, Matrix3, Rotation3, Vector3, SVD};

/// Convert a row-major array to a nalgebra matrix.
pub(crate) fn mat3_from_array(m: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::new(
        m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
    )
}

/// Convert a nalgebra matrix to a row-major array.
pub(crate) fn mat3_to_array(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

pub(crate) fn vec3_from_array(v: &[f64; 3]) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

pub(crate) fn vec3_to_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// `R * exp([w]x)`.
pub(crate) fn rotate_right(r: &Matrix3<f64>, w: &Vector3<f64>) -> Matrix3<f64> {
    r * Rotation3::new(*w).into_inner()
}

/// Reject matrices that are not in SO(3).
pub(crate) fn check_rotation(r: &Matrix3<f64>, tol: &NumericTol) -> Result<(), RelPoseError> {
    let error = (r.transpose() * r - Matrix3::identity()).amax();
    let determinant = r.determinant();
    if !error.is_finite() || error > tol.rotation_orthonormality || determinant <= 0.0 {
        return Err(RelPoseError::InvalidRotation { error, determinant });
    }
    Ok(())
}

/// SVD of a 3x3 matrix with singular values sorted in decreasing order.
///
/// Returns `(U, S, V)` with `M = U diag(S) V^T`.
pub(crate) fn sorted_svd3(
    m: &Matrix3<f64>,
) -> Option<(Matrix3<f64>, Vector3<f64>, Matrix3<f64>)> {
    let svd = SVD::new(*m, true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let sv = svd.singular_values;

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| sv[b].total_cmp(&sv[a]));

    let mut u_sorted = Matrix3::zeros();
    let mut v_sorted = Matrix3::zeros();
    let mut s_sorted = Vector3::zeros();
    for (dst, &src) in order.iter().enumerate() {
        u_sorted.set_column(dst, &u.column(src));
        v_sorted.set_column(dst, &v_t.row(src).transpose());
        s_sorted[dst] = sv[src];
    }
    Some((u_sorted, s_sorted, v_sorted))
}

/// Scale `e` to unit Frobenius norm and make its largest-magnitude entry positive.
pub(crate) fn canonicalize_essential(e: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let norm = e.norm();
    if !norm.is_finite() || norm < f64::EPSILON {
        return None;
    }
    let e = e / norm;
    let pivot = e.iter().fold(0.0f64, |acc, &v| if v.abs() > acc.abs() { v } else { acc });
    Some(if pivot < 0.0 { -e } else { e })
}

/// Push `candidate` unless it is within `tol` (Frobenius) of an entry already kept.
pub(crate) fn push_unique(out: &mut Vec<Matrix3<f64>>, candidate: Matrix3<f64>, tol: f64) {
    if out.iter().all(|m| (m - candidate).norm() > tol) {
        out.push(candidate);
    }
}

/// Depths `(l1, l2)` of the midpoint triangulation `l1 * f1 ~ t + l2 * R f2`.
///
/// `None` when the system determinant is below `min_det` (parallel rays).
pub(crate) fn triangulate_depths(
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    f1: &Vector3<f64>,
    f2: &Vector3<f64>,
    min_det: f64,
) -> Option<(f64, f64)> {
    let g = r * f2;
    let a11 = f1.dot(f1);
    let a12 = -f1.dot(&g);
    let a22 = g.dot(&g);
    let b1 = f1.dot(t);
    let b2 = -g.dot(t);
    let det = a11 * a22 - a12 * a12;
    if det.abs() < min_det {
        return None;
    }
    Some(((a22 * b1 - a12 * b2) / det, (a11 * b2 - a12 * b1) / det))
}

/// Number of correspondences that triangulate in front of both cameras.
pub(crate) fn count_in_front(r: &Matrix3<f64>, t: &Vector3<f64>, corr: &Correspondences) -> usize {
    let min_det = corr.tol().triangulation_det;
    corr.iter()
        .filter(|(f1, f2)| {
            matches!(
                triangulate_depths(r, t, f1, f2, min_det),
                Some((l1, l2)) if l1 > 0.0 && l2 > 0.0
            )
        })
        .count()
}

/// Pick the sign of a translation direction by cheirality; ties keep `t_z >= 0`.
pub(crate) fn orient_translation(
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    corr: &Correspondences,
) -> Vector3<f64> {
    let pos = count_in_front(r, t, corr);
    let neg = count_in_front(r, &-t, corr);
    if pos > neg || (pos == neg && t.z >= 0.0) {
        *t
    } else {
        -t
    }
}

/// Right null space of the epipolar constraint matrix.
///
/// Row `i` of the constraint matrix holds `f1_i[r] * f2_i[c]` at column `3r + c`, so
/// each returned matrix `E` satisfies `f1^T E f2 ~ 0`. Returns the `dim` basis
/// matrices, the one with the smallest singular value last, together with all
/// singular values in increasing order.
pub(crate) fn epipolar_nullspace(
    corr: &Correspondences,
    dim: usize,
) -> Result<(Vec<Matrix3<f64>>, Vec<f64>), RelPoseError> {
    // pad with zero rows so the full right basis is available
    let rows = corr.len().max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (f1, f2)) in corr.iter().enumerate() {
        for r in 0..3 {
            for c in 0..3 {
                a[(i, 3 * r + c)] = f1[r] * f2[c];
            }
        }
    }

    let svd = SVD::new(a, false, true);
    let v_t = svd.v_t.ok_or_else(|| {
        RelPoseError::DegenerateConfiguration("SVD of constraint matrix failed".into())
    })?;
    let sv = svd.singular_values;

    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&a, &b| sv[b].total_cmp(&sv[a]));

    let basis = order
        .iter()
        .rev()
        .take(dim)
        .rev()
        .map(|&k| {
            let row = v_t.row(k);
            Matrix3::new(
                row[0], row[1], row[2], row[3], row[4], row[5], row[6], row[7], row[8],
            )
        })
        .collect();
    let ascending = order.iter().rev().map(|&k| sv[k]).collect();
    Ok((basis, ascending))
}
