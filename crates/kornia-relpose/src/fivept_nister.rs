//! Five-point essential matrix solver (Nister, in the action-matrix formulation of Stewenius).

use crate::bearing::Correspondences;
use crate::ops::{canonicalize_essential, epipolar_nullspace, push_unique};
use crate::polynomial::{Poly3, NUM_MONOMIALS};
use crate::types::RelPoseError;
use nalgebra::{Matrix3, SMatrix, Schur, SVD};

type Matrix10 = SMatrix<f64, 10, 10>;

/// Minimal number of correspondences.
pub const SAMPLE_SIZE: usize = 5;

/// Rows of the elimination template whose cubic monomial equals `z` times a basis monomial.
const Z_TIMES_BASIS: [usize; 6] = [2, 4, 5, 7, 8, 9];

/// Estimate essential matrices from five or more correspondences.
///
/// With more than five correspondences the four-dimensional null space is taken in
/// the least-squares sense. Returns every real solution (up to 10) in canonical form.
pub fn essential_fivept_nister(corr: &Correspondences) -> Result<Vec<Matrix3<f64>>, RelPoseError> {
    corr.require(SAMPLE_SIZE)?;
    let tol = corr.tol();
    let (basis, _) = epipolar_nullspace(corr, 4)?;

    // E = x E1 + y E2 + z E3 + E4, one linear polynomial per entry
    let mut e = [[Poly3::zero(); 3]; 3];
    for (r, row) in e.iter_mut().enumerate() {
        for (c, entry) in row.iter_mut().enumerate() {
            *entry = Poly3::linear(
                basis[0][(r, c)],
                basis[1][(r, c)],
                basis[2][(r, c)],
                basis[3][(r, c)],
            );
        }
    }

    let template = constraint_template(&e);
    let m1: Matrix10 = template.fixed_view::<10, 10>(0, 0).into_owned();
    let m2: Matrix10 = template.fixed_view::<10, 10>(0, 10).into_owned();
    let c = m1.lu().solve(&(-m2)).ok_or_else(|| {
        RelPoseError::DegenerateConfiguration("five-point elimination template is singular".into())
    })?;

    // action matrix of multiplication by z on [x^2, xy, xz, y^2, yz, z^2, x, y, z, 1]
    let mut action = Matrix10::zeros();
    for (row, &src) in Z_TIMES_BASIS.iter().enumerate() {
        action.set_row(row, &c.row(src));
    }
    action[(6, 2)] = 1.0;
    action[(7, 4)] = 1.0;
    action[(8, 5)] = 1.0;
    action[(9, 8)] = 1.0;

    let schur = Schur::try_new(action, f64::EPSILON, 1000).ok_or_else(|| {
        RelPoseError::DegenerateConfiguration(
            "five-point action matrix eigen decomposition failed".into(),
        )
    })?;

    let mut out = Vec::new();
    for ev in schur.complex_eigenvalues().iter() {
        if ev.im.abs() > tol.root_imaginary * (1.0 + ev.re.abs()) {
            continue;
        }
        let Some(b) = null_vector(&(action - Matrix10::identity() * ev.re)) else {
            continue;
        };
        if b[9].abs() < tol.rank_deficiency {
            continue;
        }
        let (x, y, z) = (b[6] / b[9], b[7] / b[9], b[8] / b[9]);
        let candidate = basis[0] * x + basis[1] * y + basis[2] * z + basis[3];
        if let Some(candidate) = canonicalize_essential(&candidate) {
            push_unique(&mut out, candidate, tol.duplicate);
        }
    }
    Ok(out)
}

/// The 10x20 coefficient matrix of `det(E) = 0` and `2 E E^T E - tr(E E^T) E = 0`.
fn constraint_template(e: &[[Poly3; 3]; 3]) -> SMatrix<f64, 10, NUM_MONOMIALS> {
    let mut eet = [[Poly3::zero(); 3]; 3];
    for (i, row) in eet.iter_mut().enumerate() {
        for (j, entry) in row.iter_mut().enumerate() {
            *entry = e[i][0] * e[j][0] + e[i][1] * e[j][1] + e[i][2] * e[j][2];
        }
    }
    let trace = eet[0][0] + eet[1][1] + eet[2][2];

    let mut template = SMatrix::<f64, 10, NUM_MONOMIALS>::zeros();
    let det = e[0][0] * (e[1][1] * e[2][2] - e[1][2] * e[2][1])
        - e[0][1] * (e[1][0] * e[2][2] - e[1][2] * e[2][0])
        + e[0][2] * (e[1][0] * e[2][1] - e[1][1] * e[2][0]);
    set_row(&mut template, 0, &det);

    for i in 0..3 {
        for j in 0..3 {
            let product = eet[i][0] * e[0][j] + eet[i][1] * e[1][j] + eet[i][2] * e[2][j];
            let constraint = product * 2.0 - trace * e[i][j];
            set_row(&mut template, 1 + 3 * i + j, &constraint);
        }
    }
    template
}

fn set_row(template: &mut SMatrix<f64, 10, NUM_MONOMIALS>, row: usize, p: &Poly3) {
    for (col, &v) in p.0.iter().enumerate() {
        template[(row, col)] = v;
    }
}

/// Right singular vector of the smallest singular value.
fn null_vector(m: &Matrix10) -> Option<SMatrix<f64, 10, 1>> {
    let svd = SVD::new(*m, false, true);
    let v_t = svd.v_t?;
    let (k, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    Some(v_t.row(k).transpose())
}
