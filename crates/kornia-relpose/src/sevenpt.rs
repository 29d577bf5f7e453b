//! Seven-point essential matrix solver.

use crate::bearing::Correspondences;
use crate::ops::{canonicalize_essential, epipolar_nullspace, push_unique};
use crate::polynomial::real_roots;
use crate::types::RelPoseError;
use nalgebra::Matrix3;

/// Minimal number of correspondences.
pub const SAMPLE_SIZE: usize = 7;

/// Estimate essential matrices from seven or more correspondences.
///
/// The two-dimensional null space `E(a) = a E1 + (1 - a) E2` is constrained by
/// `det(E(a)) = 0`, a cubic in `a`. Returns one to three canonical candidates.
/// Only the rank-2 constraint is imposed, so candidates are not forced to have two
/// equal singular values.
pub fn essential_sevenpt(corr: &Correspondences) -> Result<Vec<Matrix3<f64>>, RelPoseError> {
    corr.require(SAMPLE_SIZE)?;
    let tol = corr.tol();
    let (basis, singular_values) = epipolar_nullspace(corr, 2)?;
    let largest = singular_values.last().copied().unwrap_or(0.0);
    if singular_values.len() > 2 && singular_values[2] <= tol.rank_deficiency * largest {
        return Err(RelPoseError::DegenerateConfiguration(
            "seven-point null space has more than two dimensions".into(),
        ));
    }

    let e1 = basis[0];
    let e2 = basis[1];
    let d = e1 - e2;

    // det(E2 + a D) as c0 + c1 a + c2 a^2 + c3 a^3, from four samples
    let det_at = |a: f64| (e2 + d * a).determinant();
    let p0 = det_at(0.0);
    let p1 = det_at(1.0);
    let pm1 = det_at(-1.0);
    let p2 = det_at(2.0);
    let c0 = p0;
    let c2 = 0.5 * (p1 + pm1) - c0;
    let odd = 0.5 * (p1 - pm1);
    let c3 = (p2 - c0 - 4.0 * c2 - 2.0 * odd) / 6.0;
    let c1 = odd - c3;

    let mut out = Vec::new();
    for a in real_roots(&[c0, c1, c2, c3], tol.root_imaginary) {
        if let Some(e) = canonicalize_essential(&(e2 + d * a)) {
            push_unique(&mut out, e, tol.duplicate);
        }
    }
    // root at infinity
    let scale = c0.abs().max(c1.abs()).max(c2.abs()).max(c3.abs());
    if c3.abs() <= f64::EPSILON * scale {
        if let Some(e) = canonicalize_essential(&d) {
            push_unique(&mut out, e, tol.duplicate);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::essential::essential_from_pose;
    use crate::testing::{proportional, synthetic_scene};

    #[test]
    fn test_sevenpt_contains_true_essential() -> Result<(), RelPoseError> {
        for seed in 0..10 {
            let scene = synthetic_scene(7, 0.0, 0.0, seed);
            let truth = essential_from_pose(&scene.rotation, &scene.translation)?;
            let candidates = essential_sevenpt(&scene.corr)?;
            assert!(!candidates.is_empty() && candidates.len() <= 3);
            assert!(candidates.iter().any(|e| proportional(e, &truth, 1e-6)));
            for e in &candidates {
                assert!(e.determinant().abs() < 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_sevenpt_overdetermined() -> Result<(), RelPoseError> {
        let scene = synthetic_scene(10, 0.0, 0.0, 11);
        let truth = essential_from_pose(&scene.rotation, &scene.translation)?;
        let candidates = essential_sevenpt(&scene.corr)?;
        assert!(candidates.iter().any(|e| proportional(e, &truth, 1e-6)));
        Ok(())
    }

    #[test]
    fn test_sevenpt_rejects_repeated_points() -> Result<(), RelPoseError> {
        let scene = synthetic_scene(6, 0.0, 0.0, 1);
        let corr = scene.corr.subset(&[0, 1, 2, 3, 4, 5, 5])?;
        assert!(matches!(
            essential_sevenpt(&corr),
            Err(RelPoseError::DegenerateConfiguration(_))
        ));
        Ok(())
    }
}
