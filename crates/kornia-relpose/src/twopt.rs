//! Translation direction from a known rotation.

use crate::bearing::Correspondences;
use crate::ops::{check_rotation, orient_translation};
use crate::types::RelPoseError;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};

/// Minimal number of correspondences.
pub const SAMPLE_SIZE: usize = 2;

/// Unit translation direction given the relative rotation.
///
/// Every correspondence constrains `t` to be orthogonal to its epipolar plane normal
/// `b1 x (R b2)`. With two correspondences the solution is exact, with more it is the
/// least-squares direction. The sign is chosen by cheirality.
pub fn translation_twopt(
    corr: &Correspondences,
    rotation: &Matrix3<f64>,
) -> Result<Vector3<f64>, RelPoseError> {
    corr.require(SAMPLE_SIZE)?;
    let tol = corr.tol();
    check_rotation(rotation, tol)?;

    let mut scatter = Matrix3::zeros();
    let mut usable = 0usize;
    for (b1, b2) in corr.iter() {
        let n = b1.cross(&(rotation * b2));
        let norm = n.norm();
        if norm < tol.min_parallax {
            continue;
        }
        let n = n / norm;
        scatter += n * n.transpose();
        usable += 1;
    }
    if usable < SAMPLE_SIZE {
        return Err(RelPoseError::DegenerateConfiguration(format!(
            "only {usable} correspondences have parallax under the given rotation"
        )));
    }

    let eigen = SymmetricEigen::new(scatter);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let (mid, max) = (eigen.eigenvalues[order[1]], eigen.eigenvalues[order[2]]);
    if mid <= tol.rank_deficiency * max {
        return Err(RelPoseError::DegenerateConfiguration(
            "epipolar plane normals are parallel".into(),
        ));
    }

    let t: Vector3<f64> = eigen.eigenvectors.column(order[0]).normalize();
    Ok(orient_translation(rotation, &t, corr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_scene;
    use crate::types::NumericTol;
    use approx::assert_relative_eq;

    #[test]
    fn test_twopt_minimal() -> Result<(), RelPoseError> {
        for seed in 0..5 {
            let scene = synthetic_scene(2, 0.0, 0.0, seed);
            let t = translation_twopt(&scene.corr, &scene.rotation)?;
            assert_relative_eq!(t, scene.translation.normalize(), epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_twopt_least_squares() -> Result<(), RelPoseError> {
        let scene = synthetic_scene(10, 0.0, 0.0, 9);
        let t = translation_twopt(&scene.corr, &scene.rotation)?;
        assert_relative_eq!(t, scene.translation.normalize(), epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_twopt_parallel_pairs_are_degenerate() -> Result<(), RelPoseError> {
        let scene = synthetic_scene(2, 0.0, 0.0, 3);
        let repeated = scene.corr.subset(&[0, 0])?;
        assert!(matches!(
            translation_twopt(&repeated, &scene.rotation),
            Err(RelPoseError::DegenerateConfiguration(_))
        ));

        // pure rotation: every normal vanishes
        let b2 = [[0.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
        let corr = Correspondences::new(&b2, &b2)?;
        assert!(matches!(
            translation_twopt(&corr, &Matrix3::identity()),
            Err(RelPoseError::DegenerateConfiguration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_twopt_parallax_cutoff_is_configurable() -> Result<(), RelPoseError> {
        let scene = synthetic_scene(6, 0.0, 0.0, 4);
        let b1: Vec<[f64; 3]> = scene.corr.bearings1().iter().map(|b| [b.x, b.y, b.z]).collect();
        let b2: Vec<[f64; 3]> = scene.corr.bearings2().iter().map(|b| [b.x, b.y, b.z]).collect();
        let tol = NumericTol {
            min_parallax: 2.0,
            ..NumericTol::default()
        };
        let corr = Correspondences::with_tolerance(&b1, &b2, tol)?;
        assert!(matches!(
            translation_twopt(&corr, &scene.rotation),
            Err(RelPoseError::DegenerateConfiguration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_twopt_rejects_invalid_rotation() {
        let scene = synthetic_scene(4, 0.0, 0.0, 0);
        assert!(matches!(
            translation_twopt(&scene.corr, &(scene.rotation * 1.5)),
            Err(RelPoseError::InvalidRotation { .. })
        ));
    }
}
