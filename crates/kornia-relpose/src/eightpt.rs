//! Linear eight-point essential matrix solver.

use crate::bearing::Correspondences;
use crate::ops::{canonicalize_essential, epipolar_nullspace, sorted_svd3};
use crate::types::RelPoseError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Minimal number of correspondences.
pub const SAMPLE_SIZE: usize = 8;

/// Parameters for the eight-point solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EightPtParams {
    /// Replace the two non-zero singular values by their common value 1 after the projection.
    pub equalize_singular_values: bool,
}

impl Default for EightPtParams {
    fn default() -> Self {
        Self {
            equalize_singular_values: true,
        }
    }
}

/// Least-squares essential matrix from eight or more correspondences, projected to rank 2.
pub fn essential_eightpt(
    corr: &Correspondences,
    params: &EightPtParams,
) -> Result<Matrix3<f64>, RelPoseError> {
    corr.require(SAMPLE_SIZE)?;
    let tol = corr.tol();
    let (basis, singular_values) = epipolar_nullspace(corr, 1)?;
    let largest = singular_values.last().copied().unwrap_or(0.0);
    if singular_values.len() > 1 && singular_values[1] <= tol.rank_deficiency * largest {
        return Err(RelPoseError::DegenerateConfiguration(
            "eight-point null space has more than one dimension".into(),
        ));
    }

    let (u, s, v) = sorted_svd3(&basis[0])
        .ok_or_else(|| {
            RelPoseError::DegenerateConfiguration("SVD of essential matrix failed".into())
        })?;
    let s = if params.equalize_singular_values {
        Vector3::new(1.0, 1.0, 0.0)
    } else {
        Vector3::new(s[0], s[1], 0.0)
    };
    let e = u * Matrix3::from_diagonal(&s) * v.transpose();
    canonicalize_essential(&e).ok_or_else(|| {
        RelPoseError::DegenerateConfiguration("eight-point solution vanished".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::essential::essential_from_pose;
    use crate::testing::{proportional, synthetic_scene};
    use approx::assert_relative_eq;

    #[test]
    fn test_eightpt_recovers_essential() -> Result<(), RelPoseError> {
        for (n, seed) in [(8, 0), (10, 1), (50, 2)] {
            let scene = synthetic_scene(n, 0.0, 0.0, seed);
            let truth = essential_from_pose(&scene.rotation, &scene.translation)?;
            let e = essential_eightpt(&scene.corr, &EightPtParams::default())?;
            assert!(proportional(&e, &truth, 1e-8));
        }
        Ok(())
    }

    #[test]
    fn test_eightpt_projection_is_rank_two() -> Result<(), RelPoseError> {
        let scene = synthetic_scene(30, 1e-3, 0.0, 4);
        let e = essential_eightpt(&scene.corr, &EightPtParams::default())?;
        let (_, s, _) = sorted_svd3(&e).unwrap();
        assert_relative_eq!(s[0], s[1], epsilon = 1e-12);
        assert!(s[2] < 1e-12);

        let params = EightPtParams {
            equalize_singular_values: false,
        };
        let e = essential_eightpt(&scene.corr, &params)?;
        let (_, s, _) = sorted_svd3(&e).unwrap();
        assert!(s[2] < 1e-12);
        assert_relative_eq!(e.norm(), 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_eightpt_requires_eight() {
        let scene = synthetic_scene(7, 0.0, 0.0, 0);
        assert!(matches!(
            essential_eightpt(&scene.corr, &EightPtParams::default()),
            Err(RelPoseError::InsufficientCorrespondences {
                required: 8,
                actual: 7
            })
        ));
    }
}
