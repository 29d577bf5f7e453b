//! Bearing vectors and correspondence sets.

use crate::types::{NumericTol, RelPoseError};
use nalgebra::Vector3;

/// Two parallel sequences of unit bearing vectors, index `i` of view 1 paired with
/// index `i` of view 2.
///
/// Inputs are normalized on construction, so solvers only ever see unit vectors.
#[derive(Debug, Clone)]
pub struct Correspondences {
    bearings1: Vec<Vector3<f64>>,
    bearings2: Vec<Vector3<f64>>,
    tol: NumericTol,
}

impl Correspondences {
    /// Build a correspondence set with the default tolerances.
    pub fn new(bearings1: &[[f64; 3]], bearings2: &[[f64; 3]]) -> Result<Self, RelPoseError> {
        Self::with_tolerance(bearings1, bearings2, NumericTol::default())
    }

    /// Build a correspondence set, validating lengths and norms against `tol`.
    pub fn with_tolerance(
        bearings1: &[[f64; 3]],
        bearings2: &[[f64; 3]],
        tol: NumericTol,
    ) -> Result<Self, RelPoseError> {
        if bearings1.len() != bearings2.len() {
            return Err(RelPoseError::MismatchedArrayLengths {
                left_name: "bearings1",
                left_len: bearings1.len(),
                right_name: "bearings2",
                right_len: bearings2.len(),
            });
        }
        let bearings1 = normalize_all(bearings1, 1, tol.min_bearing_norm)?;
        let bearings2 = normalize_all(bearings2, 2, tol.min_bearing_norm)?;
        Ok(Self {
            bearings1,
            bearings2,
            tol,
        })
    }

    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.bearings1.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.bearings1.is_empty()
    }

    /// Unit bearings observed in view 1.
    pub fn bearings1(&self) -> &[Vector3<f64>] {
        &self.bearings1
    }

    /// Unit bearings observed in view 2.
    pub fn bearings2(&self) -> &[Vector3<f64>] {
        &self.bearings2
    }

    /// Tolerances attached to this set.
    pub fn tol(&self) -> &NumericTol {
        &self.tol
    }

    /// Iterate over `(b1, b2)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Vector3<f64>, &Vector3<f64>)> + '_ {
        self.bearings1.iter().zip(self.bearings2.iter())
    }

    /// Fail with [`RelPoseError::InsufficientCorrespondences`] when fewer than `required`
    /// pairs exist.
    pub fn require(&self, required: usize) -> Result<(), RelPoseError> {
        if self.len() < required {
            return Err(RelPoseError::InsufficientCorrespondences {
                required,
                actual: self.len(),
            });
        }
        Ok(())
    }

    /// A new set holding the pairs at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, RelPoseError> {
        let len = self.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(RelPoseError::IndexOutOfRange { index, len });
        }
        Ok(Self {
            bearings1: indices.iter().map(|&i| self.bearings1[i]).collect(),
            bearings2: indices.iter().map(|&i| self.bearings2[i]).collect(),
            tol: self.tol.clone(),
        })
    }
}

fn normalize_all(
    vectors: &[[f64; 3]],
    view: usize,
    min_norm: f64,
) -> Result<Vec<Vector3<f64>>, RelPoseError> {
    vectors
        .iter()
        .enumerate()
        .map(|(index, v)| {
            let v = Vector3::new(v[0], v[1], v[2]);
            let norm = v.norm();
            if !norm.is_finite() || norm < min_norm {
                return Err(RelPoseError::ZeroNormBearing { view, index, norm });
            }
            Ok(v / norm)
        })
        .collect()
}
