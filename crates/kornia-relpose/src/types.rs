//! Common data types shared across relative pose solvers.

use crate::ops::{mat3_from_array, mat3_to_array, vec3_from_array};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for relative pose solvers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelPoseError {
    /// Invalid input data - mismatched array lengths with descriptive labels.
    #[error("Mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedArrayLengths {
        /// Label for the left-hand slice
        left_name: &'static str,
        /// Length of the left-hand slice
        left_len: usize,
        /// Label for the right-hand slice
        right_name: &'static str,
        /// Length of the right-hand slice
        right_len: usize,
    },

    /// Invalid input data - insufficient correspondences for the specific solver
    #[error("Solver requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required by the solver
        required: usize,
        /// Actual number of correspondences provided
        actual: usize,
    },

    /// A bearing vector cannot be normalized.
    #[error("Bearing {index} of view {view} has near-zero norm ({norm:e})")]
    ZeroNormBearing {
        /// View the bearing belongs to (1 or 2).
        view: usize,
        /// Index of the bearing within its sequence.
        index: usize,
        /// Norm of the offending vector.
        norm: f64,
    },

    /// A correspondence index points past the end of the set.
    #[error("Correspondence index {index} out of range for {len} correspondences")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of correspondences in the set.
        len: usize,
    },

    /// A rotation prior or seed is not a proper rotation matrix.
    #[error("Matrix is not a rotation (orthonormality error {error:e}, determinant {determinant})")]
    InvalidRotation {
        /// Largest absolute entry of `R^T R - I`.
        error: f64,
        /// Determinant of the matrix.
        determinant: f64,
    },

    /// The requested solver name is not known.
    #[error("Unknown solver name: {0}")]
    UnknownSolver(String),

    /// The sample is rank-deficient or otherwise degenerate.
    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(String),

    /// An iterative solver exhausted its iteration budget.
    #[error("Failed to converge after {iterations} iterations (cost {cost:e})")]
    ConvergenceFailure {
        /// Number of iterations that were run.
        iterations: usize,
        /// Cost at the last accepted estimate.
        cost: f64,
    },

    /// RANSAC could not find an adequate consensus set.
    #[error("RANSAC requires at least {required} inliers, best hypothesis had {actual}")]
    InsufficientConsensus {
        /// Minimum consensus size.
        required: usize,
        /// Size of the best consensus set found.
        actual: usize,
    },
}

/// Coarse classification of [`RelPoseError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or mismatched input.
    InvalidInput,
    /// Rank-deficient or near-parallel configuration.
    DegenerateConfiguration,
    /// An iterative method ran out of iterations.
    ConvergenceFailure,
    /// No adequate inlier set was found.
    InsufficientConsensus,
}

impl RelPoseError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MismatchedArrayLengths { .. }
            | Self::InsufficientCorrespondences { .. }
            | Self::ZeroNormBearing { .. }
            | Self::IndexOutOfRange { .. }
            | Self::InvalidRotation { .. }
            | Self::UnknownSolver(_) => ErrorKind::InvalidInput,
            Self::DegenerateConfiguration(_) => ErrorKind::DegenerateConfiguration,
            Self::ConvergenceFailure { .. } => ErrorKind::ConvergenceFailure,
            Self::InsufficientConsensus { .. } => ErrorKind::InsufficientConsensus,
        }
    }
}

/// Numeric tolerances used throughout the relative pose pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericTol {
    /// Bearings shorter than this cannot be normalized.
    pub min_bearing_norm: f64,
    /// Polynomial roots whose imaginary part exceeds `root_imaginary * (1 + |re|)` are discarded.
    pub root_imaginary: f64,
    /// Relative singular/eigen value below which a system is treated as rank-deficient.
    pub rank_deficiency: f64,
    /// Frobenius distance under which two candidate matrices are merged.
    pub duplicate: f64,
    /// Maximum entry of `R^T R - I` accepted for a rotation input.
    pub rotation_orthonormality: f64,
    /// Epipolar plane normals `|b1 x R b2|` shorter than this carry no translation information.
    pub min_parallax: f64,
    /// Smallest determinant of the midpoint triangulation system; below it the rays are parallel.
    pub triangulation_det: f64,
}

impl Default for NumericTol {
    fn default() -> Self {
        Self {
            min_bearing_norm: 1e-12,
            root_imaginary: 1e-8,
            rank_deficiency: 1e-10,
            duplicate: 1e-6,
            rotation_orthonormality: 1e-6,
            min_parallax: 1e-6,
            triangulation_det: 1e-12,
        }
    }
}

/// Relative pose of viewpoint 2 with respect to viewpoint 1.
///
/// A point `X2` in frame 2 maps to frame 1 as `X1 = rotation * X2 + translation`,
/// so `translation` is the position of camera 2 expressed in camera 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }
}

impl Pose {
    /// Create a pose from a rotation and a translation.
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Essential matrix `[t]x R` of this pose (not normalized).
    pub fn essential(&self) -> [[f64; 3]; 3] {
        let e = vec3_from_array(&self.translation).cross_matrix() * mat3_from_array(&self.rotation);
        mat3_to_array(&e)
    }

    /// The 3x4 transformation `[R | t]`.
    pub fn transformation(&self) -> [[f64; 4]; 3] {
        let mut out = [[0.0; 4]; 3];
        for (row, out_row) in out.iter_mut().enumerate() {
            out_row[..3].copy_from_slice(&self.rotation[row]);
            out_row[3] = self.translation[row];
        }
        out
    }
}
