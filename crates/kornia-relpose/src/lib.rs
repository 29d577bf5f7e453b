#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia RelPose (two-view relative pose)
//!
//! Relative pose between two calibrated cameras from bearing-vector correspondences.
//!
//! ## Key Features
//!
//! - **Minimal Solvers**: two-point translation, five-point Nister and Kneip, seven-point
//! - **Linear Solver**: eight-point with rank-2 projection
//! - **Eigensolver**: rotation refinement from a prior
//! - **Non-linear Refinement**: Levenberg–Marquardt over the 6-DoF pose
//! - **RANSAC Support**: robust estimation with pluggable sample-consensus problems
//!
//! ## Conventions
//!
//! A [`Pose`] maps frame 2 into frame 1: `X1 = R * X2 + t`. Essential matrices are
//! `E = [t]x R`, satisfy `b1^T E b2 = 0`, and are returned with unit Frobenius norm and
//! a positive largest-magnitude entry. Matrices are row-major `[[f64; 3]; 3]`.
//!
//! ## Example: Eight-point
//!
//! ```rust
//! use kornia_relpose::relative_pose_eightpt;
//!
//! // camera 2 sits one unit along x, same orientation
//! let points: Vec<[f64; 3]> = (0..12)
//!     .map(|i| {
//!         let a = i as f64;
//!         [a.sin(), a.cos(), 4.0 + 0.3 * a]
//!     })
//!     .collect();
//! let bearings1 = points.clone();
//! let bearings2: Vec<[f64; 3]> = points.iter().map(|p| [p[0] - 1.0, p[1], p[2]]).collect();
//!
//! let e = relative_pose_eightpt(&bearings1, &bearings2)?;
//! println!("Essential matrix: {:?}", e);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Example: Robust estimation with RANSAC
//!
//! ```rust
//! use kornia_relpose::{relative_pose_ransac, RansacSolver};
//!
//! # let points: Vec<[f64; 3]> = (0..30)
//! #     .map(|i| { let a = i as f64; [a.sin(), a.cos(), 4.0 + 0.1 * a] })
//! #     .collect();
//! # let bearings1 = points.clone();
//! # let bearings2: Vec<[f64; 3]> = points.iter().map(|p| [p[0] - 1.0, p[1], p[2]]).collect();
//! let solver: RansacSolver = "NISTER".parse()?;
//! let pose = relative_pose_ransac(&bearings1, &bearings2, solver, 1e-3, 200)?;
//!
//! println!("Rotation: {:?}", pose.rotation);
//! println!("Translation: {:?}", pose.translation);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Bearing vectors and correspondence sets.
pub mod bearing;

/// Eigensolver rotation estimation from a prior.
pub mod eigensolver;

/// Linear eight-point solver.
pub mod eightpt;

/// Essential matrix construction, decomposition and residuals.
pub mod essential;

/// Rotation-only five-point solver.
pub mod fivept_kneip;

/// Five-point essential matrix solver.
pub mod fivept_nister;

/// Levenberg–Marquardt pose refinement.
pub mod refine;

/// Generic RANSAC framework.
///
/// Any type implementing [`ransac::SampleConsensusProblem`] can be estimated robustly.
pub mod ransac;

/// RANSAC problems for relative pose.
pub mod sac_problems;

/// Seven-point essential matrix solver.
pub mod sevenpt;

/// Two-point translation solver.
pub mod twopt;

/// Common data types and error definitions.
pub mod types;

mod ops;
mod polynomial;

#[cfg(test)]
mod testing;

pub use bearing::Correspondences;
pub use eigensolver::{rotation_eigensolver, EigensolverOutput, EigensolverParams};
pub use eightpt::{essential_eightpt, EightPtParams};
pub use essential::{
    algebraic_error, decompose_essential, essential_from_pose, pose_from_essential, sampson_error,
    EpipolarResidual,
};
pub use fivept_kneip::rotation_fivept_kneip;
pub use fivept_nister::essential_fivept_nister;
pub use ransac::{ransac, RansacParams, RansacResult, SampleConsensusProblem};
pub use refine::{refine_relative_pose, LMRefineParams, RefineResult};
pub use sac_problems::{CentralRelativePoseProblem, RansacSolver, TranslationOnlyProblem};
pub use sevenpt::essential_sevenpt;
pub use twopt::translation_twopt;
pub use types::{ErrorKind, NumericTol, Pose, RelPoseError};

use ops::{mat3_from_array, mat3_to_array, vec3_from_array, vec3_to_array};

/// Unit translation direction given the relative rotation (two or more correspondences).
pub fn relative_pose_twopt(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
    rotation_prior: &[[f64; 3]; 3],
) -> Result<[f64; 3], RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    let t = translation_twopt(&corr, &mat3_from_array(rotation_prior))?;
    Ok(vec3_to_array(&t))
}

/// Candidate essential matrices from the five-point Nister solver.
pub fn relative_pose_fivept_nister(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
) -> Result<Vec<[[f64; 3]; 3]>, RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    Ok(essential_fivept_nister(&corr)?.iter().map(mat3_to_array).collect())
}

/// Candidate rotations from the rotation-only five-point solver.
pub fn relative_pose_fivept_kneip(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
) -> Result<Vec<[[f64; 3]; 3]>, RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    let rotations = rotation_fivept_kneip(&corr, &EigensolverParams::default())?;
    Ok(rotations.iter().map(mat3_to_array).collect())
}

/// Candidate essential matrices from the seven-point solver.
pub fn relative_pose_sevenpt(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
) -> Result<Vec<[[f64; 3]; 3]>, RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    Ok(essential_sevenpt(&corr)?.iter().map(mat3_to_array).collect())
}

/// Essential matrix from the eight-point solver.
pub fn relative_pose_eightpt(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
) -> Result<[[f64; 3]; 3], RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    let e = essential_eightpt(&corr, &EightPtParams::default())?;
    Ok(mat3_to_array(&e))
}

/// Rotation refined from `rotation_prior` by the eigensolver.
pub fn relative_pose_eigensolver(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
    rotation_prior: &[[f64; 3]; 3],
) -> Result<[[f64; 3]; 3], RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    let out = rotation_eigensolver(
        &corr,
        &mat3_from_array(rotation_prior),
        &EigensolverParams::default(),
    )?;
    Ok(mat3_to_array(&out.rotation))
}

/// Pose refined from a seed by Levenberg–Marquardt; the translation keeps the seed's norm.
pub fn relative_pose_optimize_nonlinear(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
    seed_translation: &[f64; 3],
    seed_rotation: &[[f64; 3]; 3],
) -> Result<Pose, RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    let res = refine_relative_pose(
        &corr,
        &vec3_from_array(seed_translation),
        &mat3_from_array(seed_rotation),
        &LMRefineParams::default(),
    )?;
    Ok(Pose::new(
        mat3_to_array(&res.rotation),
        vec3_to_array(&res.translation),
    ))
}

/// Robust pose with unit translation, using `solver` inside RANSAC.
pub fn relative_pose_ransac(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
    solver: RansacSolver,
    inlier_threshold: f64,
    max_iterations: usize,
) -> Result<Pose, RelPoseError> {
    let params = RansacParams::default()
        .with_threshold(inlier_threshold)
        .with_max_iterations(max_iterations);
    Ok(relative_pose_ransac_with_params(bearings1, bearings2, solver, &params)?.model)
}

/// Like [`relative_pose_ransac`] with full control over the RANSAC parameters.
pub fn relative_pose_ransac_with_params(
    bearings1: &[[f64; 3]],
    bearings2: &[[f64; 3]],
    solver: RansacSolver,
    params: &RansacParams,
) -> Result<RansacResult<Pose>, RelPoseError> {
    let corr = Correspondences::new(bearings1, bearings2)?;
    let problem = CentralRelativePoseProblem::new(&corr, solver);
    ransac(&problem, params)
}
