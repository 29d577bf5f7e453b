//! Rotation-only five-point solver.
//!
//! Candidate rotations are the zeros of the coplanarity cost `lambda_min(M(R))` used
//! by the eigensolver. They are seeded from both rotations of every five-point
//! essential root and polished on the full correspondence set; translation is not
//! estimated.

use crate::bearing::Correspondences;
use crate::eigensolver::{minimize, EigensolverParams};
use crate::essential::decompose_essential;
use crate::fivept_nister::essential_fivept_nister;
use crate::ops::push_unique;
use crate::types::RelPoseError;
use nalgebra::Matrix3;

/// Minimal number of correspondences.
pub const SAMPLE_SIZE: usize = 5;

/// Candidate relative rotations, returned as bare rotation matrices (at most 20).
///
/// Seeds whose polish does not converge within `params` are dropped.
pub fn rotation_fivept_kneip(
    corr: &Correspondences,
    params: &EigensolverParams,
) -> Result<Vec<Matrix3<f64>>, RelPoseError> {
    corr.require(SAMPLE_SIZE)?;
    let tol = corr.tol();

    let mut out = Vec::new();
    for e in essential_fivept_nister(corr)? {
        let candidates = decompose_essential(&e)?;
        // the four decompositions share two rotations
        for (rotation, _) in [candidates[0], candidates[2]] {
            let polished = minimize(corr, &rotation, params);
            if !polished.converged {
                log::trace!(
                    "kneip: dropping unconverged candidate (cost {:e} after {} iterations)",
                    polished.cost,
                    polished.iterations
                );
                continue;
            }
            push_unique(&mut out, polished.rotation, tol.duplicate);
        }
    }
    Ok(out)
}
