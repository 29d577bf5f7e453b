//! Sample-consensus problems for relative pose estimation.

use crate::bearing::Correspondences;
use crate::eightpt::{essential_eightpt, EightPtParams};
use crate::essential::{pose_from_essential, EpipolarResidual};
use crate::fivept_nister::essential_fivept_nister;
use crate::ops::{
    canonicalize_essential, mat3_from_array, mat3_to_array, vec3_from_array, vec3_to_array,
};
use crate::ransac::SampleConsensusProblem;
use crate::refine::{refine_relative_pose, LMRefineParams};
use crate::sevenpt::essential_sevenpt;
use crate::twopt::translation_twopt;
use crate::types::{Pose, RelPoseError};
use crate::{eightpt, fivept_nister, sevenpt, twopt};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Essential-matrix solvers usable inside RANSAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RansacSolver {
    /// Five-point Nister solver.
    Nister,
    /// Seven-point solver.
    SevenPt,
    /// Eight-point solver.
    EightPt,
}

impl RansacSolver {
    /// Minimal sample size of the solver.
    pub fn sample_size(&self) -> usize {
        match self {
            Self::Nister => fivept_nister::SAMPLE_SIZE,
            Self::SevenPt => sevenpt::SAMPLE_SIZE,
            Self::EightPt => eightpt::SAMPLE_SIZE,
        }
    }

    /// Run the solver on `corr`.
    pub fn solve(
        &self,
        corr: &Correspondences,
        eightpt_params: &EightPtParams,
    ) -> Result<Vec<Matrix3<f64>>, RelPoseError> {
        match self {
            Self::Nister => essential_fivept_nister(corr),
            Self::SevenPt => essential_sevenpt(corr),
            Self::EightPt => essential_eightpt(corr, eightpt_params).map(|e| vec![e]),
        }
    }
}

impl FromStr for RansacSolver {
    type Err = RelPoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NISTER" => Ok(Self::Nister),
            "SEVENPT" => Ok(Self::SevenPt),
            "EIGHTPT" => Ok(Self::EightPt),
            _ => Err(RelPoseError::UnknownSolver(s.to_string())),
        }
    }
}

/// Central relative pose from essential-matrix solvers.
///
/// Hypotheses are poses with unit translation. Every essential candidate of a sample is
/// turned into the decomposition with the most correspondences of the sample in front
/// of both cameras.
#[derive(Debug, Clone)]
pub struct CentralRelativePoseProblem<'a> {
    corr: &'a Correspondences,
    solver: RansacSolver,
    residual: EpipolarResidual,
    eightpt_params: EightPtParams,
    refine_params: Option<LMRefineParams>,
}

impl<'a> CentralRelativePoseProblem<'a> {
    /// Problem over `corr` with the algebraic residual and non-linear refit enabled.
    pub fn new(corr: &'a Correspondences, solver: RansacSolver) -> Self {
        Self {
            corr,
            solver,
            residual: EpipolarResidual::default(),
            eightpt_params: EightPtParams::default(),
            refine_params: Some(LMRefineParams::default()),
        }
    }

    /// Use `residual` to score correspondences.
    pub fn with_residual(mut self, residual: EpipolarResidual) -> Self {
        self.residual = residual;
        self
    }

    /// Parameters of the non-linear refit, `None` keeps the linear refit only.
    pub fn with_refine_params(mut self, refine_params: Option<LMRefineParams>) -> Self {
        self.refine_params = refine_params;
        self
    }

    fn poses_from_essentials(
        essentials: &[Matrix3<f64>],
        corr: &Correspondences,
    ) -> Result<Vec<Pose>, RelPoseError> {
        essentials
            .iter()
            .map(|e| {
                let (r, t) = pose_from_essential(e, corr)?;
                Ok(Pose::new(mat3_to_array(&r), vec3_to_array(&t)))
            })
            .collect()
    }

    fn inlier_cost(&self, pose: &Pose, corr: &Correspondences) -> f64 {
        essential_of(pose).map_or(f64::INFINITY, |e| {
            corr.iter().map(|(b1, b2)| self.residual.evaluate(&e, b1, b2)).sum()
        })
    }
}

fn essential_of(pose: &Pose) -> Option<Matrix3<f64>> {
    canonicalize_essential(&mat3_from_array(&pose.essential()))
}

impl SampleConsensusProblem for CentralRelativePoseProblem<'_> {
    type Model = Pose;

    fn sample_size(&self) -> usize {
        self.solver.sample_size()
    }

    fn num_correspondences(&self) -> usize {
        self.corr.len()
    }

    fn compute_models(&self, sample: &[usize]) -> Result<Vec<Pose>, RelPoseError> {
        let subset = self.corr.subset(sample)?;
        let essentials = self.solver.solve(&subset, &self.eightpt_params)?;
        Self::poses_from_essentials(&essentials, &subset)
    }

    fn residuals(&self, model: &Pose) -> Vec<f64> {
        match essential_of(model) {
            Some(e) => self
                .corr
                .iter()
                .map(|(b1, b2)| self.residual.evaluate(&e, b1, b2))
                .collect(),
            None => vec![f64::INFINITY; self.corr.len()],
        }
    }

    fn refit(&self, model: &Pose, inliers: &[usize]) -> Result<Pose, RelPoseError> {
        let subset = self.corr.subset(inliers)?;
        let solver = if subset.len() >= eightpt::SAMPLE_SIZE {
            RansacSolver::EightPt
        } else {
            self.solver
        };
        let essentials = solver.solve(&subset, &self.eightpt_params)?;
        let linear = Self::poses_from_essentials(&essentials, &subset)?
            .into_iter()
            .min_by(|a, b| {
                self.inlier_cost(a, &subset)
                    .total_cmp(&self.inlier_cost(b, &subset))
            })
            .unwrap_or(*model);

        let Some(refine_params) = &self.refine_params else {
            return Ok(linear);
        };
        let rotation = mat3_from_array(&linear.rotation);
        let translation = vec3_from_array(&linear.translation);
        match refine_relative_pose(&subset, &translation, &rotation, refine_params) {
            Ok(refined) => Ok(Pose::new(
                mat3_to_array(&refined.rotation),
                vec3_to_array(&refined.translation.normalize()),
            )),
            Err(err) => {
                log::warn!("non-linear refit failed, keeping the linear estimate: {err}");
                Ok(linear)
            }
        }
    }
}

/// Translation-only relative pose with a known rotation, using the two-point solver.
#[derive(Debug, Clone)]
pub struct TranslationOnlyProblem<'a> {
    corr: &'a Correspondences,
    rotation: Matrix3<f64>,
}

impl<'a> TranslationOnlyProblem<'a> {
    /// Problem over `corr` with the relative rotation fixed to `rotation`.
    pub fn new(corr: &'a Correspondences, rotation: Matrix3<f64>) -> Self {
        Self { corr, rotation }
    }
}

impl SampleConsensusProblem for TranslationOnlyProblem<'_> {
    type Model = Vector3<f64>;

    fn sample_size(&self) -> usize {
        twopt::SAMPLE_SIZE
    }

    fn num_correspondences(&self) -> usize {
        self.corr.len()
    }

    fn compute_models(&self, sample: &[usize]) -> Result<Vec<Vector3<f64>>, RelPoseError> {
        translation_twopt(&self.corr.subset(sample)?, &self.rotation).map(|t| vec![t])
    }

    fn residuals(&self, model: &Vector3<f64>) -> Vec<f64> {
        let e = model.cross_matrix() * self.rotation;
        self.corr
            .iter()
            .map(|(b1, b2)| EpipolarResidual::Algebraic.evaluate(&e, b1, b2))
            .collect()
    }

    fn refit(&self, _: &Vector3<f64>, inliers: &[usize]) -> Result<Vector3<f64>, RelPoseError> {
        translation_twopt(&self.corr.subset(inliers)?, &self.rotation)
    }
}
