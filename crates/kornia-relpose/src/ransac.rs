//! Generic RANSAC loop over pluggable sample-consensus problems.

use crate::types::RelPoseError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// A model-fitting problem that RANSAC can drive.
///
/// Implementors solve on index samples and score every correspondence; the loop itself
/// never looks at the data.
pub trait SampleConsensusProblem {
    /// Hypothesis type produced by the solver.
    type Model: Clone;

    /// Number of correspondences in a minimal sample.
    fn sample_size(&self) -> usize;

    /// Total number of correspondences.
    fn num_correspondences(&self) -> usize;

    /// Hypotheses consistent with the sample. An error marks a degenerate sample.
    fn compute_models(&self, sample: &[usize]) -> Result<Vec<Self::Model>, RelPoseError>;

    /// Residual of every correspondence under `model`.
    fn residuals(&self, model: &Self::Model) -> Vec<f64>;

    /// Re-estimate `model` from a consensus set larger than a minimal sample.
    fn refit(&self, model: &Self::Model, inliers: &[usize]) -> Result<Self::Model, RelPoseError>;
}

/// Parameters for RANSAC model estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Correspondences with a residual strictly below this value are inliers.
    pub threshold: f64,
    /// Desired probability that at least one sample set is outlier-free.
    pub confidence: f64,
    /// Minimum consensus size; `None` means twice the sample size, capped at the number of
    /// correspondences.
    pub min_inliers: Option<usize>,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
    /// Whether every new best hypothesis is locally optimized by refitting on its consensus.
    pub refine: bool,
    /// Maximum number of refit rounds per local optimization.
    pub local_iterations: usize,
    /// After the first round, refits only use inliers whose residual is within this many
    /// robust standard deviations (`1.4826 * median`).
    pub local_trim: f64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            threshold: 1e-2,
            confidence: 0.99,
            min_inliers: None,
            random_seed: Some(0),
            refine: true,
            local_iterations: 5,
            local_trim: 3.0,
        }
    }
}

impl RansacParams {
    /// Set the inlier threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the minimum consensus size.
    pub fn with_min_inliers(mut self, min_inliers: usize) -> Self {
        self.min_inliers = Some(min_inliers);
        self
    }

    /// Set the RNG seed, `None` draws one from the thread RNG.
    pub fn with_random_seed(mut self, random_seed: Option<u64>) -> Self {
        self.random_seed = random_seed;
        self
    }

    /// Enable or disable local optimization.
    pub fn with_refine(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }

    /// Set the number of refit rounds per local optimization.
    pub fn with_local_iterations(mut self, local_iterations: usize) -> Self {
        self.local_iterations = local_iterations;
        self
    }

    /// Set the trimming factor of the refit support.
    pub fn with_local_trim(mut self, local_trim: f64) -> Self {
        self.local_trim = local_trim;
        self
    }
}

/// Result of a RANSAC model fit.
#[derive(Clone, Debug)]
pub struct RansacResult<M> {
    /// Estimated model.
    pub model: M,
    /// Indices of inlier correspondences, increasing.
    pub inliers: Vec<usize>,
    /// Sum of inlier residuals (lower is better).
    pub score: f64,
    /// Number of sampling iterations run.
    pub iterations: usize,
}

#[derive(Clone)]
struct Consensus {
    inliers: Vec<usize>,
    score: f64,
}

impl Consensus {
    fn evaluate(residuals: &[f64], threshold: f64) -> Self {
        let mut inliers = Vec::new();
        let mut score = 0.0;
        for (i, &r) in residuals.iter().enumerate() {
            if r < threshold {
                inliers.push(i);
                score += r;
            }
        }
        Self { inliers, score }
    }

    fn beats(&self, other: &Consensus) -> bool {
        self.inliers.len() > other.inliers.len()
            || (self.inliers.len() == other.inliers.len() && self.score < other.score)
    }
}

/// Iterations needed to draw an outlier-free sample with probability `confidence`.
pub fn required_iterations(
    inlier_ratio: f64,
    sample_size: usize,
    confidence: f64,
    max_iterations: usize,
) -> usize {
    let ws = inlier_ratio.clamp(0.0, 1.0).powi(sample_size as i32);
    if ws >= 1.0 {
        return 1.min(max_iterations);
    }
    if ws <= f64::EPSILON {
        return max_iterations;
    }
    let log_conf = (1.0 - confidence).max(1e-12).ln();
    let log_denom = (-ws).ln_1p();
    let est = (log_conf / log_denom).ceil();
    if !est.is_finite() || est >= max_iterations as f64 {
        return max_iterations;
    }
    (est as usize).max(1)
}

/// Robustly fit a model with RANSAC.
///
/// - Minimal samples are drawn uniformly without replacement from a seedable RNG.
/// - Degenerate samples are skipped.
/// - The best hypothesis has the most inliers, ties broken by the lower residual sum.
/// - With `params.refine`, every new best hypothesis is locally optimized: it is refit
///   on its whole consensus set, then on trimmed consensus sets, as long as the median
///   residual over the previous consensus does not grow.
/// - Iterations adapt from the best inlier ratio and the desired confidence.
pub fn ransac<P: SampleConsensusProblem>(
    problem: &P,
    params: &RansacParams,
) -> Result<RansacResult<P::Model>, RelPoseError> {
    let n = problem.num_correspondences();
    let sample_size = problem.sample_size();
    if n < sample_size {
        return Err(RelPoseError::InsufficientCorrespondences {
            required: sample_size,
            actual: n,
        });
    }
    let min_inliers = params.min_inliers.unwrap_or((2 * sample_size).min(n));

    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let mut best: Option<(P::Model, Consensus)> = None;
    let mut required = params.max_iterations;
    let mut iterations = 0usize;
    let mut skipped = 0usize;

    while iterations < required {
        iterations += 1;
        let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
        let models = match problem.compute_models(&sample) {
            Ok(models) => models,
            Err(err) => {
                log::trace!("ransac iteration {iterations}: skipping sample {sample:?}: {err}");
                skipped += 1;
                continue;
            }
        };

        for model in models {
            let consensus = Consensus::evaluate(&problem.residuals(&model), params.threshold);
            if let Some((_, current)) = &best {
                if !consensus.beats(current) {
                    continue;
                }
            }
            let (model, consensus) = if params.refine {
                let (refined, refined_consensus) =
                    local_optimization(problem, model.clone(), consensus.clone(), params);
                match &best {
                    Some((_, current)) if !refined_consensus.beats(current) => (model, consensus),
                    _ => (refined, refined_consensus),
                }
            } else {
                (model, consensus)
            };
            let ratio = consensus.inliers.len() as f64 / n as f64;
            required =
                required_iterations(ratio, sample_size, params.confidence, params.max_iterations);
            best = Some((model, consensus));
        }
    }

    let Some((model, consensus)) = best else {
        return Err(RelPoseError::InsufficientConsensus {
            required: min_inliers,
            actual: 0,
        });
    };
    log::debug!(
        "ransac: {} inliers of {n} after {iterations} iterations ({skipped} degenerate samples)",
        consensus.inliers.len()
    );
    if consensus.inliers.len() < min_inliers {
        return Err(RelPoseError::InsufficientConsensus {
            required: min_inliers,
            actual: consensus.inliers.len(),
        });
    }

    Ok(RansacResult {
        model,
        inliers: consensus.inliers,
        score: consensus.score,
        iterations,
    })
}

/// Median-to-sigma factor of a half-normal residual distribution.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Iterated refit of `model` on its consensus set.
///
/// Round 0 uses every inlier; later rounds drop inliers beyond `local_trim` robust
/// standard deviations of the current model, so a contaminated consensus converges
/// to the fit of its clean part. A refit is kept when the median residual over the
/// consensus it was drawn from does not increase. Rounds stop at the first rejected
/// trimmed refit or once the support no longer changes.
fn local_optimization<P: SampleConsensusProblem>(
    problem: &P,
    mut model: P::Model,
    mut consensus: Consensus,
    params: &RansacParams,
) -> (P::Model, Consensus) {
    let sample_size = problem.sample_size();
    let mut residuals = problem.residuals(&model);
    let mut support: Vec<usize> = Vec::new();

    for round in 0..params.local_iterations {
        if consensus.inliers.len() <= sample_size {
            break;
        }
        let next = if round == 0 {
            consensus.inliers.clone()
        } else {
            trimmed_support(&residuals, &consensus.inliers, params.local_trim, sample_size)
        };
        if next == support {
            break;
        }
        support = next;

        let refit = match problem.refit(&model, &support) {
            Ok(refit) => refit,
            Err(err) => {
                log::debug!("ransac: refit on {} inliers failed: {err}", support.len());
                break;
            }
        };
        let refit_residuals = problem.residuals(&refit);
        let refit_consensus = Consensus::evaluate(&refit_residuals, params.threshold);
        let old_median = median_residual(&residuals, &consensus.inliers);
        let new_median = median_residual(&refit_residuals, &consensus.inliers);
        if new_median > old_median || refit_consensus.inliers.len() <= sample_size {
            log::debug!(
                "ransac: refit round {round} rejected ({} inliers, median {new_median:e} vs \
                 {old_median:e})",
                refit_consensus.inliers.len()
            );
            if round == 0 {
                // the whole consensus may hold a within-threshold outlier, try trimming
                continue;
            }
            break;
        }
        log::debug!(
            "ransac: refit round {round} accepted ({} -> {} inliers, median {new_median:e})",
            consensus.inliers.len(),
            refit_consensus.inliers.len()
        );
        model = refit;
        consensus = refit_consensus;
        residuals = refit_residuals;
    }
    (model, consensus)
}

/// Inliers within `trim` robust standard deviations; the whole set when too few remain.
fn trimmed_support(
    residuals: &[f64],
    inliers: &[usize],
    trim: f64,
    sample_size: usize,
) -> Vec<usize> {
    let cutoff = trim * MAD_TO_SIGMA * median_residual(residuals, inliers);
    let support: Vec<usize> = inliers
        .iter()
        .copied()
        .filter(|&i| residuals[i] <= cutoff)
        .collect();
    if support.len() > sample_size {
        support
    } else {
        inliers.to_vec()
    }
}

fn median_residual(residuals: &[f64], inliers: &[usize]) -> f64 {
    let mut values: Vec<f64> = inliers.iter().map(|&i| residuals[i]).collect();
    if values.is_empty() {
        return f64::INFINITY;
    }
    values.sort_by(f64::total_cmp);
    values[values.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fit `y = a x` through the origin from single points.
    struct LineProblem {
        points: Vec<(f64, f64)>,
    }

    impl SampleConsensusProblem for LineProblem {
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn num_correspondences(&self) -> usize {
            self.points.len()
        }

        fn compute_models(&self, sample: &[usize]) -> Result<Vec<f64>, RelPoseError> {
            let (x, y) = self.points[sample[0]];
            if x.abs() < 1e-12 {
                return Err(RelPoseError::DegenerateConfiguration("x = 0".into()));
            }
            Ok(vec![y / x])
        }

        fn residuals(&self, a: &f64) -> Vec<f64> {
            self.points.iter().map(|(x, y)| (y - a * x).abs()).collect()
        }

        fn refit(&self, _: &f64, inliers: &[usize]) -> Result<f64, RelPoseError> {
            let (sxy, sxx) = inliers.iter().fold((0.0, 0.0), |(sxy, sxx), &i| {
                let (x, y) = self.points[i];
                (sxy + x * y, sxx + x * x)
            });
            Ok(sxy / sxx)
        }
    }

    fn line_with_outliers() -> LineProblem {
        let mut points: Vec<(f64, f64)> = (1..=20).map(|i| (i as f64, 2.0 * i as f64)).collect();
        points.extend((1..=5).map(|i| (i as f64, -7.0 * i as f64 + 3.0)));
        points.push((0.0, 1.0));
        LineProblem { points }
    }

    #[test]
    fn test_ransac_finds_line() -> Result<(), RelPoseError> {
        let problem = line_with_outliers();
        let res = ransac(&problem, &RansacParams::default().with_threshold(1e-6))?;
        assert!((res.model - 2.0).abs() < 1e-12);
        assert_eq!(res.inliers, (0..20).collect::<Vec<_>>());
        assert!(res.iterations < RansacParams::default().max_iterations);
        Ok(())
    }

    #[test]
    fn test_ransac_is_deterministic_for_fixed_seed() -> Result<(), RelPoseError> {
        let problem = line_with_outliers();
        let params = RansacParams::default()
            .with_threshold(1e-6)
            .with_random_seed(Some(42))
            .with_refine(false);
        let a = ransac(&problem, &params)?;
        let b = ransac(&problem, &params)?;
        assert_eq!(a.model, b.model);
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.iterations, b.iterations);
        Ok(())
    }

    #[test]
    fn test_ransac_insufficient_consensus() {
        let problem = line_with_outliers();
        let params = RansacParams::default().with_threshold(1e-6).with_min_inliers(21);
        assert_eq!(
            ransac(&problem, &params).unwrap_err(),
            RelPoseError::InsufficientConsensus {
                required: 21,
                actual: 20
            }
        );
    }

    #[test]
    fn test_ransac_all_samples_degenerate() {
        let problem = LineProblem {
            points: vec![(0.0, 1.0); 4],
        };
        let params = RansacParams::default().with_max_iterations(10);
        assert!(matches!(
            ransac(&problem, &params),
            Err(RelPoseError::InsufficientConsensus { actual: 0, .. })
        ));
    }

    /// Every sample yields the same fixed slopes, in the given order.
    struct FixedSlopes {
        line: LineProblem,
        slopes: Vec<f64>,
    }

    impl SampleConsensusProblem for FixedSlopes {
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn num_correspondences(&self) -> usize {
            self.line.points.len()
        }

        fn compute_models(&self, _: &[usize]) -> Result<Vec<f64>, RelPoseError> {
            Ok(self.slopes.clone())
        }

        fn residuals(&self, a: &f64) -> Vec<f64> {
            self.line.residuals(a)
        }

        fn refit(&self, model: &f64, inliers: &[usize]) -> Result<f64, RelPoseError> {
            self.line.refit(model, inliers)
        }
    }

    fn exact_line(n: usize) -> LineProblem {
        LineProblem {
            points: (1..=n).map(|i| (i as f64, 2.0 * i as f64)).collect(),
        }
    }

    #[test]
    fn test_consensus_ties_prefer_lower_residual_sum() {
        let a = Consensus::evaluate(&[0.0, 0.1, 0.2, 5.0], 1.0);
        let b = Consensus::evaluate(&[0.3, 0.0, 0.4, 5.0], 1.0);
        assert_eq!(a.inliers, b.inliers);
        assert!(a.beats(&b));
        assert!(!b.beats(&a));
        assert!(!a.beats(&a));

        let more = Consensus::evaluate(&[0.9, 0.9, 0.9, 0.9], 1.0);
        assert!(more.beats(&a));
    }

    #[test]
    fn test_ransac_ties_keep_lower_residual_sum() -> Result<(), RelPoseError> {
        // both slopes keep all ten points under the threshold
        let params = RansacParams::default().with_threshold(0.1).with_refine(false);
        for slopes in [vec![2.001, 2.0], vec![2.0, 2.001]] {
            let problem = FixedSlopes {
                line: exact_line(10),
                slopes,
            };
            let res = ransac(&problem, &params)?;
            assert_eq!(res.inliers.len(), 10);
            assert_eq!(res.model, 2.0);
            assert_eq!(res.score, 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_local_optimization_drops_admitted_outlier() -> Result<(), RelPoseError> {
        // a slightly wrong slope admits the outlier at x = 20, the exact one does not
        let mut line = exact_line(20);
        line.points.push((20.0, 40.15));
        let problem = FixedSlopes {
            line,
            slopes: vec![2.004],
        };
        let params = RansacParams::default().with_threshold(0.1);

        let plain = ransac(&problem, &params.clone().with_refine(false))?;
        assert_eq!(plain.model, 2.004);
        assert_eq!(plain.inliers.len(), 21);

        let res = ransac(&problem, &params)?;
        assert!((res.model - 2.0).abs() < 1e-12);
        assert_eq!(res.inliers, (0..20).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_trimmed_support() {
        let residuals = [0.0, 1e-3, 2e-3, 1e-3, 0.5, 2.0];
        let inliers = [0, 1, 2, 3, 4];
        // median 1e-3, cutoff about 4.4e-3
        assert_eq!(trimmed_support(&residuals, &inliers, 3.0, 1), vec![0, 1, 2, 3]);
        // too few left over: keep the whole consensus
        assert_eq!(trimmed_support(&residuals, &inliers, 3.0, 4), inliers.to_vec());
    }

    #[test]
    fn test_default_min_inliers_is_capped_by_set_size() -> Result<(), RelPoseError> {
        // a single clean point: twice the sample size would exceed the set
        let problem = exact_line(1);
        let res = ransac(&problem, &RansacParams::default().with_threshold(1e-6))?;
        assert_eq!(res.inliers, vec![0]);

        let params = RansacParams::default().with_threshold(1e-6).with_min_inliers(2);
        assert!(matches!(
            ransac(&problem, &params),
            Err(RelPoseError::InsufficientConsensus {
                required: 2,
                actual: 1
            })
        ));
        Ok(())
    }

    #[test]
    fn test_required_iterations() {
        // 50% inliers, sample of 5, 99% confidence
        assert_eq!(required_iterations(0.5, 5, 0.99, 10_000), 146);
        assert_eq!(required_iterations(1.0, 5, 0.99, 10_000), 1);
        assert_eq!(required_iterations(0.0, 5, 0.99, 500), 500);
        assert_eq!(required_iterations(0.1, 8, 0.99, 500), 500);
    }
}
