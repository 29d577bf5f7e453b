use argh::FromArgs;
use kornia_relpose as krp;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Estimates the relative pose of a synthetic two-view scene with RANSAC
#[derive(Debug, FromArgs)]
struct Args {
    /// solver used inside RANSAC: NISTER, SEVENPT or EIGHTPT
    #[argh(option, short = 's', default = "krp::RansacSolver::Nister")]
    solver: krp::RansacSolver,

    /// number of correspondences
    #[argh(option, short = 'n', default = "200")]
    num_points: usize,

    /// fraction of correspondences replaced by random bearings
    #[argh(option, short = 'o', default = "0.3")]
    outlier_fraction: f64,

    /// bearing noise amplitude
    #[argh(option, default = "0.0")]
    noise: f64,

    /// inlier threshold on the algebraic epipolar residual
    #[argh(option, short = 't', default = "0.01")]
    threshold: f64,

    /// maximum number of RANSAC iterations
    #[argh(option, short = 'i', default = "1000")]
    max_iterations: usize,

    /// random seed for the scene
    #[argh(option, default = "0")]
    seed: u64,
}

fn random_unit(rng: &mut StdRng) -> [f64; 3] {
    loop {
        let v: [f64; 3] = [0; 3].map(|_| rng.random_range(-1.0..1.0));
        let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        if n > 1e-3 && n <= 1.0 {
            return v.map(|x| x / n);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();
    let mut rng = StdRng::seed_from_u64(args.seed);

    // Ground-truth pose: R = Rz * Ry * Rx
    let yaw = 12.0_f64.to_radians();
    let pitch = -8.0_f64.to_radians();
    let roll = 5.0_f64.to_radians();
    let (cy, sy) = (yaw.cos(), yaw.sin());
    let (cp, sp) = (pitch.cos(), pitch.sin());
    let (cr, sr) = (roll.cos(), roll.sin());
    let gt_r = [
        [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
        [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
        [-sp, cp * sr, cp * cr],
    ];
    let gt_t = [1.0, -0.3, 0.4];

    let num_outliers = (args.outlier_fraction.clamp(0.0, 1.0) * args.num_points as f64) as usize;
    let mut bearings1 = Vec::with_capacity(args.num_points);
    let mut bearings2 = Vec::with_capacity(args.num_points);
    for i in 0..args.num_points {
        let dir = random_unit(&mut rng);
        let depth = rng.random_range(4.0..8.0);
        let d = [0, 1, 2].map(|k| dir[k] * depth - gt_t[k]);
        // X2 = R^T (X1 - t)
        let mut b2 = [0, 1, 2].map(|k| gt_r[0][k] * d[0] + gt_r[1][k] * d[1] + gt_r[2][k] * d[2]);
        if args.noise > 0.0 {
            let e = random_unit(&mut rng);
            b2 = [0, 1, 2].map(|k| b2[k] + args.noise * e[k] * depth);
        }
        if i < num_outliers {
            b2 = random_unit(&mut rng);
        }
        bearings1.push(dir);
        bearings2.push(b2);
    }
    log::info!(
        "scene: {} correspondences, {} outliers, noise {}",
        args.num_points,
        num_outliers,
        args.noise
    );

    let params = krp::RansacParams::default()
        .with_threshold(args.threshold)
        .with_max_iterations(args.max_iterations);
    let res = krp::relative_pose_ransac_with_params(&bearings1, &bearings2, args.solver, &params)?;

    let r = res.model.rotation;
    let t = res.model.translation;
    // angle of R_gt^T R
    let trace: f64 = (0..3)
        .map(|i| (0..3).map(|k| gt_r[k][i] * r[k][i]).sum::<f64>())
        .sum();
    let rot_err = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos().to_degrees();
    let gt_norm = gt_t.iter().map(|v| v * v).sum::<f64>().sqrt();
    let cos_t: f64 = (0..3).map(|k| t[k] * gt_t[k] / gt_norm).sum();
    let trans_err = cos_t.clamp(-1.0, 1.0).acos().to_degrees();

    println!("Solver: {:?}", args.solver);
    println!(
        "Inliers: {}/{} after {} iterations",
        res.inliers.len(),
        args.num_points,
        res.iterations
    );
    println!("Rotation: {:?}", r);
    println!("Translation direction: {:?}", t);
    println!("Rotation error: {rot_err:.6} deg, translation direction error: {trans_err:.6} deg");

    Ok(())
}
