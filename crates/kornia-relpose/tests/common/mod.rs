#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub type Mat3 = [[f64; 3]; 3];

pub struct RelativePoseDataset {
    pub bearings1: Vec<[f64; 3]>,
    pub bearings2: Vec<[f64; 3]>,
    pub position: [f64; 3],
    pub rotation: Mat3,
    pub essential: Mat3,
}

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn mat_vec(a: &Mat3, v: &[f64; 3]) -> [f64; 3] {
    [0, 1, 2].map(|i| a[i][0] * v[0] + a[i][1] * v[1] + a[i][2] * v[2])
}

fn transpose(a: &Mat3) -> Mat3 {
    [0, 1, 2].map(|i| [a[0][i], a[1][i], a[2][i]])
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    v.map(|x| x / n)
}

fn rotation_rpy(roll: f64, pitch: f64, yaw: f64) -> Mat3 {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    let r1 = [[1.0, 0.0, 0.0], [0.0, cr, -sr], [0.0, sr, cr]];
    let r2 = [[cp, 0.0, sp], [0.0, 1.0, 0.0], [-sp, 0.0, cp]];
    let r3 = [[cy, -sy, 0.0], [sy, cy, 0.0], [0.0, 0.0, 1.0]];
    mat_mul(&r3, &mat_mul(&r2, &r1))
}

pub fn random_rotation(rng: &mut StdRng, amplitude: f64) -> Mat3 {
    rotation_rpy(
        rng.random_range(-amplitude..amplitude),
        rng.random_range(-amplitude..amplitude),
        rng.random_range(-amplitude..amplitude),
    )
}

fn random_direction(rng: &mut StdRng) -> [f64; 3] {
    loop {
        let v = [0; 3].map(|_| rng.random_range(-1.0..1.0));
        let n2: f64 = v.iter().map(|x| x * x).sum();
        if n2 > 1e-6 && n2 <= 1.0 {
            return normalize(v);
        }
    }
}

/// A point at depth `min..max` around the origin, uniform in direction.
fn shell_point(rng: &mut StdRng, min_depth: f64, max_depth: f64) -> [f64; 3] {
    let p = [0; 3].map(|_| rng.random_range(-1.0..1.0));
    let dir = normalize(p);
    [0, 1, 2].map(|k| (max_depth - min_depth) * p[k] + min_depth * dir[k])
}

fn add_noise(rng: &mut StdRng, level: f64, b: [f64; 3]) -> [f64; 3] {
    normalize(b.map(|v| v + rng.random_range(-level..level)))
}

fn essential_of(position: &[f64; 3], rotation: &Mat3) -> Mat3 {
    let [tx, ty, tz] = *position;
    let skew = [[0.0, -tz, ty], [tz, 0.0, -tx], [-ty, tx, 0.0]];
    mat_mul(&skew, rotation)
}

impl RelativePoseDataset {
    pub fn new(num_points: usize, noise: f64, outlier_fraction: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let position = [0; 3].map(|_| rng.random_range(-2.0..2.0));
        let rotation = random_rotation(&mut rng, 0.5);
        let rt = transpose(&rotation);

        let num_outliers = (outlier_fraction * num_points as f64) as usize;
        let mut bearings1 = Vec::with_capacity(num_points);
        let mut bearings2 = Vec::with_capacity(num_points);
        for i in 0..num_points {
            let depth = rng.random_range(4.0..8.0);
            let dir = random_direction(&mut rng);
            let x1 = dir.map(|d| d * depth);
            let x2 = mat_vec(&rt, &[0, 1, 2].map(|k| x1[k] - position[k]));
            let mut b2 = normalize(x2);
            if noise > 0.0 {
                let d = random_direction(&mut rng);
                b2 = normalize([0, 1, 2].map(|k| b2[k] + noise * d[k]));
            }
            if i < num_outliers {
                b2 = random_direction(&mut rng);
            }
            bearings1.push(dir);
            bearings2.push(b2);
        }

        Self {
            bearings1,
            bearings2,
            position,
            rotation,
            essential: essential_of(&position, &rotation),
        }
    }

    /// Points spread through a shell of depth 4..8, with outliers that are real scene
    /// points seen from view 2 but paired with the wrong view-1 bearing.
    pub fn with_projected_outliers(
        num_points: usize,
        noise: f64,
        outlier_fraction: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let position = [0; 3].map(|_| rng.random_range(-2.0..2.0));
        let rotation = random_rotation(&mut rng, 0.5);
        let rt = transpose(&rotation);
        let view2 =
            |x: [f64; 3]| normalize(mat_vec(&rt, &[0, 1, 2].map(|k| x[k] - position[k])));

        let mut bearings1 = Vec::with_capacity(num_points);
        let mut bearings2 = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            let x = shell_point(&mut rng, 4.0, 8.0);
            let (mut b1, mut b2) = (normalize(x), view2(x));
            if noise > 0.0 {
                b1 = add_noise(&mut rng, noise, b1);
                b2 = add_noise(&mut rng, noise, b2);
            }
            bearings1.push(b1);
            bearings2.push(b2);
        }
        let num_outliers = (outlier_fraction * num_points as f64) as usize;
        for b2 in bearings2.iter_mut().take(num_outliers) {
            *b2 = view2(shell_point(&mut rng, 4.0, 8.0));
        }

        Self {
            bearings1,
            bearings2,
            position,
            rotation,
            essential: essential_of(&position, &rotation),
        }
    }

    /// Ground truth perturbed by a random rotation and translation of the given amplitudes.
    pub fn perturbed_pose(&self, amplitude: f64, seed: u64) -> ([f64; 3], Mat3) {
        let mut rng = StdRng::seed_from_u64(seed);
        let position = self.position.map(|p| p + rng.random_range(-amplitude..amplitude));
        let rotation = mat_mul(&self.rotation, &random_rotation(&mut rng, amplitude));
        (position, rotation)
    }
}

/// `x` equals `y` up to scale and sign.
pub fn proportional(x: &[f64], y: &[f64]) -> bool {
    let nx = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    let ny = y.iter().map(|v| v * v).sum::<f64>().sqrt();
    let close = |sign: f64| {
        x.iter()
            .zip(y)
            .all(|(a, b)| (a / nx - sign * b / ny).abs() <= 1e-3 + 1e-2 * (b / ny).abs())
    };
    close(1.0) || close(-1.0)
}

pub fn flatten(m: &Mat3) -> [f64; 9] {
    [
        m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
    ]
}

pub fn matrix_in_list(m: &Mat3, list: &[Mat3]) -> bool {
    list.iter().any(|c| proportional(&flatten(c), &flatten(m)))
}

/// Same rotation, and translations with the same direction.
pub fn same_transformation(
    position: &[f64; 3],
    rotation: &Mat3,
    t: &[f64; 3],
    r: &Mat3,
) -> bool {
    proportional(&flatten(rotation), &flatten(r)) && proportional(position, t)
}
