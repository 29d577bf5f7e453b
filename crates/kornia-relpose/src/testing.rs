//! Synthetic two-view scenes for unit tests.

use crate::bearing::Correspondences;
use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(crate) struct Scene {
    pub corr: Correspondences,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub outliers: Vec<usize>,
}

fn random_unit(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let n = v.norm();
        if n > 1e-3 && n <= 1.0 {
            return v / n;
        }
    }
}

pub(crate) fn random_rotation(rng: &mut StdRng, max_angle: f64) -> Matrix3<f64> {
    Rotation3::from_euler_angles(
        rng.random_range(-max_angle..max_angle),
        rng.random_range(-max_angle..max_angle),
        rng.random_range(-max_angle..max_angle),
    )
    .into_inner()
}

/// Points at depth 4..8 around camera 1, camera 2 within a 2-unit box.
///
/// `noise` perturbs the view-2 bearings, `outlier_fraction` of them are replaced by
/// random directions.
pub(crate) fn synthetic_scene(
    num_points: usize,
    noise: f64,
    outlier_fraction: f64,
    seed: u64,
) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let translation = Vector3::new(
        rng.random_range(-2.0..2.0),
        rng.random_range(-2.0..2.0),
        rng.random_range(-2.0..2.0),
    );
    let rotation = random_rotation(&mut rng, 0.5);

    let num_outliers = (outlier_fraction * num_points as f64) as usize;
    let mut bearings1 = Vec::with_capacity(num_points);
    let mut bearings2 = Vec::with_capacity(num_points);
    for i in 0..num_points {
        let x1 = random_unit(&mut rng) * rng.random_range(4.0..8.0);
        let x2 = rotation.transpose() * (x1 - translation);
        let mut b2 = x2.normalize();
        if noise > 0.0 {
            b2 = (b2 + random_unit(&mut rng) * noise).normalize();
        }
        if i < num_outliers {
            b2 = random_unit(&mut rng);
        }
        let b1 = x1.normalize();
        bearings1.push([b1.x, b1.y, b1.z]);
        bearings2.push([b2.x, b2.y, b2.z]);
    }

    let corr = Correspondences::new(&bearings1, &bearings2)
        .expect("synthetic bearings are valid");
    Scene {
        corr,
        rotation,
        translation,
        outliers: (0..num_outliers).collect(),
    }
}

/// `a` equals `b` up to scale and sign.
pub(crate) fn proportional<const R: usize, const C: usize>(
    a: &nalgebra::SMatrix<f64, R, C>,
    b: &nalgebra::SMatrix<f64, R, C>,
    tol: f64,
) -> bool {
    let a = a.normalize();
    let b = b.normalize();
    (a - b).amax() < tol || (a + b).amax() < tol
}
