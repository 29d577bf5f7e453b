//! Polynomial helpers for the polynomial relative pose solvers.

use nalgebra::{DMatrix, Schur};
use std::ops::{Add, Mul, Sub};

/// Number of monomials of degree at most 3 in `(x, y, z)`.
pub(crate) const NUM_MONOMIALS: usize = 20;

/// Exponents `(x, y, z)` of each coefficient slot: the ten cubic terms
/// `x^3, x^2y, x^2z, xy^2, xyz, xz^2, y^3, y^2z, yz^2, z^3`, then
/// `x^2, xy, xz, y^2, yz, z^2`, then `x, y, z, 1`.
const EXPONENTS: [(u8, u8, u8); NUM_MONOMIALS] = [
    (3, 0, 0),
    (2, 1, 0),
    (2, 0, 1),
    (1, 2, 0),
    (1, 1, 1),
    (1, 0, 2),
    (0, 3, 0),
    (0, 2, 1),
    (0, 1, 2),
    (0, 0, 3),
    (2, 0, 0),
    (1, 1, 0),
    (1, 0, 1),
    (0, 2, 0),
    (0, 1, 1),
    (0, 0, 2),
    (1, 0, 0),
    (0, 1, 0),
    (0, 0, 1),
    (0, 0, 0),
];

const NONE: u8 = u8::MAX;

const fn build_index() -> [[[u8; 4]; 4]; 4] {
    let mut table = [[[NONE; 4]; 4]; 4];
    let mut k = 0;
    while k < NUM_MONOMIALS {
        let (a, b, c) = EXPONENTS[k];
        table[a as usize][b as usize][c as usize] = k as u8;
        k += 1;
    }
    table
}

const INDEX: [[[u8; 4]; 4]; 4] = build_index();

/// Polynomial of total degree at most 3 in `(x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Poly3(pub [f64; NUM_MONOMIALS]);

impl Poly3 {
    pub(crate) fn zero() -> Self {
        Self([0.0; NUM_MONOMIALS])
    }

    /// `a x + b y + c z + d`.
    pub(crate) fn linear(a: f64, b: f64, c: f64, d: f64) -> Self {
        let mut p = Self::zero();
        p.0[16] = a;
        p.0[17] = b;
        p.0[18] = c;
        p.0[19] = d;
        p
    }
}

impl Add for Poly3 {
    type Output = Poly3;

    fn add(mut self, rhs: Poly3) -> Poly3 {
        self.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a += b);
        self
    }
}

impl Sub for Poly3 {
    type Output = Poly3;

    fn sub(mut self, rhs: Poly3) -> Poly3 {
        self.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a -= b);
        self
    }
}

impl Mul<f64> for Poly3 {
    type Output = Poly3;

    fn mul(mut self, rhs: f64) -> Poly3 {
        self.0.iter_mut().for_each(|a| *a *= rhs);
        self
    }
}

impl Mul for Poly3 {
    type Output = Poly3;

    /// Product of two polynomials; terms above degree 3 are dropped.
    fn mul(self, rhs: Poly3) -> Poly3 {
        let mut out = Poly3::zero();
        for (i, &a) in self.0.iter().enumerate() {
            if a == 0.0 {
                continue;
            }
            let (ax, ay, az) = EXPONENTS[i];
            for (j, &b) in rhs.0.iter().enumerate() {
                if b == 0.0 {
                    continue;
                }
                let (bx, by, bz) = EXPONENTS[j];
                let (x, y, z) = ((ax + bx) as usize, (ay + by) as usize, (az + bz) as usize);
                if x + y + z > 3 {
                    debug_assert!(false, "product exceeds degree 3");
                    continue;
                }
                out.0[INDEX[x][y][z] as usize] += a * b;
            }
        }
        out
    }
}

/// Real roots of `c[0] + c[1] x + ... + c[d] x^d`.
///
/// Leading coefficients below `f64::EPSILON` times the largest one are dropped. Roots
/// come from the eigenvalues of the companion matrix; an eigenvalue is kept when its
/// imaginary part is at most `imag_tol * (1 + |re|)`.
pub(crate) fn real_roots(coeffs: &[f64], imag_tol: f64) -> Vec<f64> {
    let scale = coeffs.iter().fold(0.0f64, |m, c| m.max(c.abs()));
    if scale == 0.0 {
        return Vec::new();
    }
    let degree = match coeffs.iter().rposition(|c| c.abs() > f64::EPSILON * scale) {
        Some(d) => d,
        None => return Vec::new(),
    };
    match degree {
        0 => Vec::new(),
        1 => vec![-coeffs[0] / coeffs[1]],
        _ => {
            let lead = coeffs[degree];
            let mut companion = DMatrix::<f64>::zeros(degree, degree);
            for i in 1..degree {
                companion[(i, i - 1)] = 1.0;
            }
            for i in 0..degree {
                companion[(i, degree - 1)] = -coeffs[i] / lead;
            }
            let Some(schur) = Schur::try_new(companion, f64::EPSILON, 1000) else {
                return Vec::new();
            };
            schur
                .complex_eigenvalues()
                .iter()
                .filter(|ev| ev.im.abs() <= imag_tol * (1.0 + ev.re.abs()))
                .map(|ev| ev.re)
                .collect()
        }
    }
}
