//! Square matrices from 1x1 to 4x4: identity, transpose, determinant, inverse.
//!
//! Determinants and inverses use closed-form cofactor expansion; there is no
//! general LU decomposition. None of these functions depend on the storage
//! convention: `det(Mᵀ) = det(M)` and `inverse(Mᵀ) = inverse(M)ᵀ`, so reading
//! the flat array as rows or as columns gives the same flat answer.
//!
//! ## Singular Matrices
//!
//! `inverse*` divide by the determinant unconditionally. A singular input
//! produces infinities or NaN rather than an error, which keeps the functions
//! branch-free for the per-frame camera math that calls them. Use
//! [`try_inverse4`] where a singular matrix is a real possibility.

use super::{Mat1, Mat2, Mat3, Mat4};

/// Determinants smaller than this make [`try_inverse4`] give up.
pub const SINGULAR_THRESHOLD: f32 = 1e-12;

pub fn identity1() -> Mat1 {
    [1.0]
}

pub fn identity2() -> Mat2 {
    [1.0, 0.0, 0.0, 1.0]
}

pub fn identity3() -> Mat3 {
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
}

pub fn identity4() -> Mat4 {
    [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Transpose of a flat `n × n` matrix.
fn transpose_n<const L: usize>(n: usize, m: [f32; L]) -> [f32; L] {
    std::array::from_fn(|i| {
        let (r, c) = (i / n, i % n);
        m[c * n + r]
    })
}

pub fn transpose2(m: Mat2) -> Mat2 {
    transpose_n(2, m)
}

pub fn transpose3(m: Mat3) -> Mat3 {
    transpose_n(3, m)
}

pub fn transpose4(m: Mat4) -> Mat4 {
    transpose_n(4, m)
}

pub fn trace4(m: Mat4) -> f32 {
    m[0] + m[5] + m[10] + m[15]
}

pub fn add_matrix<const L: usize>(a: [f32; L], b: [f32; L]) -> [f32; L] {
    std::array::from_fn(|i| a[i] + b[i])
}

pub fn sub_matrix<const L: usize>(a: [f32; L], b: [f32; L]) -> [f32; L] {
    std::array::from_fn(|i| a[i] - b[i])
}

pub fn mul_scalar_matrix<const L: usize>(k: f32, m: [f32; L]) -> [f32; L] {
    m.map(|x| x * k)
}

// ── Determinants ────────────────────────────────────────────────────────────

pub fn det1(m: Mat1) -> f32 {
    m[0]
}

pub fn det2(m: Mat2) -> f32 {
    m[0] * m[3] - m[1] * m[2]
}

pub fn det3(m: Mat3) -> f32 {
    m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
        + m[2] * (m[3] * m[7] - m[4] * m[6])
}

/// The 2x2 sub-determinants of the top two and bottom two rows, shared by
/// [`det4`] and [`inverse4`].
struct Minors4 {
    s: [f32; 6],
    c: [f32; 6],
}

fn minors4(m: &Mat4) -> Minors4 {
    let a = |r: usize, c: usize| m[r * 4 + c];
    Minors4 {
        s: [
            a(0, 0) * a(1, 1) - a(1, 0) * a(0, 1),
            a(0, 0) * a(1, 2) - a(1, 0) * a(0, 2),
            a(0, 0) * a(1, 3) - a(1, 0) * a(0, 3),
            a(0, 1) * a(1, 2) - a(1, 1) * a(0, 2),
            a(0, 1) * a(1, 3) - a(1, 1) * a(0, 3),
            a(0, 2) * a(1, 3) - a(1, 2) * a(0, 3),
        ],
        c: [
            a(2, 0) * a(3, 1) - a(3, 0) * a(2, 1),
            a(2, 0) * a(3, 2) - a(3, 0) * a(2, 2),
            a(2, 0) * a(3, 3) - a(3, 0) * a(2, 3),
            a(2, 1) * a(3, 2) - a(3, 1) * a(2, 2),
            a(2, 1) * a(3, 3) - a(3, 1) * a(2, 3),
            a(2, 2) * a(3, 3) - a(3, 2) * a(2, 3),
        ],
    }
}

impl Minors4 {
    fn det(&self) -> f32 {
        let (s, c) = (&self.s, &self.c);
        s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1] + s[5] * c[0]
    }
}

pub fn det4(m: Mat4) -> f32 {
    minors4(&m).det()
}

// ── Inverses ────────────────────────────────────────────────────────────────

pub fn inverse1(m: Mat1) -> Mat1 {
    [1.0 / m[0]]
}

pub fn inverse2(m: Mat2) -> Mat2 {
    let d = 1.0 / det2(m);
    [m[3] * d, -m[1] * d, -m[2] * d, m[0] * d]
}

pub fn inverse3(m: Mat3) -> Mat3 {
    let c00 = m[4] * m[8] - m[5] * m[7];
    let c01 = m[5] * m[6] - m[3] * m[8];
    let c02 = m[3] * m[7] - m[4] * m[6];
    let d = 1.0 / (m[0] * c00 + m[1] * c01 + m[2] * c02);
    [
        c00 * d,
        (m[2] * m[7] - m[1] * m[8]) * d,
        (m[1] * m[5] - m[2] * m[4]) * d,
        c01 * d,
        (m[0] * m[8] - m[2] * m[6]) * d,
        (m[2] * m[3] - m[0] * m[5]) * d,
        c02 * d,
        (m[1] * m[6] - m[0] * m[7]) * d,
        (m[0] * m[4] - m[1] * m[3]) * d,
    ]
}

pub fn inverse4(m: Mat4) -> Mat4 {
    let minors = minors4(&m);
    adjugate4(&m, &minors, 1.0 / minors.det())
}

/// Like [`inverse4`] but returns `None` for (near-)singular input.
pub fn try_inverse4(m: Mat4) -> Option<Mat4> {
    let minors = minors4(&m);
    let det = minors.det();
    if det.abs() < SINGULAR_THRESHOLD || !det.is_finite() {
        return None;
    }
    Some(adjugate4(&m, &minors, 1.0 / det))
}

fn adjugate4(m: &Mat4, minors: &Minors4, inv_det: f32) -> Mat4 {
    let a = |r: usize, c: usize| m[r * 4 + c];
    let (s, c) = (&minors.s, &minors.c);
    let b = [
        a(1, 1) * c[5] - a(1, 2) * c[4] + a(1, 3) * c[3],
        -a(0, 1) * c[5] + a(0, 2) * c[4] - a(0, 3) * c[3],
        a(3, 1) * s[5] - a(3, 2) * s[4] + a(3, 3) * s[3],
        -a(2, 1) * s[5] + a(2, 2) * s[4] - a(2, 3) * s[3],
        -a(1, 0) * c[5] + a(1, 2) * c[2] - a(1, 3) * c[1],
        a(0, 0) * c[5] - a(0, 2) * c[2] + a(0, 3) * c[1],
        -a(3, 0) * s[5] + a(3, 2) * s[2] - a(3, 3) * s[1],
        a(2, 0) * s[5] - a(2, 2) * s[2] + a(2, 3) * s[1],
        a(1, 0) * c[4] - a(1, 1) * c[2] + a(1, 3) * c[0],
        -a(0, 0) * c[4] + a(0, 1) * c[2] - a(0, 3) * c[0],
        a(3, 0) * s[4] - a(3, 1) * s[2] + a(3, 3) * s[0],
        -a(2, 0) * s[4] + a(2, 1) * s[2] - a(2, 3) * s[0],
        -a(1, 0) * c[3] + a(1, 1) * c[1] - a(1, 2) * c[0],
        a(0, 0) * c[3] - a(0, 1) * c[1] + a(0, 2) * c[0],
        -a(3, 0) * s[3] + a(3, 1) * s[1] - a(3, 2) * s[0],
        a(2, 0) * s[3] - a(2, 1) * s[1] + a(2, 2) * s[0],
    ];
    b.map(|x| x * inv_det)
}

/// Upper-left 3x3 block of a 4x4 matrix.
pub fn upper3(m: Mat4) -> Mat3 {
    [m[0], m[1], m[2], m[4], m[5], m[6], m[8], m[9], m[10]]
}

/// Embed a 3x3 matrix in the upper-left of a 4x4 identity.
pub fn expand3(m: Mat3) -> Mat4 {
    [
        m[0], m[1], m[2], 0.0, //
        m[3], m[4], m[5], 0.0, //
        m[6], m[7], m[8], 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::assert_close;
    use crate::math::convention::{RowMajor, mul4};

    fn sample4() -> Mat4 {
        [
            2.0, 0.5, -1.0, 0.0, //
            1.0, 3.0, 0.25, 0.0, //
            0.0, -2.0, 1.5, 0.0, //
            4.0, 1.0, -3.0, 1.0,
        ]
    }

    #[test]
    fn inverse4_times_matrix_is_identity() {
        let samples = [
            sample4(),
            [
                1.0, 2.0, 3.0, 4.0, //
                0.0, 1.0, 4.0, 2.0, //
                5.0, 6.0, 0.0, 1.0, //
                1.0, 0.0, 1.0, 3.0,
            ],
            crate::math::transform::perspective(1.0, 1.5, 0.1, 100.0),
        ];
        for m in samples {
            assert!(det4(m).abs() > 1e-6);
            let product = mul4::<RowMajor>(m, inverse4(m));
            assert_close(&product, &identity4(), 1e-5);
        }
    }

    #[test]
    fn inverse_matches_glam() {
        let m = sample4();
        let ours = inverse4(m);
        let theirs = glam::Mat4::from_cols_array(&m).inverse().to_cols_array();
        assert_close(&ours, &theirs, 1e-5);
        assert!((det4(m) - glam::Mat4::from_cols_array(&m).determinant()).abs() < 1e-4);
    }

    #[test]
    fn small_inverses() {
        assert_eq!(inverse1([4.0]), [0.25]);
        let m2 = [4.0, 7.0, 2.0, 6.0];
        let p2 = crate::math::convention::mul2::<RowMajor>(m2, inverse2(m2));
        assert_close(&p2, &identity2(), 1e-6);

        let m3 = [2.0, 0.0, 1.0, 1.0, 3.0, 2.0, 1.0, 1.0, 2.0];
        assert!((det3(m3) - 6.0).abs() < 1e-6);
        let p3 = crate::math::convention::mul3::<RowMajor>(m3, inverse3(m3));
        assert_close(&p3, &identity3(), 1e-5);
    }

    #[test]
    fn singular_inverse_is_not_finite() {
        let singular = [
            1.0, 2.0, 3.0, 4.0, //
            2.0, 4.0, 6.0, 8.0, //
            0.0, 1.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, 0.0,
        ];
        assert_eq!(det4(singular), 0.0);
        assert!(inverse4(singular).iter().any(|x| !x.is_finite()));
        assert!(try_inverse4(singular).is_none());
        assert!(try_inverse4(sample4()).is_some());
    }

    #[test]
    fn tiny_determinant_is_treated_as_singular() {
        let tiny = [
            1e-4, 0.0, 0.0, 0.0, //
            0.0, 1e-4, 0.0, 0.0, //
            0.0, 0.0, 1e-4, 0.0, //
            0.0, 0.0, 0.0, 0.1,
        ];
        assert!(det4(tiny).abs() < SINGULAR_THRESHOLD);
        assert!(inverse4(tiny).iter().all(|x| x.is_finite()));
        assert!(try_inverse4(tiny).is_none());

        let small = scaled_identity(1e-2);
        assert!(det4(small).abs() > SINGULAR_THRESHOLD);
        assert_close(&try_inverse4(small).unwrap(), &scaled_identity(1e2), 1e-2);
    }

    fn scaled_identity(k: f32) -> Mat4 {
        let mut m = identity4();
        for i in 0..4 {
            m[i * 5] = k;
        }
        m
    }

    #[test]
    fn transpose_is_an_involution() {
        let m = sample4();
        assert_eq!(transpose4(transpose4(m)), m);
        assert_eq!(transpose2([1.0, 2.0, 3.0, 4.0]), [1.0, 3.0, 2.0, 4.0]);
        assert_eq!(upper3(expand3(identity3())), identity3());
    }
}
