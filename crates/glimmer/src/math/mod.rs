//! # Math: Vectors, Matrices, and Quaternions on Plain Arrays
//!
//! Everything in this module works on fixed-size `f32` arrays: a [`Vec3`] is a
//! `[f32; 3]`, a [`Mat4`] is a flat `[f32; 16]`, a [`Quat`] is `[x, y, z, w]`.
//! Arrays are `Copy`, so "pure" functions return fresh values without any heap
//! allocation. The [`fast`] submodule adds destination-writing variants for the
//! few hot paths (per-frame matrix products) where callers want to reuse
//! storage explicitly.
//!
//! ## Matrix Conventions
//!
//! There are two ways to read a flat 16-float matrix:
//!
//! ```text
//! RowMajor  (row vectors,    v' = v · M)     index(row, col) = row * 4 + col
//! ColumnMajor (column vectors, v' = M · v)   index(row, col) = col * 4 + row
//! ```
//!
//! The two are transposes of each other, which is why the *flat arrays* built
//! by the constructors in [`transform`] are identical under both: translation
//! always lives at indices 12, 13, 14. What differs is the meaning of an
//! explicit product and of rows/columns. The convention is a value or a type
//! parameter (see [`convention`]) rather than a process-wide switch, so two
//! pieces of code can use different conventions side by side.
//!
//! ## Comparison
//!
//! - **glam**: SIMD types, column-major, column vectors. We use it in tests as
//!   an independent reference and offer conversions in [`interop`].
//! - **gl-matrix** / **three.js**: column-major flat arrays, the same layout
//!   our constructors produce.

pub mod convention;
pub mod fast;
pub mod interop;
pub mod matrix;
pub mod quaternion;
pub mod random;
pub mod transform;
pub mod vector;

pub use convention::{ColumnMajor, Convention, MathContext, MatrixConvention, RowMajor};
pub use random::{PseudoRandom, RandomSource};

/// Lengths below this are treated as zero by [`vector::normalize`].
pub const EPSILON: f32 = 1e-5;

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];
pub type Vec4 = [f32; 4];

pub type Mat1 = [f32; 1];
pub type Mat2 = [f32; 4];
pub type Mat3 = [f32; 9];
pub type Mat4 = [f32; 16];

/// Quaternion stored as `[x, y, z, w]`.
pub type Quat = [f32; 4];

/// Degrees to radians.
pub fn deg_to_rad(degrees: f32) -> f32 {
    degrees * std::f32::consts::PI / 180.0
}

/// Radians to degrees.
pub fn rad_to_deg(radians: f32) -> f32 {
    radians * 180.0 / std::f32::consts::PI
}

/// Linear interpolation between two scalars.
pub fn lerp_scalar(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Fold an angle into `[-PI, PI]`.
pub fn mod_clamp_angle(radians: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let wrapped = (radians + std::f32::consts::PI).rem_euclid(two_pi);
    wrapped - std::f32::consts::PI
}

#[cfg(test)]
pub(crate) fn assert_close(a: &[f32], b: &[f32], eps: f32) {
    assert_eq!(a.len(), b.len(), "length mismatch");
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(
            (x - y).abs() <= eps,
            "element {i} differs: {x} vs {y} (eps {eps})\n  left: {a:?}\n right: {b:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_round_trip() {
        let r = deg_to_rad(90.0);
        assert!((r - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((rad_to_deg(r) - 90.0).abs() < 1e-4);
    }

    #[test]
    fn angle_wraps_into_range() {
        let a = mod_clamp_angle(3.0 * std::f32::consts::PI);
        assert!((a.abs() - std::f32::consts::PI).abs() < 1e-4);
        assert!((mod_clamp_angle(0.5) - 0.5).abs() < 1e-6);
    }
}
