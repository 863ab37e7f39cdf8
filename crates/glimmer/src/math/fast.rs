//! Destination-writing variants of the hot-path math.
//!
//! These write into caller-owned storage instead of returning a new array.
//! Per-frame code (camera updates, the particle draw) keeps its matrices in
//! long-lived structs and updates them in place through these helpers.
//! Matrix products here use the row-major reading: `dst = a · b` with
//! `index(row, col) = row * 4 + col`.

use super::matrix;
use super::{Mat4, Vec3};

pub fn mat4_mul(dst: &mut Mat4, a: &Mat4, b: &Mat4) {
    for r in 0..4 {
        for c in 0..4 {
            dst[r * 4 + c] = a[r * 4] * b[c]
                + a[r * 4 + 1] * b[4 + c]
                + a[r * 4 + 2] * b[8 + c]
                + a[r * 4 + 3] * b[12 + c];
        }
    }
}

pub fn mat4_inverse(dst: &mut Mat4, m: &Mat4) {
    *dst = matrix::inverse4(*m);
}

pub fn mat4_transpose(dst: &mut Mat4, m: &Mat4) {
    for r in 0..4 {
        for c in 0..4 {
            dst[r * 4 + c] = m[c * 4 + r];
        }
    }
}

pub fn mat4_copy(dst: &mut Mat4, m: &Mat4) {
    dst.copy_from_slice(m);
}

pub fn mat4_identity(dst: &mut Mat4) {
    *dst = matrix::identity4();
}

pub fn add_into<const N: usize>(dst: &mut [f32; N], a: &[f32; N], b: &[f32; N]) {
    for i in 0..N {
        dst[i] = a[i] + b[i];
    }
}

pub fn sub_into<const N: usize>(dst: &mut [f32; N], a: &[f32; N], b: &[f32; N]) {
    for i in 0..N {
        dst[i] = a[i] - b[i];
    }
}

pub fn mul_scalar_into<const N: usize>(dst: &mut [f32; N], a: &[f32; N], k: f32) {
    for i in 0..N {
        dst[i] = a[i] * k;
    }
}

pub fn normalize_into<const N: usize>(dst: &mut [f32; N], a: &[f32; N]) {
    *dst = super::vector::normalize(*a);
}

pub fn cross_into(dst: &mut Vec3, a: &Vec3, b: &Vec3) {
    *dst = super::vector::cross(*a, *b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::assert_close;
    use crate::math::convention::{RowMajor, mul4};
    use crate::math::transform::{look_at, perspective, rotation_x};

    #[test]
    fn fast_mul_matches_pure_mul() {
        let a = perspective(1.0, 1.3, 0.1, 10.0);
        let b = look_at([1.0, 2.0, 3.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let mut dst = [0.0; 16];
        mat4_mul(&mut dst, &b, &a);
        assert_close(&dst, &mul4::<RowMajor>(b, a), 1e-6);
    }

    #[test]
    fn fast_transpose_and_inverse() {
        let m = rotation_x(0.4);
        let mut t = [0.0; 16];
        let mut i = [0.0; 16];
        mat4_transpose(&mut t, &m);
        mat4_inverse(&mut i, &m);
        // Rotations are orthogonal.
        assert_close(&t, &i, 1e-6);
    }

    #[test]
    fn vector_helpers_write_destination() {
        let mut v = [0.0; 3];
        add_into(&mut v, &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]);
        assert_eq!(v, [2.0, 3.0, 4.0]);
        mul_scalar_into(&mut v, &[1.0, 2.0, 3.0], 2.0);
        assert_eq!(v, [2.0, 4.0, 6.0]);
        cross_into(&mut v, &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert_eq!(v, [0.0, 0.0, 1.0]);
    }
}
