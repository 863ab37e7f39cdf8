//! Quaternions as `[x, y, z, w]`.
//!
//! Arithmetic accepts either a scalar or a quaternion on each side through
//! [`Operand`], so `add(q, 2.0)` and `add(q, r)` are the same call. Nothing
//! here renormalises; call [`normalize`] when drift matters.
//!
//! ## Comparison
//!
//! - **glam::Quat**: same component order and Hamilton product. Our
//!   [`to_rotation`] produces the same flat array as `Mat4::from_quat`.

use super::{Mat3, Mat4, Quat, Vec3};
use super::vector;

/// One side of a quaternion arithmetic expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Scalar(f32),
    Quaternion(Quat),
}

impl From<f32> for Operand {
    fn from(s: f32) -> Self {
        Operand::Scalar(s)
    }
}

impl From<Quat> for Operand {
    fn from(q: Quat) -> Self {
        Operand::Quaternion(q)
    }
}

impl Operand {
    /// The value as a quaternion; a scalar `s` becomes `[0, 0, 0, s]`.
    pub fn to_quaternion(self) -> Quat {
        match self {
            Operand::Scalar(s) => [0.0, 0.0, 0.0, s],
            Operand::Quaternion(q) => q,
        }
    }

    pub fn as_scalar(self) -> Option<f32> {
        match self {
            Operand::Scalar(s) => Some(s),
            Operand::Quaternion(_) => None,
        }
    }
}

pub fn identity() -> Quat {
    [0.0, 0.0, 0.0, 1.0]
}

pub fn add(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    use Operand::*;
    match (a.into(), b.into()) {
        (Scalar(a), Scalar(b)) => Scalar(a + b),
        (Quaternion(q), Scalar(s)) | (Scalar(s), Quaternion(q)) => {
            Quaternion([q[0], q[1], q[2], q[3] + s])
        }
        (Quaternion(a), Quaternion(b)) => Quaternion(vector::add(a, b)),
    }
}

pub fn sub(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    use Operand::*;
    match (a.into(), b.into()) {
        (Scalar(a), Scalar(b)) => Scalar(a - b),
        (Quaternion(q), Scalar(s)) => Quaternion([q[0], q[1], q[2], q[3] - s]),
        (Scalar(s), Quaternion(q)) => Quaternion([-q[0], -q[1], -q[2], s - q[3]]),
        (Quaternion(a), Quaternion(b)) => Quaternion(vector::sub(a, b)),
    }
}

pub fn mul(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    use Operand::*;
    match (a.into(), b.into()) {
        (Scalar(a), Scalar(b)) => Scalar(a * b),
        (Quaternion(q), Scalar(s)) | (Scalar(s), Quaternion(q)) => {
            Quaternion(vector::mul_scalar(q, s))
        }
        (Quaternion(a), Quaternion(b)) => Quaternion(mul_quaternion(a, b)),
    }
}

pub fn div(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    use Operand::*;
    match (a.into(), b.into()) {
        (Scalar(a), Scalar(b)) => Scalar(a / b),
        (Quaternion(q), Scalar(s)) => Quaternion(vector::div_scalar(q, s)),
        (Scalar(s), Quaternion(q)) => Quaternion(vector::mul_scalar(inverse(q), s)),
        (Quaternion(a), Quaternion(b)) => Quaternion(mul_quaternion(a, inverse(b))),
    }
}

/// Hamilton product `a * b`.
pub fn mul_quaternion(a: Quat, b: Quat) -> Quat {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by + ay * bw + az * bx - ax * bz,
        aw * bz + az * bw + ax * by - ay * bx,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}

pub fn conjugate(q: Quat) -> Quat {
    [-q[0], -q[1], -q[2], q[3]]
}

pub fn inverse(q: Quat) -> Quat {
    let d = 1.0 / vector::length_squared(q);
    [-q[0] * d, -q[1] * d, -q[2] * d, q[3] * d]
}

pub fn length(q: Quat) -> f32 {
    vector::length(q)
}

pub fn length_squared(q: Quat) -> f32 {
    vector::length_squared(q)
}

/// Unit quaternion; a zero-length input comes back as the identity.
pub fn normalize(q: Quat) -> Quat {
    let len = length(q);
    if len > super::EPSILON { vector::div_scalar(q, len) } else { identity() }
}

pub fn rotation_x(angle: f32) -> Quat {
    let (s, c) = (0.5 * angle).sin_cos();
    [s, 0.0, 0.0, c]
}

pub fn rotation_y(angle: f32) -> Quat {
    let (s, c) = (0.5 * angle).sin_cos();
    [0.0, s, 0.0, c]
}

pub fn rotation_z(angle: f32) -> Quat {
    let (s, c) = (0.5 * angle).sin_cos();
    [0.0, 0.0, s, c]
}

/// Rotation by `angle` radians about `axis`; the axis need not be unit length.
pub fn axis_rotation(axis: Vec3, angle: f32) -> Quat {
    let d = 1.0 / vector::length(axis);
    let (s, c) = (0.5 * angle).sin_cos();
    let k = s * d;
    [axis[0] * k, axis[1] * k, axis[2] * k, c]
}

/// 4x4 rotation matrix for `q`. Non-unit quaternions are divided through by
/// their squared length, so `q` and `2q` give the same matrix.
pub fn to_rotation(q: Quat) -> Mat4 {
    let [x, y, z, w] = q;
    let (xx, yy, zz, ww) = (x * x, y * y, z * z, w * w);
    let (xy, xz, yz) = (x * y, x * z, y * z);
    let (wx, wy, wz) = (w * x, w * y, w * z);
    let d = 1.0 / (xx + yy + zz + ww);
    [
        (ww + xx - yy - zz) * d,
        2.0 * (wz + xy) * d,
        2.0 * (xz - wy) * d,
        0.0,
        2.0 * (xy - wz) * d,
        (ww - xx + yy - zz) * d,
        2.0 * (wx + yz) * d,
        0.0,
        2.0 * (wy + xz) * d,
        2.0 * (yz - wx) * d,
        (ww - xx - yy + zz) * d,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    ]
}

/// Quaternion for the rotation in the upper 3x3 of `m` (entries read as
/// `m[row * 4 + col]`). Recovers `q` from `to_rotation(q)` up to sign.
pub fn from_rotation4(m: Mat4) -> Quat {
    rotation_to_quaternion(|r, c| m[r * 4 + c])
}

/// 3x3 counterpart of [`from_rotation4`].
pub fn from_rotation3(m: Mat3) -> Quat {
    rotation_to_quaternion(|r, c| m[r * 3 + c])
}

fn rotation_to_quaternion(m: impl Fn(usize, usize) -> f32) -> Quat {
    let trace = m(0, 0) + m(1, 1) + m(2, 2);
    if trace > 0.0 {
        let s = 2.0 * (trace + 1.0).sqrt();
        return [
            (m(1, 2) - m(2, 1)) / s,
            (m(2, 0) - m(0, 2)) / s,
            (m(0, 1) - m(1, 0)) / s,
            0.25 * s,
        ];
    }

    // u is the largest diagonal entry; (u, v, w) is an even permutation.
    let (u, v, w) = if m(0, 0) >= m(1, 1) && m(0, 0) >= m(2, 2) {
        (0, 1, 2)
    } else if m(1, 1) >= m(2, 2) {
        (1, 2, 0)
    } else {
        (2, 0, 1)
    };
    let r = (1.0 + m(u, u) - m(v, v) - m(w, w)).sqrt();
    let mut q = [0.0; 4];
    q[u] = 0.5 * r;
    q[v] = 0.5 * (m(v, u) + m(u, v)) / r;
    q[w] = 0.5 * (m(u, w) + m(w, u)) / r;
    q[3] = 0.5 * (m(v, w) - m(w, v)) / r;
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::assert_close;

    fn same_up_to_sign(a: Quat, b: Quat) -> bool {
        let close = |s: f32| a.iter().zip(&b).all(|(x, y)| (x - s * y).abs() < 1e-5);
        close(1.0) || close(-1.0)
    }

    #[test]
    fn rotation_round_trip_up_to_sign() {
        let samples = [
            identity(),
            rotation_x(2.5),
            rotation_y(-1.2),
            rotation_z(3.1),
            axis_rotation([1.0, -2.0, 0.5], 2.9),
            normalize([0.1, 0.7, -0.3, -0.6]),
            normalize([0.0, 0.0, 1.0, 0.0]),
        ];
        for q in samples {
            let back = from_rotation4(to_rotation(q));
            assert!(same_up_to_sign(q, back), "{q:?} came back as {back:?}");

            let m3 = crate::math::matrix::upper3(to_rotation(q));
            assert!(same_up_to_sign(q, from_rotation3(m3)));
        }
    }

    #[test]
    fn to_rotation_matches_glam() {
        let q = normalize([0.3, -0.2, 0.6, 0.7]);
        let g = glam::Mat4::from_quat(glam::Quat::from_array(q)).to_cols_array();
        assert_close(&to_rotation(q), &g, 1e-6);

        let axis = glam::Vec3::new(0.0, 1.0, 1.0).normalize();
        let g = glam::Quat::from_axis_angle(axis, 0.8).to_array();
        assert_close(&axis_rotation([0.0, 1.0, 1.0], 0.8), &g, 1e-6);
    }

    #[test]
    fn hamilton_product_matches_glam() {
        let a = [0.1, 0.2, 0.3, 0.9];
        let b = [-0.4, 0.5, 0.1, 0.6];
        let g = (glam::Quat::from_array(a) * glam::Quat::from_array(b)).to_array();
        assert_close(&mul_quaternion(a, b), &g, 1e-6);
    }

    #[test]
    fn scalar_operands() {
        let q: Quat = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(add(q, 1.0_f32), Operand::Quaternion([1.0, 2.0, 3.0, 5.0]));
        assert_eq!(add(1.0_f32, q), Operand::Quaternion([1.0, 2.0, 3.0, 5.0]));
        assert_eq!(sub(10.0_f32, q), Operand::Quaternion([-1.0, -2.0, -3.0, 6.0]));
        assert_eq!(sub(q, 1.0_f32), Operand::Quaternion([1.0, 2.0, 3.0, 3.0]));
        assert_eq!(mul(q, 2.0_f32), Operand::Quaternion([2.0, 4.0, 6.0, 8.0]));
        assert_eq!(div(q, 2.0_f32), Operand::Quaternion([0.5, 1.0, 1.5, 2.0]));
        assert_eq!(mul(3.0_f32, 2.0_f32).as_scalar(), Some(6.0));
    }

    #[test]
    fn division_by_self_is_identity() {
        let q = [0.5, -1.0, 2.0, 0.25];
        let r = div(q, q).to_quaternion();
        assert_close(&r, &identity(), 1e-6);
        assert_close(&mul_quaternion(q, inverse(q)), &identity(), 1e-6);
        assert_close(&conjugate(rotation_x(0.3)), &rotation_x(-0.3), 1e-6);
    }
}
