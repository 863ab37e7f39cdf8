//! 4x4 transform constructors and in-place composition.
//!
//! Constructors lay matrices out the way GL-era code expects: translation in
//! elements 12, 13, 14 and a right-handed view space looking down −Z. That
//! layout reads correctly as row-major with row vectors and as column-major
//! with column vectors (see [`super::convention`]).
//!
//! The `translate`/`rotate_*`/`scale` helpers modify a matrix so the new
//! operation is applied *before* the existing one, the same way
//! `glTranslate` and friends behave.

use super::matrix::identity4;
use super::vector::{cross, dot, normalize, sub};
use super::convention::{RowMajor, mul4};
use super::{Mat4, Vec3};

pub fn translation(v: Vec3) -> Mat4 {
    let mut m = identity4();
    m[12] = v[0];
    m[13] = v[1];
    m[14] = v[2];
    m
}

pub fn scaling(v: Vec3) -> Mat4 {
    let mut m = identity4();
    m[0] = v[0];
    m[5] = v[1];
    m[10] = v[2];
    m
}

pub fn rotation_x(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    [
        1.0, 0.0, 0.0, 0.0, //
        0.0, c, s, 0.0, //
        0.0, -s, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

pub fn rotation_y(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    [
        c, 0.0, -s, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        s, 0.0, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

pub fn rotation_z(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    [
        c, s, 0.0, 0.0, //
        -s, c, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Rotation about x, then y, then z by the components of `angles`.
pub fn rotation_zyx(angles: Vec3) -> Mat4 {
    let xy = mul4::<RowMajor>(rotation_x(angles[0]), rotation_y(angles[1]));
    mul4::<RowMajor>(xy, rotation_z(angles[2]))
}

/// Rotation by `angle` radians about `axis` (normalized internally).
pub fn axis_rotation(axis: Vec3, angle: f32) -> Mat4 {
    let [x, y, z] = normalize(axis);
    let (s, c) = angle.sin_cos();
    let omc = 1.0 - c;
    [
        x * x * omc + c,
        x * y * omc + z * s,
        x * z * omc - y * s,
        0.0,
        x * y * omc - z * s,
        y * y * omc + c,
        y * z * omc + x * s,
        0.0,
        x * z * omc + y * s,
        y * z * omc - x * s,
        z * z * omc + c,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    ]
}

/// Perspective projection with a vertical field of view in radians,
/// mapping depth to the `[-1, 1]` clip range.
pub fn perspective(fovy: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let f = (std::f32::consts::FRAC_PI_2 - 0.5 * fovy).tan();
    let range_inv = 1.0 / (near - far);
    [
        f / aspect,
        0.0,
        0.0,
        0.0,
        0.0,
        f,
        0.0,
        0.0,
        0.0,
        0.0,
        (near + far) * range_inv,
        -1.0,
        0.0,
        0.0,
        near * far * range_inv * 2.0,
        0.0,
    ]
}

/// Orthographic projection onto the `[-1, 1]` clip cube.
pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let mut m = identity4();
    m[0] = 2.0 / (right - left);
    m[5] = 2.0 / (top - bottom);
    m[10] = -2.0 / (far - near);
    m[12] = -(right + left) / (right - left);
    m[13] = -(top + bottom) / (top - bottom);
    m[14] = -(far + near) / (far - near);
    m
}

/// Off-axis perspective projection, like `glFrustum`.
pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let dx = right - left;
    let dy = top - bottom;
    let dz = far - near;
    [
        2.0 * near / dx,
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 * near / dy,
        0.0,
        0.0,
        (left + right) / dx,
        (top + bottom) / dy,
        -(far + near) / dz,
        -1.0,
        0.0,
        0.0,
        -2.0 * near * far / dz,
        0.0,
    ]
}

/// Orthonormal camera basis `(x, y, z)` with `z` pointing from target to eye.
fn camera_basis(eye: Vec3, target: Vec3, up: Vec3) -> (Vec3, Vec3, Vec3) {
    let z = normalize(sub(eye, target));
    let x = normalize(cross(up, z));
    let y = cross(z, x);
    (x, y, z)
}

/// View matrix: transforms world space into the space of a camera at `eye`
/// looking at `target`. The inverse of [`camera_look_at`].
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let (x, y, z) = camera_basis(eye, target, up);
    [
        x[0],
        y[0],
        z[0],
        0.0,
        x[1],
        y[1],
        z[1],
        0.0,
        x[2],
        y[2],
        z[2],
        0.0,
        -dot(x, eye),
        -dot(y, eye),
        -dot(z, eye),
        1.0,
    ]
}

/// World matrix of a camera at `eye` looking at `target`. The inverse of
/// [`look_at`]; also useful to orient any object toward a point.
pub fn camera_look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let (x, y, z) = camera_basis(eye, target, up);
    [
        x[0], x[1], x[2], 0.0, //
        y[0], y[1], y[2], 0.0, //
        z[0], z[1], z[2], 0.0, //
        eye[0], eye[1], eye[2], 1.0,
    ]
}

// ── In-place composition ────────────────────────────────────────────────────

pub fn translate(m: &mut Mat4, v: Vec3) {
    *m = mul4::<RowMajor>(translation(v), *m);
}

pub fn rotate_x(m: &mut Mat4, angle: f32) {
    *m = mul4::<RowMajor>(rotation_x(angle), *m);
}

pub fn rotate_y(m: &mut Mat4, angle: f32) {
    *m = mul4::<RowMajor>(rotation_y(angle), *m);
}

pub fn rotate_z(m: &mut Mat4, angle: f32) {
    *m = mul4::<RowMajor>(rotation_z(angle), *m);
}

pub fn axis_rotate(m: &mut Mat4, axis: Vec3, angle: f32) {
    *m = mul4::<RowMajor>(axis_rotation(axis, angle), *m);
}

pub fn scale(m: &mut Mat4, v: Vec3) {
    *m = mul4::<RowMajor>(scaling(v), *m);
}

/// Translation part of a transform.
pub fn get_translation(m: &Mat4) -> Vec3 {
    [m[12], m[13], m[14]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::assert_close;
    use crate::math::convention::{ColumnMajor, transform_point};
    use crate::math::matrix::inverse4;

    #[test]
    fn look_at_and_camera_look_at_are_inverses() {
        let cases = [
            ([0.0, 3.0, 6.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([10.0, -2.0, 4.0], [1.0, 1.0, 1.0], [0.0, 1.0, 0.0]),
            ([-5.0, 5.0, -5.0], [2.0, 0.0, 3.0], [0.0, 0.0, 1.0]),
        ];
        for (eye, target, up) in cases {
            let view = look_at(eye, target, up);
            let camera = camera_look_at(eye, target, up);
            assert_close(&mul4::<RowMajor>(view, camera), &identity4(), 1e-5);
            assert_close(&mul4::<RowMajor>(camera, view), &identity4(), 1e-5);
            assert_close(&inverse4(camera), &view, 1e-4);
        }
    }

    #[test]
    fn look_at_matches_glam() {
        let eye = [3.0, 4.0, 5.0];
        let target = [0.0, 1.0, 0.0];
        let ours = look_at(eye, target, [0.0, 1.0, 0.0]);
        let theirs = glam::Mat4::look_at_rh(eye.into(), target.into(), glam::Vec3::Y).to_cols_array();
        assert_close(&ours, &theirs, 1e-5);
    }

    #[test]
    fn projections_match_glam() {
        let p = perspective(0.9, 1.6, 0.5, 250.0);
        let g = glam::Mat4::perspective_rh_gl(0.9, 1.6, 0.5, 250.0).to_cols_array();
        assert_close(&p, &g, 1e-5);

        let o = orthographic(-4.0, 6.0, -2.0, 3.0, 0.1, 50.0);
        let g = glam::Mat4::orthographic_rh_gl(-4.0, 6.0, -2.0, 3.0, 0.1, 50.0).to_cols_array();
        assert_close(&o, &g, 1e-5);
    }

    #[test]
    fn symmetric_frustum_equals_perspective() {
        let (fovy, aspect, near, far) = (1.0_f32, 2.0_f32, 1.0_f32, 100.0_f32);
        let top = near * (fovy * 0.5).tan();
        let right = top * aspect;
        let f = frustum(-right, right, -top, top, near, far);
        assert_close(&f, &perspective(fovy, aspect, near, far), 1e-5);
    }

    #[test]
    fn rotations_match_glam() {
        assert_close(&rotation_x(0.7), &glam::Mat4::from_rotation_x(0.7).to_cols_array(), 1e-6);
        assert_close(&rotation_y(0.7), &glam::Mat4::from_rotation_y(0.7).to_cols_array(), 1e-6);
        assert_close(&rotation_z(0.7), &glam::Mat4::from_rotation_z(0.7).to_cols_array(), 1e-6);
        let axis = glam::Vec3::new(1.0, 2.0, 3.0).normalize();
        assert_close(
            &axis_rotation([1.0, 2.0, 3.0], 1.1),
            &glam::Mat4::from_axis_angle(axis, 1.1).to_cols_array(),
            1e-6,
        );
    }

    #[test]
    fn in_place_ops_apply_before_existing_transform() {
        let mut m = translation([5.0, 0.0, 0.0]);
        scale(&mut m, [2.0, 2.0, 2.0]);
        // Scale first, then translate.
        let p = transform_point::<RowMajor>(m, [1.0, 1.0, 1.0]);
        assert_close(&p, &[7.0, 2.0, 2.0], 1e-6);
        assert_close(&transform_point::<ColumnMajor>(m, [1.0, 1.0, 1.0]), &p, 1e-6);
        assert_eq!(get_translation(&m), [5.0, 0.0, 0.0]);

        let mut r = identity4();
        rotate_z(&mut r, std::f32::consts::FRAC_PI_2);
        translate(&mut r, [1.0, 0.0, 0.0]);
        // Translate first, then rotate 90° about z: (1,0,0) + (1,0,0) → (0,2,0).
        let q = transform_point::<RowMajor>(r, [1.0, 0.0, 0.0]);
        assert_close(&q, &[0.0, 2.0, 0.0], 1e-6);
    }

    #[test]
    fn rotation_zyx_applies_x_first() {
        let m = rotation_zyx([std::f32::consts::FRAC_PI_2, 0.0, std::f32::consts::FRAC_PI_2]);
        // y → z under x rotation, z stays under z rotation.
        let p = transform_point::<RowMajor>(m, [0.0, 1.0, 0.0]);
        assert_close(&p, &[0.0, 0.0, 1.0], 1e-6);
    }
}
