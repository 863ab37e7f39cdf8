//! Conversions to and from glam.
//!
//! glam matrices are column-major with column vectors. Our constructors
//! produce the same flat layout, so a `Mat4` converts by copying the array.

use super::{Mat4, Quat, Vec3, Vec4};

pub fn to_glam_mat4(m: &Mat4) -> glam::Mat4 {
    glam::Mat4::from_cols_array(m)
}

pub fn from_glam_mat4(m: glam::Mat4) -> Mat4 {
    m.to_cols_array()
}

pub fn to_glam_quat(q: Quat) -> glam::Quat {
    glam::Quat::from_array(q)
}

pub fn from_glam_quat(q: glam::Quat) -> Quat {
    q.to_array()
}

pub fn to_glam_vec3(v: Vec3) -> glam::Vec3 {
    glam::Vec3::from_array(v)
}

pub fn to_glam_vec4(v: Vec4) -> glam::Vec4 {
    glam::Vec4::from_array(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::convention::{ColumnMajor, transform_point};
    use crate::math::transform::camera_look_at;

    #[test]
    fn transforms_agree_with_glam() {
        let m = camera_look_at([1.0, 5.0, -2.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let p = [0.5, -1.0, 2.0];
        let ours = transform_point::<ColumnMajor>(m, p);
        let theirs = to_glam_mat4(&m).transform_point3(to_glam_vec3(p));
        for (a, b) in ours.iter().zip(theirs.to_array()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(from_glam_mat4(to_glam_mat4(&m)), m);
    }
}
