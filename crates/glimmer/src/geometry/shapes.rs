//! Box and grid shaped primitives: cube, flared cube, plane, and the sphere.

use std::f32::consts::{PI, TAU};

use super::{check_subdivisions, check_vertex_limit, Arrays, AttribBuffer};
use crate::error::GeometryError;

const CUBE_CORNERS: [[f32; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];

const CUBE_FACE_NORMALS: [[f32; 3]; 6] = [
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
];

/// Corner indices of each face, counter-clockwise from outside.
const CUBE_FACE_CORNERS: [[usize; 4]; 6] = [
    [3, 7, 5, 1],
    [6, 2, 0, 4],
    [6, 7, 3, 2],
    [0, 1, 5, 4],
    [7, 6, 4, 5],
    [2, 3, 1, 0],
];

const CUBE_FACE_UVS: [[f32; 2]; 4] = [[1.0, 0.0], [0.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

/// Push the 24 vertices and 12 triangles of an axis-aligned cube with half
/// extent `k`.
fn push_cube_faces(arrays: &mut Arrays, k: f32) {
    for (face, corners) in CUBE_FACE_CORNERS.iter().enumerate() {
        let base = arrays.num_vertices();
        for (v, &corner) in corners.iter().enumerate() {
            let c = CUBE_CORNERS[corner];
            arrays.push_vertex([c[0] * k, c[1] * k, c[2] * k], CUBE_FACE_NORMALS[face], CUBE_FACE_UVS[v]);
        }
        arrays.push_triangle(base, base + 1, base + 2);
        arrays.push_triangle(base, base + 2, base + 3);
    }
}

/// Cube of side `size` centred at the origin: 24 vertices (four per face so
/// each face gets its own normal) and 36 indices.
pub fn cube(size: f32) -> Result<Arrays, GeometryError> {
    let mut arrays = Arrays::with_capacity(24, 36);
    push_cube_faces(&mut arrays, size * 0.5);
    Ok(arrays)
}

/// `layers + 1` concentric cube shells whose sides grow linearly from
/// `inner_size` to `outer_size`. Each vertex also carries its shell's
/// position in the stack (0 innermost, 1 outermost) as the `layer` extra
/// attribute, which shaders use to fade the outer shells.
pub fn flared_cube(inner_size: f32, outer_size: f32, layers: u32) -> Result<Arrays, GeometryError> {
    check_subdivisions("flared_cube", "layers", layers, 1)?;
    let shells = layers as usize + 1;
    check_vertex_limit(shells * 24)?;

    let mut arrays = Arrays::with_capacity(shells * 24, shells * 36);
    let mut layer_attr = AttribBuffer::with_capacity(1, shells * 24);
    for shell in 0..shells {
        let t = shell as f32 / layers as f32;
        let size = inner_size + (outer_size - inner_size) * t;
        push_cube_faces(&mut arrays, size * 0.5);
        for _ in 0..24 {
            layer_attr.push(&[t]);
        }
    }
    arrays.extra.insert("layer".to_string(), layer_attr);
    Ok(arrays)
}

/// Grid in the XZ plane facing +Y, `width` along X and `depth` along Z.
pub fn plane(
    width: f32,
    depth: f32,
    subdivisions_width: u32,
    subdivisions_depth: u32,
) -> Result<Arrays, GeometryError> {
    check_subdivisions("plane", "subdivisions_width", subdivisions_width, 1)?;
    check_subdivisions("plane", "subdivisions_depth", subdivisions_depth, 1)?;
    let (sw, sd) = (subdivisions_width as usize, subdivisions_depth as usize);
    let count = (sw + 1) * (sd + 1);
    check_vertex_limit(count)?;

    let mut arrays = Arrays::with_capacity(count, sw * sd * 6);
    for z in 0..=sd {
        for x in 0..=sw {
            let u = x as f32 / sw as f32;
            let v = z as f32 / sd as f32;
            arrays.push_vertex(
                [width * u - width * 0.5, 0.0, depth * v - depth * 0.5],
                [0.0, 1.0, 0.0],
                [u, v],
            );
        }
    }

    let across = sw + 1;
    for z in 0..sd {
        for x in 0..sw {
            arrays.push_triangle(z * across + x, (z + 1) * across + x, z * across + x + 1);
            arrays.push_triangle((z + 1) * across + x, (z + 1) * across + x + 1, z * across + x + 1);
        }
    }
    Ok(arrays)
}

/// Latitude and longitude span of a (possibly partial) sphere, in radians.
/// Latitude runs from the +Y pole (0) to the −Y pole (π).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereRange {
    pub start_latitude: f32,
    pub end_latitude: f32,
    pub start_longitude: f32,
    pub end_longitude: f32,
}

impl Default for SphereRange {
    fn default() -> Self {
        Self {
            start_latitude: 0.0,
            end_latitude: PI,
            start_longitude: 0.0,
            end_longitude: TAU,
        }
    }
}

/// UV sphere of `radius` with `subdivisions_axis` slices around Y and
/// `subdivisions_height` stacks from pole to pole.
///
/// Produces `(axis + 1) * (height + 1)` vertices; the extra column repeats
/// the seam so texture coordinates can wrap.
pub fn sphere(
    radius: f32,
    subdivisions_axis: u32,
    subdivisions_height: u32,
    range: SphereRange,
) -> Result<Arrays, GeometryError> {
    check_subdivisions("sphere", "subdivisions_axis", subdivisions_axis, 3)?;
    check_subdivisions("sphere", "subdivisions_height", subdivisions_height, 1)?;
    let (sa, sh) = (subdivisions_axis as usize, subdivisions_height as usize);
    let around = sa + 1;
    let count = around * (sh + 1);
    check_vertex_limit(count)?;

    let lat_range = range.end_latitude - range.start_latitude;
    let long_range = range.end_longitude - range.start_longitude;

    let mut arrays = Arrays::with_capacity(count, sa * sh * 6);
    for y in 0..=sh {
        for x in 0..=sa {
            let u = x as f32 / sa as f32;
            let v = y as f32 / sh as f32;
            let theta = range.start_longitude + long_range * u;
            let phi = range.start_latitude + lat_range * v;
            let (sin_theta, cos_theta) = theta.sin_cos();
            let (sin_phi, cos_phi) = phi.sin_cos();
            let n = [cos_theta * sin_phi, cos_phi, sin_theta * sin_phi];
            arrays.push_vertex([radius * n[0], radius * n[1], radius * n[2]], n, [1.0 - u, v]);
        }
    }

    for x in 0..sa {
        for y in 0..sh {
            arrays.push_triangle(y * around + x, y * around + x + 1, (y + 1) * around + x);
            arrays.push_triangle((y + 1) * around + x, y * around + x + 1, (y + 1) * around + x + 1);
        }
    }
    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::assert_well_formed;

    #[test]
    fn sphere_8_by_8_counts() {
        let s = sphere(1.0, 8, 8, SphereRange::default()).unwrap();
        assert_eq!(s.num_vertices(), 81);
        assert_eq!(s.num_indices(), 384);
        assert_well_formed(&s);
    }

    #[test]
    fn sphere_positions_lie_on_radius() {
        let s = sphere(2.5, 12, 6, SphereRange::default()).unwrap();
        for p in s.position.elements() {
            let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((r - 2.5).abs() < 1e-5);
        }
    }

    #[test]
    fn sphere_rejects_low_subdivisions() {
        assert_eq!(
            sphere(1.0, 2, 4, SphereRange::default()),
            Err(GeometryError::InvalidSubdivisions {
                shape: "sphere",
                what: "subdivisions_axis",
                min: 3,
                got: 2
            })
        );
        assert!(sphere(1.0, 4, 0, SphereRange::default()).is_err());
    }

    #[test]
    fn sphere_too_large_for_u16_indices() {
        let err = sphere(1.0, 300, 300, SphereRange::default()).unwrap_err();
        assert_eq!(err, GeometryError::TooManyVertices { count: 301 * 301 });
    }

    #[test]
    fn cube_counts_and_extent() {
        let c = cube(2.0).unwrap();
        assert_eq!(c.num_vertices(), 24);
        assert_eq!(c.num_indices(), 36);
        assert_well_formed(&c);
        assert!(c.position.as_slice().iter().all(|v| v.abs() == 1.0));
    }

    #[test]
    fn cube_faces_wind_outward() {
        let c = cube(1.0).unwrap();
        for tri in c.indices.elements() {
            let p = |i: u16| c.position.element_array::<3>(i as usize);
            let (a, b, d) = (p(tri[0]), p(tri[1]), p(tri[2]));
            let e1 = crate::math::vector::sub(b, a);
            let e2 = crate::math::vector::sub(d, a);
            let face_normal = crate::math::vector::cross(e1, e2);
            let n = c.normal.element_array::<3>(tri[0] as usize);
            assert!(crate::math::vector::dot(face_normal, n) > 0.0);
        }
    }

    #[test]
    fn plane_grid_counts() {
        let p = plane(4.0, 2.0, 4, 2).unwrap();
        assert_eq!(p.num_vertices(), 15);
        assert_eq!(p.num_indices(), 4 * 2 * 6);
        assert_well_formed(&p);
        assert_eq!(p.position.element(0), &[-2.0, 0.0, -1.0]);
        assert!(plane(1.0, 1.0, 0, 1).is_err());
    }

    #[test]
    fn flared_cube_shells_grow() {
        let f = flared_cube(1.0, 3.0, 2).unwrap();
        assert_eq!(f.num_vertices(), 72);
        assert_eq!(f.num_indices(), 108);
        let layer = &f.extra["layer"];
        assert_eq!(layer.element(0), &[0.0]);
        assert_eq!(layer.element(71), &[1.0]);
        // Outermost shell has half-extent 1.5.
        assert!((f.position.element(48)[0].abs() - 1.5).abs() < 1e-6);
        assert_well_formed(&f);
    }
}
