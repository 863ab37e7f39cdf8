//! Surfaces of revolution: cone, cylinder, torus, disc and the crescent.

use std::f32::consts::{PI, TAU};

use super::{check_subdivisions, check_vertex_limit, Arrays};
use crate::error::GeometryError;

/// Cone with its axis along Y, centred at the origin, optionally cut off at
/// the top. Caps add two rings each: one at the rim with the cap normal and
/// one collapsed to the centre.
pub fn truncated_cone(
    bottom_radius: f32,
    top_radius: f32,
    height: f32,
    radial_subdivisions: u32,
    vertical_subdivisions: u32,
    top_cap: bool,
    bottom_cap: bool,
) -> Result<Arrays, GeometryError> {
    check_subdivisions("truncated_cone", "radial_subdivisions", radial_subdivisions, 3)?;
    check_subdivisions("truncated_cone", "vertical_subdivisions", vertical_subdivisions, 1)?;

    let radial = radial_subdivisions as usize;
    let vertical = vertical_subdivisions as i64;
    let extra_rings = if top_cap { 2 } else { 0 } + if bottom_cap { 2 } else { 0 };
    let around = radial + 1;
    let rings = vertical as usize + 1 + extra_rings;
    check_vertex_limit(around * rings)?;

    let slant = (bottom_radius - top_radius).atan2(height);
    let (sin_slant, cos_slant) = slant.sin_cos();

    let start = if bottom_cap { -2 } else { 0 };
    let end = vertical + if top_cap { 2 } else { 0 };

    let mut arrays = Arrays::with_capacity(around * rings, radial * (rings - 1) * 6);
    for yy in start..=end {
        let mut v = yy as f32 / vertical as f32;
        let mut y = height * v;
        let ring_radius = if yy < 0 {
            y = 0.0;
            v = 1.0;
            bottom_radius
        } else if yy > vertical {
            y = height;
            v = 1.0;
            top_radius
        } else {
            bottom_radius + (top_radius - bottom_radius) * (yy as f32 / vertical as f32)
        };
        let ring_radius = if yy == -2 || yy == vertical + 2 {
            v = 0.0;
            0.0
        } else {
            ring_radius
        };
        y -= height * 0.5;

        let on_side = (0..=vertical).contains(&yy);
        for ii in 0..around {
            let (sin, cos) = (ii as f32 * TAU / radial as f32).sin_cos();
            let normal = if on_side {
                [sin * cos_slant, sin_slant, cos * cos_slant]
            } else if yy < 0 {
                [0.0, -1.0, 0.0]
            } else {
                [0.0, 1.0, 0.0]
            };
            arrays.push_vertex(
                [sin * ring_radius, y, cos * ring_radius],
                normal,
                [ii as f32 / radial as f32, 1.0 - v],
            );
        }
    }

    for ring in 0..rings - 1 {
        for ii in 0..radial {
            arrays.push_triangle(around * ring + ii, around * ring + ii + 1, around * (ring + 1) + ii + 1);
            arrays.push_triangle(around * ring + ii, around * (ring + 1) + ii + 1, around * (ring + 1) + ii);
        }
    }
    Ok(arrays)
}

/// A truncated cone with equal radii.
pub fn cylinder(
    radius: f32,
    height: f32,
    radial_subdivisions: u32,
    vertical_subdivisions: u32,
    top_cap: bool,
    bottom_cap: bool,
) -> Result<Arrays, GeometryError> {
    truncated_cone(radius, radius, height, radial_subdivisions, vertical_subdivisions, top_cap, bottom_cap)
}

/// Sweep range for [`torus`], in radians around the Y axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorusOptions {
    pub start_angle: f32,
    pub end_angle: f32,
}

impl Default for TorusOptions {
    fn default() -> Self {
        Self { start_angle: 0.0, end_angle: TAU }
    }
}

/// Torus in the XZ plane. `radius` is to the centre of the tube,
/// `thickness` is the tube radius.
pub fn torus(
    radius: f32,
    thickness: f32,
    radial_subdivisions: u32,
    body_subdivisions: u32,
    options: TorusOptions,
) -> Result<Arrays, GeometryError> {
    check_subdivisions("torus", "radial_subdivisions", radial_subdivisions, 3)?;
    check_subdivisions("torus", "body_subdivisions", body_subdivisions, 3)?;
    let (radial, body) = (radial_subdivisions as usize, body_subdivisions as usize);
    let radial_parts = radial + 1;
    let body_parts = body + 1;
    check_vertex_limit(radial_parts * body_parts)?;

    let range = options.end_angle - options.start_angle;
    let mut arrays = Arrays::with_capacity(radial_parts * body_parts, radial * body * 6);
    for slice in 0..body_parts {
        let v = slice as f32 / body as f32;
        let (slice_sin, ny) = (v * TAU).sin_cos();
        let ring_radius = radius + slice_sin * thickness;
        let y = ny * thickness;
        for ring in 0..radial_parts {
            let u = ring as f32 / radial as f32;
            let (x_sin, z_cos) = (options.start_angle + u * range).sin_cos();
            arrays.push_vertex(
                [x_sin * ring_radius, y, z_cos * ring_radius],
                [x_sin * slice_sin, ny, z_cos * slice_sin],
                [u, 1.0 - v],
            );
        }
    }

    for slice in 0..body {
        for ring in 0..radial {
            let (next_ring, next_slice) = (ring + 1, slice + 1);
            arrays.push_triangle(
                radial_parts * slice + ring,
                radial_parts * next_slice + ring,
                radial_parts * slice + next_ring,
            );
            arrays.push_triangle(
                radial_parts * next_slice + ring,
                radial_parts * next_slice + next_ring,
                radial_parts * slice + next_ring,
            );
        }
    }
    Ok(arrays)
}

/// Ring layout for [`disc`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscOptions {
    /// Concentric rings between inner and outer radius.
    pub stacks: u32,
    /// Radius of the hole in the middle; zero for a full disc.
    pub inner_radius: f32,
    /// Exponent spacing the rings; 1 spaces them evenly.
    pub stack_power: f32,
}

impl Default for DiscOptions {
    fn default() -> Self {
        Self { stacks: 1, inner_radius: 0.0, stack_power: 1.0 }
    }
}

/// Flat disc (or annulus) in the XZ plane facing +Y.
pub fn disc(radius: f32, divisions: u32, options: DiscOptions) -> Result<Arrays, GeometryError> {
    check_subdivisions("disc", "divisions", divisions, 3)?;
    check_subdivisions("disc", "stacks", options.stacks, 1)?;
    let (divisions, stacks) = (divisions as usize, options.stacks as usize);
    let per_stack = divisions + 1;
    check_vertex_limit(per_stack * (stacks + 1))?;

    let span = radius - options.inner_radius;
    let mut arrays = Arrays::with_capacity(per_stack * (stacks + 1), stacks * divisions * 6);
    let mut first = 0;
    for stack in 0..=stacks {
        let t = stack as f32 / stacks as f32;
        let stack_radius = options.inner_radius + span * t.powf(options.stack_power);
        for i in 0..=divisions {
            let (sin, cos) = (TAU * i as f32 / divisions as f32).sin_cos();
            arrays.push_vertex(
                [stack_radius * cos, 0.0, stack_radius * sin],
                [0.0, 1.0, 0.0],
                [1.0 - i as f32 / divisions as f32, t],
            );
            if stack > 0 && i != divisions {
                let a = first + i + 1;
                let b = first + i;
                let c = first + i - per_stack;
                let d = first + i + 1 - per_stack;
                arrays.push_triangle(a, b, c);
                arrays.push_triangle(a, c, d);
            }
        }
        first += per_stack;
    }
    Ok(arrays)
}

/// A crescent moon: a thick arc swept from `start_offset` to `end_offset`
/// (fractions of a half turn) whose depth bulges from `vertical_radius` at
/// the tips to the outer/inner radii in the middle.
pub fn crescent(
    vertical_radius: f32,
    outer_radius: f32,
    inner_radius: f32,
    thickness: f32,
    subdivisions_down: u32,
    start_offset: f32,
    end_offset: f32,
) -> Result<Arrays, GeometryError> {
    check_subdivisions("crescent", "subdivisions_down", subdivisions_down, 1)?;
    let down = subdivisions_down as usize;
    let per_arc = down + 1;
    // Two thickness columns, four arcs each.
    let count = per_arc * 2 * 4;
    check_vertex_limit(count)?;

    let offset_range = end_offset - start_offset;
    let mut arrays = Arrays::with_capacity(count, down * 4 * 6);

    let arc = |arrays: &mut Arrays,
               arc_radius: f32,
               column: usize,
               normal_mult: f32,
               normal_add: [f32; 3],
               u_mult: f32,
               u_add: f32| {
        let u_back = column as f32;
        let x_back = (u_back - 0.5) * 2.0;
        for z in 0..=down {
            let v = z as f32 / down as f32;
            let (s, c) = ((start_offset + v * offset_range) * PI).sin_cos();
            let r = vertical_radius + (arc_radius - vertical_radius) * s;
            let normal = [
                normal_add[0],
                s * normal_mult + normal_add[1],
                c * normal_mult + normal_add[2],
            ];
            arrays.push_vertex(
                [x_back * thickness, c * vertical_radius, s * r],
                normal,
                [u_back * u_mult + u_add, v],
            );
        }
    };

    for column in 0..2 {
        let side = (column as f32 - 0.5) * 2.0;
        arc(&mut arrays, outer_radius, column, 1.0, [0.0, 0.0, 0.0], 1.0, 0.0);
        arc(&mut arrays, outer_radius, column, 0.0, [side, 0.0, 0.0], 0.0, 0.0);
        arc(&mut arrays, inner_radius, column, 1.0, [0.0, 0.0, 0.0], 1.0, 0.0);
        arc(&mut arrays, inner_radius, column, 0.0, [side, 0.0, 0.0], 0.0, 1.0);
    }

    let mut surface = |left: usize, right: usize| {
        for z in 0..down {
            arrays.push_triangle(left + z, left + z + 1, right + z);
            arrays.push_triangle(left + z + 1, right + z + 1, right + z);
        }
    };
    surface(0, per_arc * 4); // front
    surface(per_arc * 5, per_arc * 7); // right
    surface(per_arc * 6, per_arc * 2); // back
    surface(per_arc * 3, per_arc); // left

    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::assert_well_formed;

    #[test]
    fn capped_cone_counts() {
        let c = truncated_cone(1.0, 0.5, 2.0, 8, 2, true, true).unwrap();
        // 3 side rings + 2 per cap, 9 vertices around.
        assert_eq!(c.num_vertices(), 9 * 7);
        assert_eq!(c.num_indices(), 8 * 6 * 6);
        assert_well_formed(&c);

        let open = cylinder(1.0, 2.0, 8, 2, false, false).unwrap();
        assert_eq!(open.num_vertices(), 9 * 3);
        assert_well_formed(&open);
    }

    #[test]
    fn cone_spans_its_height() {
        let c = truncated_cone(1.0, 0.0, 4.0, 6, 1, false, false).unwrap();
        let ys: Vec<f32> = c.position.elements().map(|p| p[1]).collect();
        assert!(ys.iter().any(|&y| (y + 2.0).abs() < 1e-6));
        assert!(ys.iter().any(|&y| (y - 2.0).abs() < 1e-6));
    }

    #[test]
    fn round_shapes_reject_low_subdivisions() {
        assert!(truncated_cone(1.0, 1.0, 1.0, 2, 1, true, true).is_err());
        assert!(truncated_cone(1.0, 1.0, 1.0, 3, 0, true, true).is_err());
        assert!(torus(1.0, 0.2, 2, 8, TorusOptions::default()).is_err());
        assert!(disc(1.0, 2, DiscOptions::default()).is_err());
        assert!(crescent(1.0, 2.0, 1.5, 0.2, 0, 0.0, 1.0).is_err());
    }

    #[test]
    fn torus_counts_and_radius() {
        let t = torus(2.0, 0.5, 16, 8, TorusOptions::default()).unwrap();
        assert_eq!(t.num_vertices(), 17 * 9);
        assert_eq!(t.num_indices(), 16 * 8 * 6);
        assert_well_formed(&t);
        for p in t.position.elements() {
            let ring = (p[0] * p[0] + p[2] * p[2]).sqrt();
            let tube = ((ring - 2.0).powi(2) + p[1] * p[1]).sqrt();
            assert!((tube - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn annulus_disc() {
        let d = disc(2.0, 12, DiscOptions { stacks: 3, inner_radius: 1.0, stack_power: 1.0 }).unwrap();
        assert_eq!(d.num_vertices(), 13 * 4);
        assert_eq!(d.num_indices(), 12 * 3 * 6);
        assert_well_formed(&d);
        let r0 = d.position.element(0)[0];
        assert!((r0 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn crescent_counts() {
        let c = crescent(1.0, 2.0, 1.5, 0.2, 10, 0.0, 1.0).unwrap();
        assert_eq!(c.num_vertices(), 8 * 11);
        assert_eq!(c.num_indices(), 4 * 10 * 6);
        assert_eq!(c.indices.as_slice().iter().max().copied(), Some(87));
    }
}
