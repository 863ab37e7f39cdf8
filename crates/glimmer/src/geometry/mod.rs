//! # Geometry: Primitive Generators and Vertex Array Utilities
//!
//! Each generator returns an [`Arrays`]: parallel attribute buffers
//! (`position`, `normal`, `tex_coord`) plus a 16-bit triangle index buffer.
//! Nothing here touches the GPU; upload happens later through
//! [`Model`](crate::model::Model) or by hand with
//! [`Buffer`](crate::gpu::Buffer).
//!
//! ## Index Range
//!
//! Indices are `u16`, so a single mesh can address at most 65536 vertices.
//! Every generator and every combining operation checks this and fails with
//! [`GeometryError::TooManyVertices`] instead of wrapping indices silently.
//!
//! ## Winding
//!
//! Triangles are counter-clockwise seen from outside, matching wgpu's
//! default `FrontFace::Ccw`.
//!
//! ## Comparison
//!
//! - **three.js**: `SphereGeometry`, `TorusGeometry`, `CylinderGeometry` take
//!   the same parameters and produce the same vertex layouts.
//! - **Bevy**: `Mesh` stores attributes in a map keyed by attribute id; we
//!   use named fields for the always-present ones and a map for extras.

mod attrib_buffer;
pub mod ops;
mod round;
mod shapes;

use std::collections::BTreeMap;

pub use attrib_buffer::AttribBuffer;
pub use ops::{concat, create_tangents_and_binormals, duplicate, random_vertex_colors, reorient};
pub use round::{crescent, cylinder, disc, torus, truncated_cone, DiscOptions, TorusOptions};
pub use shapes::{cube, flared_cube, plane, sphere, SphereRange};

use crate::error::GeometryError;

/// The most vertices a 16-bit index buffer can address.
pub const MAX_VERTICES: usize = 65536;

/// A mesh as parallel attribute buffers plus triangle indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrays {
    pub position: AttribBuffer<f32>,
    pub normal: AttribBuffer<f32>,
    pub tex_coord: AttribBuffer<f32>,
    pub indices: AttribBuffer<u16>,
    pub tangent: Option<AttribBuffer<f32>>,
    pub binormal: Option<AttribBuffer<f32>>,
    /// RGBA vertex colours, 0–255.
    pub color: Option<AttribBuffer<u8>>,
    /// Further per-vertex float attributes keyed by name.
    pub extra: BTreeMap<String, AttribBuffer<f32>>,
}

impl Arrays {
    /// Empty arrays with room for `num_vertices` vertices and
    /// `num_indices` indices.
    pub fn with_capacity(num_vertices: usize, num_indices: usize) -> Self {
        Self {
            position: AttribBuffer::with_capacity(3, num_vertices),
            normal: AttribBuffer::with_capacity(3, num_vertices),
            tex_coord: AttribBuffer::with_capacity(2, num_vertices),
            indices: AttribBuffer::with_capacity(3, num_indices / 3),
            tangent: None,
            binormal: None,
            color: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.position.num_elements()
    }

    /// Number of index values (three per triangle).
    pub fn num_indices(&self) -> usize {
        self.indices.as_slice().len()
    }

    pub(crate) fn push_vertex(&mut self, position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) {
        self.position.push_array(position);
        self.normal.push_array(normal);
        self.tex_coord.push_array(tex_coord);
    }

    pub(crate) fn push_triangle(&mut self, a: usize, b: usize, c: usize) {
        self.indices.push_array([a as u16, b as u16, c as u16]);
    }

    /// Names of the float attributes present, in a stable order. Standard
    /// attributes use the names shaders conventionally declare.
    pub fn float_attributes(&self) -> Vec<(&str, &AttribBuffer<f32>)> {
        let mut out: Vec<(&str, &AttribBuffer<f32>)> = vec![
            ("position", &self.position),
            ("normal", &self.normal),
            ("tex_coord", &self.tex_coord),
        ];
        if let Some(t) = &self.tangent {
            out.push(("tangent", t));
        }
        if let Some(b) = &self.binormal {
            out.push(("binormal", b));
        }
        out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v)));
        out
    }

    /// A comma-separated description of which attributes are present, used
    /// to check that arrays can be combined.
    pub(crate) fn signature(&self) -> String {
        let mut names: Vec<&str> = self.float_attributes().iter().map(|(n, _)| *n).collect();
        if self.color.is_some() {
            names.push("color");
        }
        names.join(",")
    }
}

/// Fail unless `count` vertices fit in 16-bit indices.
pub(crate) fn check_vertex_limit(count: usize) -> Result<(), GeometryError> {
    if count > MAX_VERTICES {
        return Err(GeometryError::TooManyVertices { count });
    }
    Ok(())
}

pub(crate) fn check_subdivisions(
    shape: &'static str,
    what: &'static str,
    got: u32,
    min: u32,
) -> Result<(), GeometryError> {
    if got < min {
        return Err(GeometryError::InvalidSubdivisions { shape, what, min, got });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn assert_well_formed(arrays: &Arrays) {
    let n = arrays.num_vertices();
    assert_eq!(arrays.normal.num_elements(), n);
    assert_eq!(arrays.tex_coord.num_elements(), n);
    assert_eq!(arrays.num_indices() % 3, 0);
    for &i in arrays.indices.as_slice() {
        assert!((i as usize) < n, "index {i} out of range for {n} vertices");
    }
    for normal in arrays.normal.elements() {
        let len = (normal[0].powi(2) + normal[1].powi(2) + normal[2].powi(2)).sqrt();
        assert!(len < 1e-6 || (len - 1.0).abs() < 1e-4, "normal length {len}");
    }
}
