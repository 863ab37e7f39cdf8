//! Operations on whole [`Arrays`]: reorienting, tangent frames, combining
//! meshes, un-indexing, and vertex colours.

use super::{check_vertex_limit, Arrays, AttribBuffer};
use crate::error::GeometryError;
use crate::math::vector::{add, dot, mul_scalar, normalize, sub};
use crate::math::{Mat4, MathContext, RandomSource, Vec3};

/// Transform a mesh in place: positions as points, normals by the inverse
/// transpose (then renormalised), tangents and binormals as directions.
pub fn reorient(arrays: &mut Arrays, matrix: Mat4, ctx: MathContext) {
    reorient_each(&mut arrays.position, |p| ctx.transform_point(matrix, p));
    reorient_each(&mut arrays.normal, |n| normalize(ctx.transform_normal(matrix, n)));
    for buffer in [arrays.tangent.as_mut(), arrays.binormal.as_mut()].into_iter().flatten() {
        reorient_each(buffer, |d| normalize(ctx.transform_direction(matrix, d)));
    }
}

fn reorient_each(buffer: &mut AttribBuffer<f32>, f: impl Fn(Vec3) -> Vec3) {
    for i in 0..buffer.num_elements() {
        let v = f(buffer.element_array::<3>(i));
        buffer.set_element(i, &v);
    }
}

/// Compute per-vertex tangents (along increasing u) and binormals (along
/// increasing v) from positions, normals and texture coordinates, and store
/// them on `arrays`.
///
/// Per-triangle directions are accumulated at each corner, then made
/// orthogonal to the vertex normal. Triangles with degenerate texture
/// coordinates contribute nothing; vertices that end up without a direction
/// get the zero vector.
pub fn create_tangents_and_binormals(arrays: &mut Arrays) {
    let n = arrays.num_vertices();
    let mut tangents = vec![[0.0_f32; 3]; n];
    let mut binormals = vec![[0.0_f32; 3]; n];

    for tri in arrays.indices.elements() {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let p0 = arrays.position.element_array::<3>(i0);
        let e1 = sub(arrays.position.element_array::<3>(i1), p0);
        let e2 = sub(arrays.position.element_array::<3>(i2), p0);

        let t0 = arrays.tex_coord.element_array::<2>(i0);
        let d1 = sub(arrays.tex_coord.element_array::<2>(i1), t0);
        let d2 = sub(arrays.tex_coord.element_array::<2>(i2), t0);

        let det = d1[0] * d2[1] - d2[0] * d1[1];
        if det.abs() < 1e-12 {
            continue;
        }
        let r = 1.0 / det;
        let sdir = mul_scalar(sub(mul_scalar(e1, d2[1]), mul_scalar(e2, d1[1])), r);
        let tdir = mul_scalar(sub(mul_scalar(e2, d1[0]), mul_scalar(e1, d2[0])), r);
        for i in [i0, i1, i2] {
            tangents[i] = add(tangents[i], sdir);
            binormals[i] = add(binormals[i], tdir);
        }
    }

    let mut tangent = AttribBuffer::with_capacity(3, n);
    let mut binormal = AttribBuffer::with_capacity(3, n);
    for i in 0..n {
        let normal = arrays.normal.element_array::<3>(i);
        let t = normalize(sub(tangents[i], mul_scalar(normal, dot(normal, tangents[i]))));
        let b = binormals[i];
        let b = sub(b, mul_scalar(normal, dot(normal, b)));
        let b = normalize(sub(b, mul_scalar(t, dot(t, b))));
        tangent.push_array(t);
        binormal.push_array(b);
    }
    arrays.tangent = Some(tangent);
    arrays.binormal = Some(binormal);
}

/// Merge meshes into one, offsetting each mesh's indices by the vertices
/// before it. All inputs must carry the same set of attributes.
pub fn concat(parts: &[&Arrays]) -> Result<Arrays, GeometryError> {
    let (first, rest) = parts.split_first().ok_or(GeometryError::Empty)?;
    let signature = first.signature();
    let total: usize = parts.iter().map(|a| a.num_vertices()).sum();
    check_vertex_limit(total)?;

    let mut out = (*first).clone();
    for part in rest {
        let other = part.signature();
        if other != signature {
            return Err(GeometryError::MismatchedAttributes(format!("[{signature}] vs [{other}]")));
        }
        let offset = out.num_vertices() as u16;
        out.position.extend_from(&part.position);
        out.normal.extend_from(&part.normal);
        out.tex_coord.extend_from(&part.tex_coord);
        if let (Some(dst), Some(src)) = (out.tangent.as_mut(), part.tangent.as_ref()) {
            dst.extend_from(src);
        }
        if let (Some(dst), Some(src)) = (out.binormal.as_mut(), part.binormal.as_ref()) {
            dst.extend_from(src);
        }
        if let (Some(dst), Some(src)) = (out.color.as_mut(), part.color.as_ref()) {
            dst.extend_from(src);
        }
        for (name, dst) in out.extra.iter_mut() {
            if let Some(src) = part.extra.get(name) {
                dst.extend_from(src);
            }
        }
        for tri in part.indices.elements() {
            out.indices.push_array([tri[0] + offset, tri[1] + offset, tri[2] + offset]);
        }
    }
    Ok(out)
}

/// Un-index a mesh: one vertex per index, so no two triangles share a
/// vertex. Used before assigning per-face data such as flat colours.
pub fn duplicate(arrays: &Arrays) -> Result<Arrays, GeometryError> {
    let count = arrays.num_indices();
    check_vertex_limit(count)?;

    fn expand<T: bytemuck::Pod + Default>(src: &AttribBuffer<T>, indices: &[u16]) -> AttribBuffer<T> {
        let mut out = AttribBuffer::with_capacity(src.num_components(), indices.len());
        for &i in indices {
            out.push(src.element(i as usize));
        }
        out
    }

    let idx = arrays.indices.as_slice();
    let mut out = Arrays {
        position: expand(&arrays.position, idx),
        normal: expand(&arrays.normal, idx),
        tex_coord: expand(&arrays.tex_coord, idx),
        indices: AttribBuffer::with_capacity(3, count / 3),
        tangent: arrays.tangent.as_ref().map(|b| expand(b, idx)),
        binormal: arrays.binormal.as_ref().map(|b| expand(b, idx)),
        color: arrays.color.as_ref().map(|b| expand(b, idx)),
        extra: arrays.extra.iter().map(|(k, b)| (k.clone(), expand(b, idx))).collect(),
    };
    for t in 0..count / 3 {
        out.push_triangle(t * 3, t * 3 + 1, t * 3 + 2);
    }
    Ok(out)
}

/// Give the mesh random opaque RGBA colours, one colour per run of
/// `verts_per_color` consecutive vertices. Use 3 on a [`duplicate`]d mesh
/// for one colour per triangle.
pub fn random_vertex_colors(arrays: &mut Arrays, rng: &mut dyn RandomSource, verts_per_color: usize) {
    let n = arrays.num_vertices();
    let run = verts_per_color.max(1);
    let mut colors = AttribBuffer::with_capacity(4, n);
    let mut current = [0u8; 4];
    for i in 0..n {
        if i % run == 0 {
            current = [
                rng.next_int(256) as u8,
                rng.next_int(256) as u8,
                rng.next_int(256) as u8,
                255,
            ];
        }
        colors.push_array(current);
    }
    arrays.color = Some(colors);
}
