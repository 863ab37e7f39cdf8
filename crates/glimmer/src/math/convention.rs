//! Row-major vs column-major matrix conventions.
//!
//! A convention answers two questions about a flat matrix: where does
//! element `(row, col)` live, and which side of the matrix does a vector
//! sit on when it is transformed.
//!
//! | Convention    | `index(r, c)` | Vector transform | `compose(first, then)` |
//! |---------------|---------------|------------------|------------------------|
//! | [`RowMajor`]    | `r * n + c`   | `v · M`          | `first · then`         |
//! | [`ColumnMajor`] | `c * n + r`   | `M · v`          | `then · first`         |
//!
//! Pick one at compile time with the marker types (`mul4::<RowMajor>(a, b)`)
//! or carry it as data in a [`MathContext`] when the choice comes from
//! configuration. Both routes share the same generic implementations, so they
//! always agree.

use serde::{Deserialize, Serialize};

use super::matrix::{inverse4, transpose4};
use super::{Mat2, Mat3, Mat4, Vec3, Vec4};

/// Compile-time matrix convention.
pub trait MatrixConvention {
    /// The runtime tag for this convention.
    const KIND: Convention;

    /// Flat index of element `(row, col)` in an `n × n` matrix.
    fn index(n: usize, row: usize, col: usize) -> usize;

    /// Whether vectors are rows multiplied on the left (`v · M`).
    const ROW_VECTORS: bool;
}

/// Rows are contiguous; vectors are row vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowMajor;

/// Columns are contiguous; vectors are column vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMajor;

impl MatrixConvention for RowMajor {
    const KIND: Convention = Convention::RowMajor;
    const ROW_VECTORS: bool = true;

    fn index(n: usize, row: usize, col: usize) -> usize {
        row * n + col
    }
}

impl MatrixConvention for ColumnMajor {
    const KIND: Convention = Convention::ColumnMajor;
    const ROW_VECTORS: bool = false;

    fn index(n: usize, row: usize, col: usize) -> usize {
        col * n + row
    }
}

/// Runtime tag for a convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    #[default]
    RowMajor,
    ColumnMajor,
}

// ── Generic products ────────────────────────────────────────────────────────

/// Logical product `A · B` of two flat `n × n` matrices stored in convention `C`.
fn mul_n<C: MatrixConvention, const L: usize>(n: usize, a: &[f32; L], b: &[f32; L]) -> [f32; L] {
    let mut out = [0.0; L];
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += a[C::index(n, i, k)] * b[C::index(n, k, j)];
            }
            out[C::index(n, i, j)] = sum;
        }
    }
    out
}

pub fn mul2<C: MatrixConvention>(a: Mat2, b: Mat2) -> Mat2 {
    mul_n::<C, 4>(2, &a, &b)
}

pub fn mul3<C: MatrixConvention>(a: Mat3, b: Mat3) -> Mat3 {
    mul_n::<C, 9>(3, &a, &b)
}

/// Logical product `A · B`.
///
/// Under [`RowMajor`] this is `r[i][j] = Σ a[i][k] * b[k][j]` over the flat
/// rows; under [`ColumnMajor`] the same sum is taken over the transposed
/// layout.
pub fn mul4<C: MatrixConvention>(a: Mat4, b: Mat4) -> Mat4 {
    mul_n::<C, 16>(4, &a, &b)
}

/// `M · v` with `v` as a column.
pub fn mul_matrix_vector4<C: MatrixConvention>(m: Mat4, v: Vec4) -> Vec4 {
    std::array::from_fn(|i| (0..4).map(|k| m[C::index(4, i, k)] * v[k]).sum())
}

/// `v · M` with `v` as a row.
pub fn mul_vector_matrix4<C: MatrixConvention>(v: Vec4, m: Mat4) -> Vec4 {
    std::array::from_fn(|j| (0..4).map(|k| v[k] * m[C::index(4, k, j)]).sum())
}

pub fn row4<C: MatrixConvention>(m: Mat4, i: usize) -> Vec4 {
    std::array::from_fn(|j| m[C::index(4, i, j)])
}

pub fn column4<C: MatrixConvention>(m: Mat4, j: usize) -> Vec4 {
    std::array::from_fn(|i| m[C::index(4, i, j)])
}

/// The matrix that applies `first`, then `then`.
pub fn compose4<C: MatrixConvention>(first: Mat4, then: Mat4) -> Mat4 {
    if C::ROW_VECTORS { mul4::<C>(first, then) } else { mul4::<C>(then, first) }
}

/// Transform a homogeneous vector on the convention's natural side.
pub fn apply4<C: MatrixConvention>(m: Mat4, v: Vec4) -> Vec4 {
    if C::ROW_VECTORS { mul_vector_matrix4::<C>(v, m) } else { mul_matrix_vector4::<C>(m, v) }
}

/// Transform a point (w = 1) and divide by the resulting w.
pub fn transform_point<C: MatrixConvention>(m: Mat4, p: Vec3) -> Vec3 {
    let r = apply4::<C>(m, [p[0], p[1], p[2], 1.0]);
    [r[0] / r[3], r[1] / r[3], r[2] / r[3]]
}

/// Transform a direction (w = 0); translation is ignored.
pub fn transform_direction<C: MatrixConvention>(m: Mat4, d: Vec3) -> Vec3 {
    let r = apply4::<C>(m, [d[0], d[1], d[2], 0.0]);
    [r[0], r[1], r[2]]
}

/// Transform a surface normal by the inverse transpose of `m`.
///
/// Normals stay perpendicular to transformed surfaces even under non-uniform
/// scale. The result is not renormalized.
pub fn transform_normal<C: MatrixConvention>(m: Mat4, n: Vec3) -> Vec3 {
    transform_direction::<C>(transpose4(inverse4(m)), n)
}

// ── Runtime context ─────────────────────────────────────────────────────────

/// Convention chosen at runtime, threaded through code that needs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathContext {
    pub convention: Convention,
}

macro_rules! dispatch {
    ($self:ident, $f:ident ( $($arg:expr),* )) => {
        match $self.convention {
            Convention::RowMajor => $f::<RowMajor>($($arg),*),
            Convention::ColumnMajor => $f::<ColumnMajor>($($arg),*),
        }
    };
}

impl MathContext {
    pub const ROW_MAJOR: Self = Self { convention: Convention::RowMajor };
    pub const COLUMN_MAJOR: Self = Self { convention: Convention::ColumnMajor };

    pub fn new(convention: Convention) -> Self {
        Self { convention }
    }

    pub fn mul4(&self, a: Mat4, b: Mat4) -> Mat4 {
        dispatch!(self, mul4(a, b))
    }

    pub fn mul3(&self, a: Mat3, b: Mat3) -> Mat3 {
        dispatch!(self, mul3(a, b))
    }

    pub fn mul2(&self, a: Mat2, b: Mat2) -> Mat2 {
        dispatch!(self, mul2(a, b))
    }

    pub fn mul_matrix_vector4(&self, m: Mat4, v: Vec4) -> Vec4 {
        dispatch!(self, mul_matrix_vector4(m, v))
    }

    pub fn mul_vector_matrix4(&self, v: Vec4, m: Mat4) -> Vec4 {
        dispatch!(self, mul_vector_matrix4(v, m))
    }

    pub fn row4(&self, m: Mat4, i: usize) -> Vec4 {
        dispatch!(self, row4(m, i))
    }

    pub fn column4(&self, m: Mat4, j: usize) -> Vec4 {
        dispatch!(self, column4(m, j))
    }

    pub fn compose4(&self, first: Mat4, then: Mat4) -> Mat4 {
        dispatch!(self, compose4(first, then))
    }

    pub fn transform_point(&self, m: Mat4, p: Vec3) -> Vec3 {
        dispatch!(self, transform_point(m, p))
    }

    pub fn transform_direction(&self, m: Mat4, d: Vec3) -> Vec3 {
        dispatch!(self, transform_direction(m, d))
    }

    pub fn transform_normal(&self, m: Mat4, n: Vec3) -> Vec3 {
        dispatch!(self, transform_normal(m, n))
    }
}
