//! Vector operations over `[f32; N]`.
//!
//! All functions are generic over the component count, so the same `add`
//! serves 2-, 3- and 4-component vectors.

use super::{EPSILON, Vec3};

pub fn add<const N: usize>(a: [f32; N], b: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| a[i] + b[i])
}

pub fn sub<const N: usize>(a: [f32; N], b: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| a[i] - b[i])
}

/// Component-wise interpolation from `a` (t = 0) to `b` (t = 1).
pub fn lerp<const N: usize>(a: [f32; N], b: [f32; N], t: f32) -> [f32; N] {
    std::array::from_fn(|i| a[i] + t * (b[i] - a[i]))
}

/// Interpolate with a separate factor per component.
pub fn lerp_vector<const N: usize>(a: [f32; N], b: [f32; N], t: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| a[i] + t[i] * (b[i] - a[i]))
}

pub fn negate<const N: usize>(a: [f32; N]) -> [f32; N] {
    a.map(|x| -x)
}

pub fn mul_scalar<const N: usize>(a: [f32; N], k: f32) -> [f32; N] {
    a.map(|x| x * k)
}

pub fn div_scalar<const N: usize>(a: [f32; N], k: f32) -> [f32; N] {
    a.map(|x| x / k)
}

/// Component-wise product.
pub fn mul<const N: usize>(a: [f32; N], b: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| a[i] * b[i])
}

/// Component-wise quotient.
pub fn div<const N: usize>(a: [f32; N], b: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| a[i] / b[i])
}

pub fn min<const N: usize>(a: [f32; N], b: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| a[i].min(b[i]))
}

pub fn max<const N: usize>(a: [f32; N], b: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| a[i].max(b[i]))
}

pub fn dot<const N: usize>(a: [f32; N], b: [f32; N]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn length_squared<const N: usize>(a: [f32; N]) -> f32 {
    dot(a, a)
}

pub fn length<const N: usize>(a: [f32; N]) -> f32 {
    length_squared(a).sqrt()
}

pub fn distance_squared<const N: usize>(a: [f32; N], b: [f32; N]) -> f32 {
    length_squared(sub(a, b))
}

pub fn distance<const N: usize>(a: [f32; N], b: [f32; N]) -> f32 {
    distance_squared(a, b).sqrt()
}

/// Scale `a` to unit length.
///
/// Vectors shorter than [`EPSILON`] come back as the zero vector instead of
/// being divided by (almost) zero, so the result never contains NaN.
pub fn normalize<const N: usize>(a: [f32; N]) -> [f32; N] {
    let len = length(a);
    if len > EPSILON { a.map(|x| x / len) } else { [0.0; N] }
}

/// Outer product `a ⊗ b` as an `N × M` matrix of rows (`r[i][j] = a[i] * b[j]`).
pub fn outer<const N: usize, const M: usize>(a: [f32; N], b: [f32; M]) -> [[f32; M]; N] {
    std::array::from_fn(|i| std::array::from_fn(|j| a[i] * b[j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::assert_close;

    #[test]
    fn normalize_is_idempotent() {
        let samples: [[f32; 3]; 4] = [
            [3.0, 4.0, 0.0],
            [-1.0, 2.0, 7.5],
            [0.001, 0.0, 0.002],
            [100.0, -100.0, 1.0],
        ];
        for v in samples {
            let once = normalize(v);
            let twice = normalize(once);
            assert_close(&once, &twice, 1e-6);
            assert!((length(once) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        let n = normalize([0.0, 0.0, 0.0]);
        assert_eq!(n, [0.0, 0.0, 0.0]);
        assert!(n.iter().all(|x| !x.is_nan()));

        let tiny = normalize([1e-7_f32, 0.0, 0.0, 0.0]);
        assert_eq!(tiny, [0.0; 4]);
    }

    #[test]
    fn cross_follows_right_hand_rule() {
        assert_eq!(cross([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(cross([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn lerp_endpoints() {
        let a = [1.0, 2.0];
        let b = [3.0, 6.0];
        assert_eq!(lerp(a, b, 0.0), a);
        assert_eq!(lerp(a, b, 1.0), b);
        assert_eq!(lerp(a, b, 0.5), [2.0, 4.0]);
        assert_eq!(lerp_vector(a, b, [0.0, 1.0]), [1.0, 6.0]);
    }

    #[test]
    fn distance_and_dot() {
        assert_eq!(dot([1.0, 2.0, 3.0], [4.0, 5.0, 6.0]), 32.0);
        assert_eq!(distance([0.0, 0.0], [3.0, 4.0]), 5.0);
        assert_eq!(outer([1.0, 2.0], [3.0, 4.0, 5.0]), [[3.0, 4.0, 5.0], [6.0, 8.0, 10.0]]);
    }
}
