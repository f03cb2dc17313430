//! Scalar and vector math helpers

use glam::Vec3;
use std::f32::consts::PI;

/// Converts degrees to radians
#[inline]
pub fn deg_to_rad(deg: f32) -> f32 {
    deg * PI / 180.0
}

/// Square a value (x²)
#[inline]
pub fn sqr<T: std::ops::Mul<Output = T> + Copy>(x: T) -> T {
    x * x
}

/// Linear interpolation between two values
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Get the next power of 2 greater than or equal to x
#[inline]
pub fn next_pow2(x: u32) -> u32 {
    if x == 0 {
        return 1;
    }
    let mut n = x - 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n + 1
}

/// Integer log base 2
#[inline]
pub fn ilog2(x: u32) -> u32 {
    if x == 0 {
        return 0;
    }
    31 - x.leading_zeros()
}

/// Align value to 4-byte boundary
#[inline]
pub fn align4(x: usize) -> usize {
    (x + 3) & !3
}

/// Squared distance between two points on the xz-plane
#[inline]
pub fn dist_sqr_2d(a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz
}

/// Distance between two points on the xz-plane
#[inline]
pub fn dist_2d(a: Vec3, b: Vec3) -> f32 {
    dist_sqr_2d(a, b).sqrt()
}

/// 2D perp-dot product of two vectors on the xz-plane
#[inline]
pub fn perp_2d(u: Vec3, v: Vec3) -> f32 {
    u.z * v.x - u.x * v.z
}

/// Dot product of two vectors on the xz-plane
#[inline]
pub fn dot_2d(u: Vec3, v: Vec3) -> f32 {
    u.x * v.x + u.z * v.z
}

/// Whether two points are close enough to be treated as the same position
#[inline]
pub fn vequal(a: Vec3, b: Vec3) -> bool {
    const THRESHOLD: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);
    a.distance_squared(b) < THRESHOLD
}

/// Whether every component of the vector is finite
#[inline]
pub fn vfinite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Computes the axis-aligned bounds of a set of points
pub fn calc_bounds(points: &[Vec3]) -> Option<(Vec3, Vec3)> {
    let first = *points.first()?;
    let bounds = points
        .iter()
        .skip(1)
        .fold((first, first), |(bmin, bmax), p| (bmin.min(*p), bmax.max(*p)));
    Some(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow2_and_log() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(16384), 16384);
        assert_eq!(ilog2(16384), 14);
        assert_eq!(ilog2(256), 8);
    }

    #[test]
    fn test_align4() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(8), 8);
        assert_eq!(align4(10), 12);
    }

    #[test]
    fn test_calc_bounds() {
        assert!(calc_bounds(&[]).is_none());
        let (bmin, bmax) = calc_bounds(&[
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(-1.0, 5.0, 0.0),
            Vec3::new(0.0, -2.0, 9.0),
        ])
        .unwrap();
        assert_eq!(bmin, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bmax, Vec3::new(1.0, 5.0, 9.0));
    }

    #[test]
    fn test_perp_2d_sign() {
        let u = Vec3::new(1.0, 0.0, 0.0);
        let v = Vec3::new(0.0, 0.0, 1.0);
        assert_eq!(perp_2d(u, v), -1.0);
        assert_eq!(perp_2d(v, u), 1.0);
    }
}
