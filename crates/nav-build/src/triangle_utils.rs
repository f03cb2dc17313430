//! Integer 2D predicates on the xz plane shared by contour and polygon mesh building
//!
//! Points are `[x, y, z, ..]` slices in cell units; only x and z take part.

#[inline]
pub(crate) fn prev(i: usize, n: usize) -> usize {
    if i == 0 {
        n - 1
    } else {
        i - 1
    }
}

#[inline]
pub(crate) fn next(i: usize, n: usize) -> usize {
    if i + 1 >= n {
        0
    } else {
        i + 1
    }
}

/// Twice the signed area of triangle `abc`
#[inline]
pub(crate) fn area2(a: &[i32], b: &[i32], c: &[i32]) -> i32 {
    (b[0] - a[0]) * (c[2] - a[2]) - (c[0] - a[0]) * (b[2] - a[2])
}

/// True if `c` is strictly left of the directed line `ab`
#[inline]
pub(crate) fn left(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(crate) fn left_on(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
pub(crate) fn collinear(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) == 0
}

/// True if segments `ab` and `cd` intersect properly, sharing a point interior to both
pub(crate) fn intersect_prop(a: &[i32], b: &[i32], c: &[i32], d: &[i32]) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// True if `c` lies on the closed segment `ab`, given the three are collinear
fn between(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a[0] != b[0] {
        (a[0] <= c[0] && c[0] <= b[0]) || (a[0] >= c[0] && c[0] >= b[0])
    } else {
        (a[2] <= c[2] && c[2] <= b[2]) || (a[2] >= c[2] && c[2] >= b[2])
    }
}

/// True if segments `ab` and `cd` intersect, properly or improperly
pub(crate) fn intersect(a: &[i32], b: &[i32], c: &[i32], d: &[i32]) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

#[inline]
pub(crate) fn vequal_xz(a: &[i32], b: &[i32]) -> bool {
    a[0] == b[0] && a[2] == b[2]
}

/// Squared distance from `(x, z)` to the segment `p q` in the xz plane
pub(crate) fn distance_pt_seg_sqr(x: i32, z: i32, px: i32, pz: i32, qx: i32, qz: i32) -> f32 {
    let pqx = (qx - px) as f32;
    let pqz = (qz - pz) as f32;
    let mut dx = (x - px) as f32;
    let mut dz = (z - pz) as f32;
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    dx = px as f32 + t * pqx - x as f32;
    dz = pz as f32 + t * pqz - z as f32;
    dx * dx + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation() {
        let a = [0, 0, 0];
        let b = [0, 0, 1];
        assert!(left(&a, &b, &[1, 0, 0]));
        assert!(!left(&a, &b, &[-1, 0, 0]));
        assert!(left_on(&a, &b, &[0, 0, 2]));
        assert!(collinear(&a, &b, &[0, 0, 5]));
    }

    #[test]
    fn test_segment_intersection() {
        let a = [0, 0, 0];
        let b = [2, 0, 2];
        assert!(intersect(&a, &b, &[0, 0, 2], &[2, 0, 0]));
        assert!(!intersect(&a, &b, &[3, 0, 0], &[4, 0, 1]));
        // Touching at an endpoint counts.
        assert!(intersect(&a, &b, &[2, 0, 2], &[3, 0, 0]));
    }

    #[test]
    fn test_wrap_indices() {
        assert_eq!(prev(0, 4), 3);
        assert_eq!(next(3, 4), 0);
        assert_eq!(next(1, 4), 2);
    }

    #[test]
    fn test_distance_pt_seg() {
        assert_eq!(distance_pt_seg_sqr(1, 1, 0, 0, 2, 0), 1.0);
        assert_eq!(distance_pt_seg_sqr(4, 0, 0, 0, 2, 0), 4.0);
    }
}
