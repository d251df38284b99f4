//! Three-dimensional points.
//!
//! [`Point3`] is the only coordinate type used by the mesher. It is an
//! immutable `Copy` value: every operation returns a new point. Vector
//! arithmetic is provided through the standard operator traits so that the
//! geometric code reads like the formulas it implements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

// =============================================================================
// POINT STRUCT DEFINITION
// =============================================================================

/// A point (or free vector) in three-dimensional Euclidean space.
///
/// Coordinates are private so that a point cannot be modified after it is
/// created; use [`Point3::new`] or the arithmetic operators to derive new
/// points.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::geometry::point::Point3;
///
/// let a = Point3::new(1.0, 2.0, 2.0);
/// assert_eq!(a.norm(), 3.0);
/// assert_eq!(a - a, Point3::ORIGIN);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Point3 {
    /// The origin `(0, 0, 0)`.
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a point from its three coordinates.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The x coordinate.
    #[inline]
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// The y coordinate.
    #[inline]
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }

    /// The z coordinate.
    #[inline]
    #[must_use]
    pub const fn z(&self) -> f64 {
        self.z
    }

    /// Coordinates as an array, in `[x, y, z]` order.
    #[inline]
    #[must_use]
    pub const fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns `true` if all three coordinates are finite.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    #[inline]
    #[must_use]
    pub fn dot(&self, other: Self) -> f64 {
        self.x.mul_add(other.x, self.y.mul_add(other.y, self.z * other.z))
    }

    #[inline]
    #[must_use]
    pub fn cross(&self, other: Self) -> Self {
        Self::new(
            self.y.mul_add(other.z, -(self.z * other.y)),
            self.z.mul_add(other.x, -(self.x * other.z)),
            self.x.mul_add(other.y, -(self.y * other.x)),
        )
    }

    #[inline]
    #[must_use]
    pub fn norm_squared(&self) -> f64 {
        self.dot(*self)
    }

    #[inline]
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: Self) -> f64 {
        (*self - other).norm_squared()
    }

    #[inline]
    #[must_use]
    pub fn distance(&self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation: `t = 0` yields `self`, `t = 1` yields `other`.
    #[inline]
    #[must_use]
    pub fn lerp(&self, other: Self, t: f64) -> Self {
        *self + (other - *self) * t
    }

    #[inline]
    #[must_use]
    pub fn midpoint(&self, other: Self) -> Self {
        self.lerp(other, 0.5)
    }

    /// Arithmetic mean of a non-empty slice of points.
    ///
    /// Returns `None` for an empty slice.
    #[must_use]
    pub fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let sum = points.iter().fold(Self::ORIGIN, |acc, &p| acc + p);
        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        Some(sum / n)
    }
}

// =============================================================================
// OPERATOR IMPLEMENTATIONS
// =============================================================================

impl Add for Point3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Point3 {
    type Output = Self;

    #[inline]
    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Point3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl From<[f64; 3]> for Point3 {
    #[inline]
    fn from(coords: [f64; 3]) -> Self {
        Self::new(coords[0], coords[1], coords[2])
    }
}

impl From<Point3> for [f64; 3] {
    #[inline]
    fn from(point: Point3) -> Self {
        point.coords()
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_accessors_and_conversions() {
        let p = Point3::new(1.0, -2.0, 3.5);
        assert_relative_eq!(p.x(), 1.0);
        assert_relative_eq!(p.y(), -2.0);
        assert_relative_eq!(p.z(), 3.5);
        assert_eq!(p.coords(), [1.0, -2.0, 3.5]);

        let arr: [f64; 3] = p.into();
        assert_eq!(Point3::from(arr), p);
    }

    #[test]
    fn test_point_vector_algebra() {
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 1.0, 0.0);

        assert_relative_eq!(a.dot(b), 0.0);
        assert_eq!(a.cross(b), Point3::new(0.0, 0.0, 1.0));
        assert_eq!(b.cross(a), Point3::new(0.0, 0.0, -1.0));
        assert_eq!(a + b - b, a);
        assert_eq!(-a, Point3::new(-1.0, 0.0, 0.0));
        assert_eq!((a + b) * 2.0 / 2.0, a + b);
    }

    #[test]
    fn test_point_distances() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(4.0, 6.0, 3.0);
        assert_relative_eq!(a.distance(b), 5.0);
        assert_relative_eq!(a.distance_squared(b), 25.0);
        assert_relative_eq!(Point3::new(2.0, 3.0, 6.0).norm(), 7.0);
    }

    #[test]
    fn test_point_interpolation_and_centroid() {
        let a = Point3::ORIGIN;
        let b = Point3::new(2.0, 4.0, -2.0);
        assert_eq!(a.midpoint(b), Point3::new(1.0, 2.0, -1.0));
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);

        let centroid = Point3::centroid(&[a, b, Point3::new(1.0, -1.0, 5.0)]).unwrap();
        assert_relative_eq!(centroid.x(), 1.0);
        assert_relative_eq!(centroid.y(), 1.0);
        assert_relative_eq!(centroid.z(), 1.0);
        assert!(Point3::centroid(&[]).is_none());
    }

    #[test]
    fn test_point_finiteness() {
        assert!(Point3::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Point3::new(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!Point3::new(0.0, f64::INFINITY, 0.0).is_finite());
    }

    #[test]
    fn test_point_serde_roundtrip() {
        let p = Point3::new(0.25, -1.5, 8.0);
        let json = serde_json::to_string(&p).unwrap();
        let back: Point3 = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
