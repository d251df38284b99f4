//! Exact geometric predicates for tetrahedra.
//!
//! Orientation and in-sphere tests are evaluated with Shewchuk's adaptive
//! exact arithmetic (via the [`robust`] crate), so the sign of every
//! predicate is correct even for nearly degenerate configurations. The
//! triangulation relies on this: conflict regions computed from these signs
//! are always star-shaped with respect to the inserted point.
//!
//! # Conventions
//!
//! A tetrahedron `(a, b, c, d)` is [`Orientation::POSITIVE`] when its signed
//! volume `((b - a) × (c - a)) · (d - a) / 6` is positive. Every cell stored
//! in the triangulation is positively oriented.

use crate::geometry::point::Point3;
use robust::Coord3D;

/// Represents the position of a point relative to a circumsphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InSphere {
    /// The point is outside the circumsphere
    OUTSIDE,
    /// The point lies exactly on the circumsphere
    BOUNDARY,
    /// The point is inside the circumsphere
    INSIDE,
}

impl std::fmt::Display for InSphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

/// Represents the orientation of a tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Negative signed volume
    NEGATIVE,
    /// The four points are exactly coplanar
    DEGENERATE,
    /// Positive signed volume
    POSITIVE,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

#[inline]
const fn coord(p: Point3) -> Coord3D<f64> {
    Coord3D {
        x: p.x(),
        y: p.y(),
        z: p.z(),
    }
}

/// Shewchuk's `orient3d` determinant. Its sign is the opposite of the signed
/// volume convention used by [`simplex_orientation`].
#[inline]
fn orient3d_raw(a: Point3, b: Point3, c: Point3, d: Point3) -> f64 {
    robust::orient3d(coord(a), coord(b), coord(c), coord(d))
}

/// Determines the orientation of the tetrahedron `(a, b, c, d)`.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::geometry::point::Point3;
/// use implicit_mesh::geometry::predicates::{Orientation, simplex_orientation};
///
/// let o = Point3::ORIGIN;
/// let x = Point3::new(1.0, 0.0, 0.0);
/// let y = Point3::new(0.0, 1.0, 0.0);
/// let z = Point3::new(0.0, 0.0, 1.0);
/// assert_eq!(simplex_orientation(o, x, y, z), Orientation::POSITIVE);
/// assert_eq!(simplex_orientation(o, y, x, z), Orientation::NEGATIVE);
/// ```
#[must_use]
pub fn simplex_orientation(a: Point3, b: Point3, c: Point3, d: Point3) -> Orientation {
    let det = orient3d_raw(a, b, c, d);
    if det < 0.0 {
        Orientation::POSITIVE
    } else if det > 0.0 {
        Orientation::NEGATIVE
    } else {
        Orientation::DEGENERATE
    }
}

/// Tests whether `query` lies inside the circumsphere of the tetrahedron
/// `simplex`, independent of the tetrahedron's orientation.
///
/// A degenerate (flat) tetrahedron has no circumsphere; every query is then
/// reported as [`InSphere::BOUNDARY`].
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::geometry::point::Point3;
/// use implicit_mesh::geometry::predicates::{InSphere, insphere};
///
/// let tet = [
///     Point3::ORIGIN,
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// assert_eq!(insphere(&tet, Point3::new(0.25, 0.25, 0.25)), InSphere::INSIDE);
/// assert_eq!(insphere(&tet, Point3::new(2.0, 2.0, 2.0)), InSphere::OUTSIDE);
/// assert_eq!(insphere(&tet, Point3::new(1.0, 1.0, 1.0)), InSphere::BOUNDARY);
/// ```
#[must_use]
pub fn insphere(simplex: &[Point3; 4], query: Point3) -> InSphere {
    let [a, b, c, d] = *simplex;
    let orientation = orient3d_raw(a, b, c, d);
    if orientation == 0.0 {
        return InSphere::BOUNDARY;
    }
    let det = robust::insphere(coord(a), coord(b), coord(c), coord(d), coord(query));
    // Shewchuk's insphere is positive for "inside" when orient3d is positive.
    let normalized = det * orientation.signum();
    if normalized > 0.0 {
        InSphere::INSIDE
    } else if normalized < 0.0 {
        InSphere::OUTSIDE
    } else {
        InSphere::BOUNDARY
    }
}

/// Signed volume of the tetrahedron `(a, b, c, d)` in floating point.
///
/// Use [`simplex_orientation`] when only the sign matters.
#[must_use]
pub fn signed_volume(a: Point3, b: Point3, c: Point3, d: Point3) -> f64 {
    (b - a).cross(c - a).dot(d - a) / 6.0
}

// =============================================================================
// TESTS
// =============================================================================
