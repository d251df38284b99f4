//! Scalar domain functions.
//!
//! A [`ScalarFunction`] maps a point to a real value whose zero level-set is
//! a surface. Any `Fn(Point3) -> f64` closure is a scalar function; the two
//! analytic shapes used by the torus/sphere configuration are provided as
//! [`SphereFunction`] and [`TorusFunction`]. Both are negative inside their
//! shape and positive outside.

use serde::{Deserialize, Serialize};

use crate::geometry::point::Point3;

/// A deterministic scalar field over 3D space.
///
/// Implementations must be pure: evaluating the same point twice yields the
/// same value. The mesher evaluates functions from a single thread, but
/// requires `Send + Sync` so that domains can be shared across threads by
/// callers.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::domain::function::ScalarFunction;
/// use implicit_mesh::geometry::point::Point3;
///
/// let plane = |p: Point3| p.z();
/// assert_eq!(plane.evaluate(Point3::new(0.0, 0.0, -2.0)), -2.0);
/// ```
pub trait ScalarFunction: Send + Sync {
    /// Evaluates the field at `point`.
    fn evaluate(&self, point: Point3) -> f64;
}

impl<F> ScalarFunction for F
where
    F: Fn(Point3) -> f64 + Send + Sync,
{
    #[inline]
    fn evaluate(&self, point: Point3) -> f64 {
        self(point)
    }
}

/// Normalized sphere function `|p - c|² / r² - 1`.
///
/// Takes the *squared* radius, so `SphereFunction::new(Point3::ORIGIN, 3.0)`
/// is the sphere of radius `√3`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SphereFunction {
    center: Point3,
    squared_radius: f64,
}

impl SphereFunction {
    #[must_use]
    pub const fn new(center: Point3, squared_radius: f64) -> Self {
        Self {
            center,
            squared_radius,
        }
    }

    /// Sphere centered at the origin.
    #[must_use]
    pub const fn centered(squared_radius: f64) -> Self {
        Self::new(Point3::ORIGIN, squared_radius)
    }

    #[must_use]
    pub const fn center(&self) -> Point3 {
        self.center
    }

    #[must_use]
    pub const fn squared_radius(&self) -> f64 {
        self.squared_radius
    }
}

impl ScalarFunction for SphereFunction {
    #[inline]
    fn evaluate(&self, point: Point3) -> f64 {
        point.distance_squared(self.center) / self.squared_radius - 1.0
    }
}

/// Quartic torus function centered at the origin with the y axis as its axis
/// of revolution:
///
/// `(|p|² + R² - r²)² - 4 R² (x² + z²)`
///
/// With the default radii `R = 1.5`, `r = 0.5` this expands to
/// `x⁴ + y⁴ + z⁴ + 2x²y² + 2x²z² + 2y²z² - 5x² + 4y² - 5z² + 4`.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::domain::function::{ScalarFunction, TorusFunction};
/// use implicit_mesh::geometry::point::Point3;
///
/// let torus = TorusFunction::default();
/// // On the tube's center circle.
/// assert!(torus.evaluate(Point3::new(1.5, 0.0, 0.0)) < 0.0);
/// // At the origin, in the hole.
/// assert!(torus.evaluate(Point3::ORIGIN) > 0.0);
/// // On the outer equator.
/// assert_eq!(torus.evaluate(Point3::new(2.0, 0.0, 0.0)), 0.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TorusFunction {
    major_radius: f64,
    minor_radius: f64,
}

impl TorusFunction {
    #[must_use]
    pub const fn new(major_radius: f64, minor_radius: f64) -> Self {
        Self {
            major_radius,
            minor_radius,
        }
    }

    #[must_use]
    pub const fn major_radius(&self) -> f64 {
        self.major_radius
    }

    #[must_use]
    pub const fn minor_radius(&self) -> f64 {
        self.minor_radius
    }
}

impl Default for TorusFunction {
    fn default() -> Self {
        Self::new(1.5, 0.5)
    }
}

impl ScalarFunction for TorusFunction {
    #[inline]
    fn evaluate(&self, point: Point3) -> f64 {
        let big2 = self.major_radius * self.major_radius;
        let small2 = self.minor_radius * self.minor_radius;
        let s = point.norm_squared() + big2 - small2;
        let radial2 = point.x().mul_add(point.x(), point.z() * point.z());
        s.mul_add(s, -4.0 * big2 * radial2)
    }
}

// =============================================================================
// TESTS
// =============================================================================
