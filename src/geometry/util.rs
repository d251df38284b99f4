//! Geometric utility functions for triangles and tetrahedra.
//!
//! Circumcenters, angles, edge lengths and the volume/area measures used by
//! the quality criteria and the triangulation. Everything here is a pure
//! function of its input points.

use nalgebra::{Matrix3, Vector3};

use crate::geometry::point::Point3;
use crate::geometry::predicates::signed_volume;

/// Vertex index pairs of the six edges of a tetrahedron.
pub const TET_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Errors that can occur while computing circumscribed spheres.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CircumcenterError {
    /// The simplex is flat (collinear triangle or coplanar tetrahedron).
    #[error("Degenerate simplex: {details}")]
    DegenerateSimplex {
        /// Description of the degeneracy
        details: String,
    },

    /// The computation produced a non-finite coordinate.
    #[error("Non-finite circumcenter {center}")]
    NonFinite {
        /// The offending center
        center: Point3,
    },
}

/// Circumcenter of the triangle `(a, b, c)`, lying in the triangle's plane.
///
/// # Errors
///
/// Returns [`CircumcenterError::DegenerateSimplex`] if the three points are
/// collinear.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::geometry::point::Point3;
/// use implicit_mesh::geometry::util::triangle_circumcenter;
///
/// let c = triangle_circumcenter(
///     Point3::ORIGIN,
///     Point3::new(2.0, 0.0, 0.0),
///     Point3::new(0.0, 2.0, 0.0),
/// )
/// .unwrap();
/// assert_eq!(c, Point3::new(1.0, 1.0, 0.0));
/// ```
pub fn triangle_circumcenter(a: Point3, b: Point3, c: Point3) -> Result<Point3, CircumcenterError> {
    let ab = b - a;
    let ac = c - a;
    let normal = ab.cross(ac);
    let denom = 2.0 * normal.norm_squared();
    if denom == 0.0 {
        return Err(CircumcenterError::DegenerateSimplex {
            details: format!("collinear triangle {a} {b} {c}"),
        });
    }
    let offset = (normal.cross(ab) * ac.norm_squared() + ac.cross(normal) * ab.norm_squared()) / denom;
    let center = a + offset;
    if center.is_finite() {
        Ok(center)
    } else {
        Err(CircumcenterError::NonFinite { center })
    }
}

/// Circumradius of the triangle `(a, b, c)`.
///
/// # Errors
///
/// Propagates [`triangle_circumcenter`] errors.
pub fn triangle_circumradius(a: Point3, b: Point3, c: Point3) -> Result<f64, CircumcenterError> {
    triangle_circumcenter(a, b, c).map(|center| center.distance(a))
}

/// Circumcenter of the tetrahedron `points`.
///
/// Solves the 3×3 linear system `2 (p_i - p_0) · x = |p_i|² - |p_0|²` relative
/// to `p_0` with an LU decomposition.
///
/// # Errors
///
/// Returns [`CircumcenterError::DegenerateSimplex`] for coplanar points and
/// [`CircumcenterError::NonFinite`] if the solve overflows.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::geometry::point::Point3;
/// use implicit_mesh::geometry::util::tetrahedron_circumcenter;
///
/// let tet = [
///     Point3::ORIGIN,
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// let c = tetrahedron_circumcenter(&tet).unwrap();
/// assert!((c.x() - 0.5).abs() < 1e-12);
/// ```
pub fn tetrahedron_circumcenter(points: &[Point3; 4]) -> Result<Point3, CircumcenterError> {
    let origin = points[0];
    let rel = [points[1] - origin, points[2] - origin, points[3] - origin];
    let matrix = Matrix3::new(
        rel[0].x(),
        rel[0].y(),
        rel[0].z(),
        rel[1].x(),
        rel[1].y(),
        rel[1].z(),
        rel[2].x(),
        rel[2].y(),
        rel[2].z(),
    );
    let rhs = Vector3::new(
        0.5 * rel[0].norm_squared(),
        0.5 * rel[1].norm_squared(),
        0.5 * rel[2].norm_squared(),
    );

    let solution = matrix
        .lu()
        .solve(&rhs)
        .ok_or_else(|| CircumcenterError::DegenerateSimplex {
            details: format!(
                "singular circumcenter system for tetrahedron with volume {:e}",
                signed_volume(points[0], points[1], points[2], points[3])
            ),
        })?;

    let center = origin + Point3::new(solution[0], solution[1], solution[2]);
    if center.is_finite() {
        Ok(center)
    } else {
        Err(CircumcenterError::NonFinite { center })
    }
}

/// Interior angles of the triangle `(a, b, c)` in degrees, by the law of
/// cosines. Entry `i` is the angle at the `i`-th vertex.
///
/// A triangle with a zero-length edge has all angles reported as `0`.
#[must_use]
pub fn triangle_angles(a: Point3, b: Point3, c: Point3) -> [f64; 3] {
    let la2 = b.distance_squared(c);
    let lb2 = a.distance_squared(c);
    let lc2 = a.distance_squared(b);
    if la2 == 0.0 || lb2 == 0.0 || lc2 == 0.0 {
        return [0.0; 3];
    }
    let angle = |opposite2: f64, s1: f64, s2: f64| -> f64 {
        let cos = (s1 + s2 - opposite2) / (2.0 * (s1 * s2).sqrt());
        cos.clamp(-1.0, 1.0).acos().to_degrees()
    };
    [
        angle(la2, lb2, lc2),
        angle(lb2, la2, lc2),
        angle(lc2, la2, lb2),
    ]
}

/// Smallest interior angle of the triangle `(a, b, c)` in degrees.
#[must_use]
pub fn min_triangle_angle(a: Point3, b: Point3, c: Point3) -> f64 {
    triangle_angles(a, b, c)
        .into_iter()
        .fold(f64::INFINITY, f64::min)
}

#[must_use]
pub fn triangle_area(a: Point3, b: Point3, c: Point3) -> f64 {
    0.5 * (b - a).cross(c - a).norm()
}

/// Length of the shortest of the six edges of a tetrahedron.
#[must_use]
pub fn shortest_edge(points: &[Point3; 4]) -> f64 {
    TET_EDGES
        .iter()
        .map(|&(i, j)| points[i].distance_squared(points[j]))
        .fold(f64::INFINITY, f64::min)
        .sqrt()
}

/// Unsigned volume of a tetrahedron.
#[must_use]
pub fn tetrahedron_volume(points: &[Point3; 4]) -> f64 {
    signed_volume(points[0], points[1], points[2], points[3]).abs()
}

/// Inradius of a tetrahedron: `3 V / A` where `A` is the total face area.
///
/// Returns `0` for a flat tetrahedron.
#[must_use]
pub fn tetrahedron_inradius(points: &[Point3; 4]) -> f64 {
    let [a, b, c, d] = *points;
    let surface = triangle_area(b, c, d)
        + triangle_area(a, c, d)
        + triangle_area(a, b, d)
        + triangle_area(a, b, c);
    if surface == 0.0 {
        return 0.0;
    }
    3.0 * tetrahedron_volume(points) / surface
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn regular_tet() -> [Point3; 4] {
        [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ]
    }

    #[test]
    fn test_triangle_circumcenter_equidistant() {
        let a = Point3::new(0.3, -1.2, 2.0);
        let b = Point3::new(1.7, 0.4, -0.5);
        let c = Point3::new(-0.9, 2.2, 0.8);
        let center = triangle_circumcenter(a, b, c).unwrap();
        assert_relative_eq!(center.distance(a), center.distance(b), epsilon = 1e-12);
        assert_relative_eq!(center.distance(a), center.distance(c), epsilon = 1e-12);
        // Coplanar with the triangle.
        let normal = (b - a).cross(c - a);
        assert_relative_eq!(normal.dot(center - a), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_circumcenter_collinear_fails() {
        let result = triangle_circumcenter(
            Point3::ORIGIN,
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(2.0, 2.0, 2.0),
        );
        assert!(matches!(
            result,
            Err(CircumcenterError::DegenerateSimplex { .. })
        ));
    }

    #[test]
    fn test_tetrahedron_circumcenter_regular() {
        let tet = regular_tet();
        let center = tetrahedron_circumcenter(&tet).unwrap();
        assert_relative_eq!(center.norm(), 0.0, epsilon = 1e-12);
        for p in tet {
            assert_relative_eq!(center.distance(p), 3.0_f64.sqrt(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tetrahedron_circumcenter_coplanar_fails() {
        let flat = [
            Point3::ORIGIN,
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        assert!(tetrahedron_circumcenter(&flat).is_err());
    }

    #[test]
    fn test_triangle_angles_sum_to_180() {
        let angles = triangle_angles(
            Point3::ORIGIN,
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        );
        assert_relative_eq!(angles[0], 90.0, epsilon = 1e-10);
        assert_relative_eq!(angles.iter().sum::<f64>(), 180.0, epsilon = 1e-10);
    }

    #[test]
    fn test_min_angle_equilateral_and_degenerate() {
        let h = 3.0_f64.sqrt() / 2.0;
        let equilateral = min_triangle_angle(
            Point3::ORIGIN,
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, h, 0.0),
        );
        assert_relative_eq!(equilateral, 60.0, epsilon = 1e-9);

        let degenerate = min_triangle_angle(Point3::ORIGIN, Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(degenerate, 0.0);
    }

    #[test]
    fn test_tetrahedron_measures() {
        let tet = regular_tet();
        let edge = 8.0_f64.sqrt();
        assert_relative_eq!(shortest_edge(&tet), edge, epsilon = 1e-12);
        // V = a³ / (6√2)
        assert_relative_eq!(
            tetrahedron_volume(&tet),
            edge.powi(3) / (6.0 * 2.0_f64.sqrt()),
            epsilon = 1e-12
        );
        // Regular tetrahedron: R = 3 r.
        assert_relative_eq!(tetrahedron_inradius(&tet) * 3.0, 3.0_f64.sqrt(), epsilon = 1e-12);
    }
}
