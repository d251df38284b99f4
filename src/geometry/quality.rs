//! Mesh quality criteria for surface facets and tetrahedral cells.
//!
//! The refinement engine asks two questions of every restricted element:
//! is it good enough, and if not, how bad is it? Both answers come from this
//! module. Criteria are pure functions of an element's geometry and the
//! configured [`MeshCriteria`], so they can be evaluated as often as needed.
//!
//! # Facet criteria
//!
//! - **Angle**: minimum interior angle of the facet triangle (degrees), a lower bound.
//! - **Size**: circumradius of the facet triangle, an upper bound.
//! - **Distance**: distance between the triangle's circumcenter and the facet's
//!   surface center (where its dual Voronoi edge crosses the surface), an upper bound.
//!
//! # Cell criteria
//!
//! - **Radius-edge ratio**: circumradius divided by the shortest edge, an upper bound.
//! - **Size**: circumradius, an upper bound.
//!
//! A bound that is not strictly positive disables its criterion.
//!
//! # Shape measures
//!
//! [`radius_ratio`] and [`normalized_volume`] are not refinement criteria;
//! they are reported in mesh statistics.
//!
//! # References
//!
//! - Shewchuk, J.R. "What Is a Good Linear Element? Interpolation, Conditioning,
//!   Anisotropy, and Quality Measures" (2002)
//! - Boissonnat, J.-D. and Oudot, S. "Provably good sampling and meshing of
//!   surfaces" *Graphical Models* 67.5 (2005): 405-451

use serde::{Deserialize, Serialize};

use crate::geometry::point::Point3;
use crate::geometry::util::{
    min_triangle_angle, shortest_edge, tetrahedron_circumcenter, tetrahedron_inradius,
    tetrahedron_volume, triangle_circumcenter, TET_EDGES,
};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Quality bounds for facets and cells.
///
/// The defaults reproduce the classic torus/sphere configuration:
/// 30° minimum facet angle, facet size 0.2, facet distance 0.02, cell
/// radius-edge ratio 2 and cell size 0.4.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::geometry::quality::{MeshCriteria, MeshCriteriaBuilder};
///
/// let criteria = MeshCriteriaBuilder::default()
///     .facet_angle(25.0)
///     .cell_size(0.8)
///     .build()
///     .unwrap();
/// assert_eq!(criteria.facet_angle, 25.0);
/// assert_eq!(criteria.facet_size, MeshCriteria::default().facet_size);
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct MeshCriteria {
    /// Lower bound on the minimum facet angle, in degrees.
    #[builder(default = "30.0")]
    pub facet_angle: f64,
    /// Upper bound on the facet circumradius.
    #[builder(default = "0.2")]
    pub facet_size: f64,
    /// Upper bound on the facet circumcenter to surface distance.
    #[builder(default = "0.02")]
    pub facet_distance: f64,
    /// Upper bound on the cell circumradius to shortest edge ratio.
    #[builder(default = "2.0")]
    pub cell_radius_edge_ratio: f64,
    /// Upper bound on the cell circumradius.
    #[builder(default = "0.4")]
    pub cell_size: f64,
}

impl Default for MeshCriteria {
    fn default() -> Self {
        Self {
            facet_angle: 30.0,
            facet_size: 0.2,
            facet_distance: 0.02,
            cell_radius_edge_ratio: 2.0,
            cell_size: 0.4,
        }
    }
}

impl MeshCriteriaBuilder {
    fn validate(&self) -> Result<(), String> {
        let fields = [
            ("facet_angle", self.facet_angle),
            ("facet_size", self.facet_size),
            ("facet_distance", self.facet_distance),
            ("cell_radius_edge_ratio", self.cell_radius_edge_ratio),
            ("cell_size", self.cell_size),
        ];
        for (name, value) in fields {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(format!("{name} must be finite, got {v}"));
            }
        }
        // Angles at or above 60° are unattainable for every triangle but the
        // equilateral one.
        if let Some(angle) = self.facet_angle
            && angle >= 60.0
        {
            return Err(format!("facet_angle must be below 60 degrees, got {angle}"));
        }
        Ok(())
    }
}

impl MeshCriteria {
    /// Returns `true` if a bound participates in refinement.
    #[inline]
    #[must_use]
    pub fn is_enabled(bound: f64) -> bool {
        bound > 0.0
    }

    /// Returns `true` if at least one facet criterion is active.
    #[must_use]
    pub fn has_facet_criteria(&self) -> bool {
        Self::is_enabled(self.facet_angle)
            || Self::is_enabled(self.facet_size)
            || Self::is_enabled(self.facet_distance)
    }

    /// Returns `true` if at least one cell criterion is active.
    #[must_use]
    pub fn has_cell_criteria(&self) -> bool {
        Self::is_enabled(self.cell_radius_edge_ratio) || Self::is_enabled(self.cell_size)
    }
}

// =============================================================================
// ELEMENT GEOMETRY
// =============================================================================

/// Geometry of a surface facet: its triangle and its surface center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FacetGeometry {
    pub vertices: [Point3; 3],
    pub surface_center: Point3,
}

/// Geometry of a tetrahedral cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellGeometry {
    pub vertices: [Point3; 4],
}

// =============================================================================
// VERDICTS AND CRITERIA
// =============================================================================

/// Outcome of evaluating one or more criteria against an element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    /// Every evaluated bound holds.
    Satisfied,
    /// At least one bound fails; `magnitude` is the largest relative excess.
    Violated {
        /// Relative excess over the bound, always positive
        magnitude: f64,
    },
}

impl Verdict {
    #[inline]
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// Violation magnitude, or `0` when satisfied.
    #[inline]
    #[must_use]
    pub const fn magnitude(&self) -> f64 {
        match self {
            Self::Satisfied => 0.0,
            Self::Violated { magnitude } => *magnitude,
        }
    }

    /// Combines two verdicts, keeping the worse one.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Satisfied, v) | (v, Self::Satisfied) => v,
            (Self::Violated { magnitude: a }, Self::Violated { magnitude: b }) => {
                Self::Violated {
                    magnitude: a.max(b),
                }
            }
        }
    }

    /// Verdict for an upper bound: `value <= bound`.
    fn upper_bound(value: f64, bound: f64) -> Self {
        if !MeshCriteria::is_enabled(bound) || value <= bound {
            Self::Satisfied
        } else {
            Self::Violated {
                magnitude: value / bound - 1.0,
            }
        }
    }

    /// Verdict for a lower bound: `value >= bound`.
    fn lower_bound(value: f64, bound: f64) -> Self {
        if !MeshCriteria::is_enabled(bound) || value >= bound {
            Self::Satisfied
        } else {
            Self::Violated {
                magnitude: 1.0 - value / bound,
            }
        }
    }

    /// Verdict for an element whose measure could not be computed.
    const fn unmeasurable() -> Self {
        Self::Violated {
            magnitude: f64::INFINITY,
        }
    }
}

/// A quality criterion over elements of type `E`.
pub trait Criterion<E> {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Evaluates the criterion. Must be pure and idempotent.
    fn evaluate(&self, element: &E, criteria: &MeshCriteria) -> Verdict;
}

/// Minimum facet angle.
#[derive(Clone, Copy, Debug, Default)]
pub struct FacetAngle;

/// Facet triangle circumradius.
#[derive(Clone, Copy, Debug, Default)]
pub struct FacetSize;

/// Distance between facet circumcenter and surface center.
#[derive(Clone, Copy, Debug, Default)]
pub struct FacetDistance;

/// Cell circumradius over shortest edge.
#[derive(Clone, Copy, Debug, Default)]
pub struct CellRadiusEdgeRatio;

/// Cell circumradius.
#[derive(Clone, Copy, Debug, Default)]
pub struct CellSize;

impl Criterion<FacetGeometry> for FacetAngle {
    fn name(&self) -> &'static str {
        "facet_angle"
    }

    fn evaluate(&self, facet: &FacetGeometry, criteria: &MeshCriteria) -> Verdict {
        let [a, b, c] = facet.vertices;
        Verdict::lower_bound(min_triangle_angle(a, b, c), criteria.facet_angle)
    }
}

impl Criterion<FacetGeometry> for FacetSize {
    fn name(&self) -> &'static str {
        "facet_size"
    }

    fn evaluate(&self, facet: &FacetGeometry, criteria: &MeshCriteria) -> Verdict {
        if !MeshCriteria::is_enabled(criteria.facet_size) {
            return Verdict::Satisfied;
        }
        let [a, b, c] = facet.vertices;
        triangle_circumcenter(a, b, c).map_or_else(
            |_| Verdict::unmeasurable(),
            |center| Verdict::upper_bound(center.distance(a), criteria.facet_size),
        )
    }
}

impl Criterion<FacetGeometry> for FacetDistance {
    fn name(&self) -> &'static str {
        "facet_distance"
    }

    fn evaluate(&self, facet: &FacetGeometry, criteria: &MeshCriteria) -> Verdict {
        if !MeshCriteria::is_enabled(criteria.facet_distance) {
            return Verdict::Satisfied;
        }
        let [a, b, c] = facet.vertices;
        triangle_circumcenter(a, b, c).map_or_else(
            |_| Verdict::unmeasurable(),
            |center| {
                Verdict::upper_bound(
                    center.distance(facet.surface_center),
                    criteria.facet_distance,
                )
            },
        )
    }
}

impl Criterion<CellGeometry> for CellRadiusEdgeRatio {
    fn name(&self) -> &'static str {
        "cell_radius_edge_ratio"
    }

    fn evaluate(&self, cell: &CellGeometry, criteria: &MeshCriteria) -> Verdict {
        if !MeshCriteria::is_enabled(criteria.cell_radius_edge_ratio) {
            return Verdict::Satisfied;
        }
        radius_edge_ratio(&cell.vertices).map_or_else(
            |_| Verdict::unmeasurable(),
            |ratio| Verdict::upper_bound(ratio, criteria.cell_radius_edge_ratio),
        )
    }
}

impl Criterion<CellGeometry> for CellSize {
    fn name(&self) -> &'static str {
        "cell_size"
    }

    fn evaluate(&self, cell: &CellGeometry, criteria: &MeshCriteria) -> Verdict {
        if !MeshCriteria::is_enabled(criteria.cell_size) {
            return Verdict::Satisfied;
        }
        tetrahedron_circumcenter(&cell.vertices).map_or_else(
            |_| Verdict::unmeasurable(),
            |center| Verdict::upper_bound(center.distance(cell.vertices[0]), criteria.cell_size),
        )
    }
}

/// All facet criteria, in evaluation order.
pub const FACET_CRITERIA: [&dyn Criterion<FacetGeometry>; 3] =
    [&FacetAngle, &FacetSize, &FacetDistance];

/// All cell criteria, in evaluation order.
pub const CELL_CRITERIA: [&dyn Criterion<CellGeometry>; 2] = [&CellRadiusEdgeRatio, &CellSize];

/// Evaluates every facet criterion and returns the worst verdict.
#[must_use]
pub fn evaluate_facet(facet: &FacetGeometry, criteria: &MeshCriteria) -> Verdict {
    FACET_CRITERIA
        .iter()
        .fold(Verdict::Satisfied, |acc, c| acc.worst(c.evaluate(facet, criteria)))
}

/// Evaluates every cell criterion and returns the worst verdict.
#[must_use]
pub fn evaluate_cell(cell: &CellGeometry, criteria: &MeshCriteria) -> Verdict {
    CELL_CRITERIA
        .iter()
        .fold(Verdict::Satisfied, |acc, c| acc.worst(c.evaluate(cell, criteria)))
}

/// Names of the facet criteria that `facet` violates.
#[must_use]
pub fn violated_facet_criteria(facet: &FacetGeometry, criteria: &MeshCriteria) -> Vec<&'static str> {
    FACET_CRITERIA
        .iter()
        .filter(|c| !c.evaluate(facet, criteria).is_satisfied())
        .map(|c| c.name())
        .collect()
}

/// Names of the cell criteria that `cell` violates.
#[must_use]
pub fn violated_cell_criteria(cell: &CellGeometry, criteria: &MeshCriteria) -> Vec<&'static str> {
    CELL_CRITERIA
        .iter()
        .filter(|c| !c.evaluate(cell, criteria).is_satisfied())
        .map(|c| c.name())
        .collect()
}

// =============================================================================
// SHAPE MEASURES
// =============================================================================

/// Errors that can occur during quality metric computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QualityError {
    /// Cell is degenerate (zero or near-zero volume)
    #[error("Degenerate cell with {measure}")]
    DegenerateCell {
        /// Description of the vanishing measure
        measure: String,
    },
    /// Numerical computation failed
    #[error("Numerical error: {message}")]
    NumericalError {
        /// Description of the numerical issue
        message: String,
    },
}

/// Circumradius divided by shortest edge length.
///
/// A regular tetrahedron has ratio `√6 / 4 ≈ 0.612`.
///
/// # Errors
///
/// Returns `QualityError` if the tetrahedron is flat or has a zero-length edge.
pub fn radius_edge_ratio(points: &[Point3; 4]) -> Result<f64, QualityError> {
    let center = tetrahedron_circumcenter(points).map_err(|e| QualityError::NumericalError {
        message: format!("Circumcenter computation failed: {e}"),
    })?;
    let edge = shortest_edge(points);
    if edge == 0.0 {
        return Err(QualityError::DegenerateCell {
            measure: "zero-length edge".to_string(),
        });
    }
    Ok(center.distance(points[0]) / edge)
}

/// Circumradius divided by inradius. A regular tetrahedron has ratio `3`,
/// the minimum.
///
/// # Errors
///
/// Returns `QualityError` if the tetrahedron is degenerate.
pub fn radius_ratio(points: &[Point3; 4]) -> Result<f64, QualityError> {
    let center = tetrahedron_circumcenter(points).map_err(|e| QualityError::NumericalError {
        message: format!("Circumcenter computation failed: {e}"),
    })?;
    let inradius = tetrahedron_inradius(points);
    if inradius < 1e-12 * shortest_edge(points) || inradius == 0.0 {
        return Err(QualityError::DegenerateCell {
            measure: format!("inradius={inradius:e}"),
        });
    }
    Ok(center.distance(points[0]) / inradius)
}

/// Volume normalized by the cube of the mean edge length, scaled so that a
/// regular tetrahedron scores `1`.
///
/// # Errors
///
/// Returns `QualityError` if every edge has zero length.
pub fn normalized_volume(points: &[Point3; 4]) -> Result<f64, QualityError> {
    let mean_edge = TET_EDGES
        .iter()
        .map(|&(i, j)| points[i].distance(points[j]))
        .sum::<f64>()
        / 6.0;
    if mean_edge == 0.0 {
        return Err(QualityError::DegenerateCell {
            measure: "zero mean edge length".to_string(),
        });
    }
    Ok(tetrahedron_volume(points) * 6.0 * 2.0_f64.sqrt() / mean_edge.powi(3))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn regular_tet(scale: f64) -> [Point3; 4] {
        [
            Point3::new(1.0, 1.0, 1.0) * scale,
            Point3::new(1.0, -1.0, -1.0) * scale,
            Point3::new(-1.0, 1.0, -1.0) * scale,
            Point3::new(-1.0, -1.0, 1.0) * scale,
        ]
    }

    fn equilateral_facet(edge: f64) -> FacetGeometry {
        let h = edge * 3.0_f64.sqrt() / 2.0;
        let vertices = [
            Point3::ORIGIN,
            Point3::new(edge, 0.0, 0.0),
            Point3::new(edge / 2.0, h, 0.0),
        ];
        let center = triangle_circumcenter(vertices[0], vertices[1], vertices[2]).unwrap();
        FacetGeometry {
            vertices,
            surface_center: center,
        }
    }

    // =============================================================================
    // CONFIGURATION TESTS
    // =============================================================================

    #[test]
    fn test_default_criteria_values() {
        let criteria = MeshCriteria::default();
        assert_relative_eq!(criteria.facet_angle, 30.0);
        assert_relative_eq!(criteria.facet_size, 0.2);
        assert_relative_eq!(criteria.facet_distance, 0.02);
        assert_relative_eq!(criteria.cell_radius_edge_ratio, 2.0);
        assert_relative_eq!(criteria.cell_size, 0.4);
        assert_eq!(MeshCriteriaBuilder::default().build().unwrap(), criteria);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(MeshCriteriaBuilder::default().facet_angle(75.0).build().is_err());
        assert!(MeshCriteriaBuilder::default().cell_size(f64::NAN).build().is_err());
        // Zero disables a bound and is accepted.
        let criteria = MeshCriteriaBuilder::default().facet_size(0.0).build().unwrap();
        assert!(!MeshCriteria::is_enabled(criteria.facet_size));
        assert!(criteria.has_facet_criteria());
    }

    #[test]
    fn test_criteria_serde_roundtrip() {
        let criteria = MeshCriteria::default();
        let json = serde_json::to_string(&criteria).unwrap();
        let back: MeshCriteria = serde_json::from_str(&json).unwrap();
        assert_eq!(criteria, back);
    }

    // =============================================================================
    // FACET CRITERIA TESTS
    // =============================================================================

    #[test]
    fn test_equilateral_facet_passes_angle() {
        let facet = equilateral_facet(0.1);
        let verdict = FacetAngle.evaluate(&facet, &MeshCriteria::default());
        assert!(verdict.is_satisfied());
    }

    #[test]
    fn test_skinny_facet_fails_angle_with_magnitude() {
        let facet = FacetGeometry {
            vertices: [
                Point3::ORIGIN,
                Point3::new(0.1, 0.0, 0.0),
                Point3::new(0.05, 0.005, 0.0),
            ],
            surface_center: Point3::new(0.05, 0.0, 0.0),
        };
        let criteria = MeshCriteria::default();
        let verdict = FacetAngle.evaluate(&facet, &criteria);
        assert!(!verdict.is_satisfied());
        assert!(verdict.magnitude() > 0.0 && verdict.magnitude() <= 1.0);
        assert!(violated_facet_criteria(&facet, &criteria).contains(&"facet_angle"));
    }

    #[test]
    fn test_facet_size_uses_circumradius() {
        // Circumradius of an equilateral triangle with edge a is a / √3.
        let facet = equilateral_facet(0.5);
        let criteria = MeshCriteria::default();
        let verdict = FacetSize.evaluate(&facet, &criteria);
        let expected = (0.5 / 3.0_f64.sqrt()) / 0.2 - 1.0;
        assert_relative_eq!(verdict.magnitude(), expected, epsilon = 1e-12);

        let small = equilateral_facet(0.3);
        assert!(FacetSize.evaluate(&small, &criteria).is_satisfied());
    }

    #[test]
    fn test_facet_distance() {
        let mut facet = equilateral_facet(0.1);
        let criteria = MeshCriteria::default();
        assert!(FacetDistance.evaluate(&facet, &criteria).is_satisfied());

        facet.surface_center = facet.surface_center + Point3::new(0.0, 0.0, 0.04);
        let verdict = FacetDistance.evaluate(&facet, &criteria);
        assert_relative_eq!(verdict.magnitude(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disabled_facet_criteria() {
        let facet = FacetGeometry {
            vertices: [
                Point3::ORIGIN,
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(5.0, 0.1, 0.0),
            ],
            surface_center: Point3::new(0.0, 0.0, 50.0),
        };
        let criteria = MeshCriteria {
            facet_angle: 0.0,
            facet_size: 0.0,
            facet_distance: -1.0,
            ..MeshCriteria::default()
        };
        assert!(evaluate_facet(&facet, &criteria).is_satisfied());
        assert!(!criteria.has_facet_criteria());
    }

    // =============================================================================
    // CELL CRITERIA TESTS
    // =============================================================================

    #[test]
    fn test_regular_cell_ratio() {
        let tet = regular_tet(1.0);
        assert_relative_eq!(
            radius_edge_ratio(&tet).unwrap(),
            6.0_f64.sqrt() / 4.0,
            epsilon = 1e-12
        );
        let cell = CellGeometry { vertices: tet };
        assert!(CellRadiusEdgeRatio
            .evaluate(&cell, &MeshCriteria::default())
            .is_satisfied());
    }

    #[test]
    fn test_sliver_fails_radius_edge_ratio() {
        let sliver = CellGeometry {
            vertices: [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 0.9, 0.0),
                Point3::new(0.5, 0.3, 0.001),
            ],
        };
        let criteria = MeshCriteria {
            cell_size: 0.0,
            ..MeshCriteria::default()
        };
        let verdict = evaluate_cell(&sliver, &criteria);
        assert!(!verdict.is_satisfied());
        assert_eq!(
            violated_cell_criteria(&sliver, &criteria),
            vec!["cell_radius_edge_ratio"]
        );
    }

    #[test]
    fn test_cell_size() {
        // Circumradius of regular_tet(s) is s√3.
        let criteria = MeshCriteria::default();
        let small = CellGeometry {
            vertices: regular_tet(0.2),
        };
        assert!(CellSize.evaluate(&small, &criteria).is_satisfied());

        let large = CellGeometry {
            vertices: regular_tet(1.0),
        };
        let verdict = CellSize.evaluate(&large, &criteria);
        assert_relative_eq!(verdict.magnitude(), 3.0_f64.sqrt() / 0.4 - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_verdict_worst() {
        let a = Verdict::Violated { magnitude: 0.5 };
        let b = Verdict::Violated { magnitude: 2.0 };
        assert_eq!(a.worst(b), b);
        assert_eq!(Verdict::Satisfied.worst(a), a);
        assert_eq!(Verdict::Satisfied.worst(Verdict::Satisfied), Verdict::Satisfied);
    }

    // =============================================================================
    // SHAPE MEASURE TESTS
    // =============================================================================

    #[test]
    fn test_shape_measures_regular() {
        let tet = regular_tet(2.5);
        assert_relative_eq!(radius_ratio(&tet).unwrap(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(normalized_volume(&tet).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_shape_measures_degenerate() {
        let flat = [
            Point3::ORIGIN,
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        assert!(radius_ratio(&flat).is_err());
        assert_relative_eq!(normalized_volume(&flat).unwrap(), 0.0);
        assert!(normalized_volume(&[Point3::ORIGIN; 4]).is_err());
    }
}
