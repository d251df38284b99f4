//! Incremental 3D Delaunay triangulation inside an enclosing simplex.
//!
//! [`Triangulation`] owns a [`Tds`] whose convex hull is a large regular
//! tetrahedron (the enclosing simplex) around the meshing region. Every
//! point inserted inside the bounding sphere is therefore interior to the
//! hull, and insertion never needs hull-extension logic. The four corner
//! vertices are [`VertexKind::Bounding`] and never appear in the output mesh.
//!
//! Insertion is Bowyer-Watson with exact predicates: locate, grow the
//! conflict region, re-cone the cavity
//! (see [`algorithms::insertion`](crate::core::algorithms::insertion)).

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::core::algorithms::insertion::{InsertionError, InsertionInfo, insert_into_cavity};
use crate::core::algorithms::locate::{
    LocateError, LocateResult, find_conflict_region, locate, locate_by_scan,
};
use crate::core::collections::CellKeyBuffer;
use crate::core::triangulation_data_structure::{CellKey, Tds, TdsValidationError, VertexKey};
use crate::core::util::delaunay_validation::{DelaunayValidationError, validate_delaunay};
use crate::core::vertex::{Vertex, VertexKind};
use crate::domain::labeled::LabeledDomain;
use crate::geometry::point::Point3;
use crate::geometry::predicates::{InSphere, Orientation, insphere, simplex_orientation};

/// Ratio between the enclosing simplex's inradius and the bounding radius.
pub const ENCLOSING_INRADIUS_FACTOR: f64 = 4.0;

/// Points closer than this fraction of the bounding radius to an existing
/// vertex are rejected as duplicates.
pub const DUPLICATE_TOLERANCE: f64 = 1e-10;

/// A Delaunay tetrahedralization with labeled cells.
#[derive(Clone, Debug)]
pub struct Triangulation {
    tds: Tds,
    bounding_vertices: [VertexKey; 4],
    center: Point3,
    radius: f64,
    hint: Option<CellKey>,
    rng_seed: u64,
    rng: StdRng,
}

impl Triangulation {
    /// Creates a triangulation holding only the enclosing simplex of the
    /// ball `(center, radius)`.
    ///
    /// # Errors
    ///
    /// Returns [`InsertionError::InvalidEnclosingSimplex`] if the radius is
    /// not positive and finite or the center is not finite.
    pub fn new(center: Point3, radius: f64, rng_seed: u64) -> Result<Self, InsertionError> {
        if !(radius.is_finite() && radius > 0.0) || !center.is_finite() {
            return Err(InsertionError::InvalidEnclosingSimplex { radius });
        }
        // Regular tetrahedron with vertices at s(±1, ±1, ±1) (even sign
        // count); its inradius is s / sqrt(3).
        let s = ENCLOSING_INRADIUS_FACTOR * 3.0_f64.sqrt() * radius;
        let mut corners = [
            center + Point3::new(s, s, s),
            center + Point3::new(s, -s, -s),
            center + Point3::new(-s, s, -s),
            center + Point3::new(-s, -s, s),
        ];
        if simplex_orientation(corners[0], corners[1], corners[2], corners[3])
            != Orientation::POSITIVE
        {
            corners.swap(2, 3);
        }
        if simplex_orientation(corners[0], corners[1], corners[2], corners[3])
            != Orientation::POSITIVE
        {
            return Err(InsertionError::InvalidEnclosingSimplex { radius });
        }

        let mut tds = Tds::new();
        let bounding_vertices =
            corners.map(|p| tds.insert_vertex(Vertex::new(p, VertexKind::Bounding)));
        let cell = tds
            .insert_cell(bounding_vertices)
            .ok_or(InsertionError::InvalidEnclosingSimplex { radius })?;
        for v in bounding_vertices {
            if let Some(vertex) = tds.vertex_mut(v) {
                vertex.incident_cell = Some(cell);
            }
        }
        Ok(Self {
            tds,
            bounding_vertices,
            center,
            radius,
            hint: Some(cell),
            rng_seed,
            rng: StdRng::seed_from_u64(rng_seed),
        })
    }

    /// An empty triangulation over the same ball and seed.
    ///
    /// # Errors
    ///
    /// Never fails for a triangulation built by [`Triangulation::new`].
    pub fn empty_like(&self) -> Result<Self, InsertionError> {
        Self::new(self.center, self.radius, self.rng_seed)
    }

    #[must_use]
    pub const fn tds(&self) -> &Tds {
        &self.tds
    }

    #[must_use]
    pub const fn center(&self) -> Point3 {
        self.center
    }

    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    #[must_use]
    pub const fn bounding_vertices(&self) -> &[VertexKey; 4] {
        &self.bounding_vertices
    }

    /// Number of vertices, including the four enclosing-simplex corners.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.tds.number_of_vertices()
    }

    /// Number of vertices excluding the enclosing-simplex corners.
    #[must_use]
    pub fn number_of_mesh_vertices(&self) -> usize {
        self.tds.number_of_vertices().saturating_sub(4)
    }

    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.tds.number_of_cells()
    }

    #[must_use]
    pub fn is_bounding_vertex(&self, key: VertexKey) -> bool {
        self.bounding_vertices.contains(&key)
    }

    /// Returns `true` if the cell has an enclosing-simplex corner.
    #[must_use]
    pub fn touches_bounding(&self, cell_key: CellKey) -> bool {
        self.tds
            .cell(cell_key)
            .is_some_and(|c| c.vertices().iter().any(|&v| self.is_bounding_vertex(v)))
    }

    /// Non-corner vertices in storage order.
    pub fn mesh_vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex)> {
        self.tds
            .vertices()
            .filter(|(_, v)| !v.kind().is_bounding())
    }

    /// Absolute distance under which two points are considered duplicates.
    #[must_use]
    pub fn duplicate_tolerance(&self) -> f64 {
        DUPLICATE_TOLERANCE * self.radius
    }

    // =========================================================================
    // LOCATION AND INSERTION
    // =========================================================================

    /// Locates `point`, walking from the last insertion and falling back to
    /// a full scan if the walk does not terminate.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError`] if the triangulation is corrupt.
    pub fn locate(&mut self, point: Point3) -> Result<LocateResult, LocateError> {
        match locate(&self.tds, point, self.hint, &mut self.rng) {
            Err(LocateError::CycleDetected { steps }) => {
                tracing::warn!(steps, %point, "walk did not terminate, scanning all cells");
                Ok(locate_by_scan(&self.tds, point))
            }
            result => result,
        }
    }

    /// Computes the conflict region of `point`: the cells whose
    /// circumspheres strictly contain it.
    ///
    /// # Errors
    ///
    /// Returns [`InsertionError::NonFinite`], [`InsertionError::OutsideBounds`]
    /// or [`InsertionError::DuplicateVertex`] for points that cannot be
    /// inserted, and location errors on corruption.
    pub fn conflict_region(&mut self, point: Point3) -> Result<CellKeyBuffer, InsertionError> {
        if !point.is_finite() {
            return Err(InsertionError::NonFinite { point });
        }
        let start = match self.locate(point)? {
            LocateResult::Outside => return Err(InsertionError::OutsideBounds { point }),
            LocateResult::OnVertex(existing) => {
                return Err(InsertionError::DuplicateVertex { point, existing });
            }
            LocateResult::InsideCell(c) | LocateResult::OnFacet(c, _) | LocateResult::OnEdge(c) => c,
        };
        self.hint = Some(start);

        let points = self
            .tds
            .cell_points(start)
            .ok_or(LocateError::InvalidCell { cell_key: start })?;
        if insphere(&points, point) != InSphere::INSIDE {
            // Only a vertex of the cell can be on its circumsphere and in it.
            return Err(InsertionError::DuplicateVertex {
                point,
                existing: self.nearest_vertex_of(start, point).unwrap_or(self.bounding_vertices[0]),
            });
        }

        let region = find_conflict_region(&self.tds, start, point)?;
        let tolerance2 = self.duplicate_tolerance().powi(2);
        for &cell_key in &region {
            let Some(cell) = self.tds.cell(cell_key) else {
                continue;
            };
            for &v in cell.vertices() {
                if self
                    .tds
                    .vertex_point(v)
                    .is_some_and(|p| p.distance_squared(point) < tolerance2)
                {
                    return Err(InsertionError::DuplicateVertex { point, existing: v });
                }
            }
        }
        Ok(region)
    }

    /// Inserts `point` given its conflict region from
    /// [`conflict_region`](Self::conflict_region), with no mutation in
    /// between.
    ///
    /// # Errors
    ///
    /// See [`insert_into_cavity`].
    pub fn insert_with_conflict_region(
        &mut self,
        point: Point3,
        kind: VertexKind,
        region: &[CellKey],
    ) -> Result<InsertionInfo, InsertionError> {
        let info = insert_into_cavity(&mut self.tds, point, kind, region)?;
        self.hint = info.new_cells.first().copied();
        Ok(info)
    }

    /// Inserts `point` with the given kind. New cells are labeled
    /// [`Outside`](crate::domain::multi_domain::SubdomainLabel::Outside)
    /// until the caller labels them.
    ///
    /// # Errors
    ///
    /// See [`conflict_region`](Self::conflict_region) and
    /// [`insert_into_cavity`].
    pub fn insert(&mut self, point: Point3, kind: VertexKind) -> Result<InsertionInfo, InsertionError> {
        let region = self.conflict_region(point)?;
        self.insert_with_conflict_region(point, kind, &region)
    }

    fn nearest_vertex_of(&self, cell_key: CellKey, point: Point3) -> Option<VertexKey> {
        let cell = self.tds.cell(cell_key)?;
        cell.vertices().iter().copied().min_by(|&a, &b| {
            let da = self.tds.vertex_point(a).map_or(f64::INFINITY, |p| p.distance_squared(point));
            let db = self.tds.vertex_point(b).map_or(f64::INFINITY, |p| p.distance_squared(point));
            da.total_cmp(&db)
        })
    }

    // =========================================================================
    // LABELS AND VALIDATION
    // =========================================================================

    /// Labels one cell by the domain label of its circumcenter.
    pub fn label_cell(&mut self, cell_key: CellKey, domain: &LabeledDomain) {
        if let Some(cell) = self.tds.cell_mut(cell_key) {
            cell.set_label(domain.label_at(cell.circumcenter()));
        }
    }

    /// Labels every cell by the domain label of its circumcenter.
    pub fn label_cells(&mut self, domain: &LabeledDomain) {
        for (_, cell) in self.tds.cells_mut() {
            cell.set_label(domain.label_at(cell.circumcenter()));
        }
    }

    /// Structural validation.
    ///
    /// # Errors
    ///
    /// Returns the first violated structural invariant.
    pub fn is_valid(&self) -> Result<(), TdsValidationError> {
        self.tds.is_valid()
    }

    /// Structural plus empty-circumsphere validation.
    ///
    /// # Errors
    ///
    /// Returns the first structural error or Delaunay violation.
    pub fn validate_delaunay(&self) -> Result<(), DelaunayValidationError> {
        validate_delaunay(&self.tds)
    }
}

// =============================================================================
// TESTS
// =============================================================================
