//! Cavity-based (Bowyer-Watson) vertex insertion.
//!
//! Given the conflict region of a new point (every cell whose circumsphere
//! strictly contains it), the region is removed and its boundary is
//! re-coned to the new vertex. Because the region is star-shaped from the
//! point, every new cell is positively oriented and the triangulation stays
//! Delaunay.
//!
//! All checks run before the first mutation, so a failed insertion leaves
//! the [`Tds`] untouched.

use crate::core::algorithms::locate::{ConflictError, LocateError, extract_cavity_boundary};
use crate::core::collections::{CellKeyBuffer, FastHashMap, fast_hash_map_with_capacity};
use crate::core::facet::FacetHandle;
use crate::core::triangulation_data_structure::{CellKey, Tds, VertexKey};
use crate::core::vertex::{Vertex, VertexKind};
use crate::geometry::point::Point3;
use crate::geometry::predicates::{Orientation, simplex_orientation};

/// Errors from inserting a vertex.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsertionError {
    /// Conflict region search failed
    #[error("Conflict region error: {0}")]
    ConflictRegion(#[from] ConflictError),

    /// Point location failed
    #[error("Location error: {0}")]
    Location(#[from] LocateError),

    /// The point coincides (within tolerance) with an existing vertex.
    #[error("Point {point} duplicates vertex {existing:?}")]
    DuplicateVertex {
        /// The rejected point
        point: Point3,
        /// The vertex it coincides with
        existing: VertexKey,
    },

    /// The point is outside the enclosing simplex.
    #[error("Point {point} is outside the enclosing simplex")]
    OutsideBounds {
        /// The rejected point
        point: Point3,
    },

    /// The point has a NaN or infinite coordinate.
    #[error("Point {point} has non-finite coordinates")]
    NonFinite {
        /// The rejected point
        point: Point3,
    },

    /// The enclosing simplex could not be built.
    #[error("Cannot build an enclosing simplex of radius {radius}")]
    InvalidEnclosingSimplex {
        /// Requested bounding radius
        radius: f64,
    },

    /// Re-coning the cavity would create a flat or inverted cell.
    #[error("Cavity filling failed: {message}")]
    CavityFilling {
        /// Error message
        message: String,
    },

    /// The cavity boundary is not a closed 2-manifold.
    #[error("Neighbor wiring failed: {message}")]
    NeighborWiring {
        /// Error message
        message: String,
    },
}

/// Outcome of a successful insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionInfo {
    /// Key of the new vertex
    pub vertex: VertexKey,
    /// Cells created around the new vertex
    pub new_cells: CellKeyBuffer,
    /// Number of conflict cells removed
    pub removed: usize,
}

/// One cavity boundary facet and what it will become.
struct ConePlan {
    facet: FacetHandle,
    old_vertices: [VertexKey; 4],
    external: Option<CellKey>,
}

/// Inserts `point` by replacing `conflict_cells` with a cone over the
/// cavity boundary.
///
/// # Errors
///
/// Returns [`InsertionError::CavityFilling`] if a new cell would not be
/// positively oriented and [`InsertionError::NeighborWiring`] if the cavity
/// boundary is not closed. The [`Tds`] is unchanged on error.
pub fn insert_into_cavity(
    tds: &mut Tds,
    point: Point3,
    kind: VertexKind,
    conflict_cells: &[CellKey],
) -> Result<InsertionInfo, InsertionError> {
    if conflict_cells.is_empty() {
        return Err(InsertionError::CavityFilling {
            message: "empty conflict region".to_string(),
        });
    }
    let boundary = extract_cavity_boundary(tds, conflict_cells);

    // Plan and validate every new cell before mutating.
    let mut plans = Vec::with_capacity(boundary.len());
    for facet in boundary {
        let cell_key = facet.cell_key();
        let cell = tds
            .cell(cell_key)
            .ok_or(ConflictError::VertexRetrievalFailed { cell_key })?;
        let mut points = tds
            .cell_points(cell_key)
            .ok_or(ConflictError::VertexRetrievalFailed { cell_key })?;
        points[facet.index()] = point;
        let orientation = simplex_orientation(points[0], points[1], points[2], points[3]);
        if orientation != Orientation::POSITIVE {
            return Err(InsertionError::CavityFilling {
                message: format!(
                    "new cell over facet {} of {cell_key:?} would be {orientation}",
                    facet.index()
                ),
            });
        }
        plans.push(ConePlan {
            facet,
            old_vertices: *cell.vertices(),
            external: cell.neighbor(facet.index()),
        });
    }

    // Each cavity-boundary edge is shared by exactly two cone cells.
    let mut edges: FastHashMap<(VertexKey, VertexKey), Vec<(usize, usize)>> =
        fast_hash_map_with_capacity(plans.len() * 3 / 2);
    for (plan_index, plan) in plans.iter().enumerate() {
        let apex = plan.facet.index();
        for k in (0..4).filter(|&k| k != apex) {
            let mut others = (0..4).filter(|&m| m != apex && m != k);
            let (Some(m1), Some(m2)) = (others.next(), others.next()) else {
                continue;
            };
            let (a, b) = (plan.old_vertices[m1], plan.old_vertices[m2]);
            let key = if a < b { (a, b) } else { (b, a) };
            edges.entry(key).or_default().push((plan_index, k));
        }
    }
    if let Some((edge, uses)) = edges.iter().find(|(_, uses)| uses.len() != 2) {
        return Err(InsertionError::NeighborWiring {
            message: format!("cavity edge {edge:?} is used by {} cone facets", uses.len()),
        });
    }

    // Mutate.
    let vertex = tds.insert_vertex(Vertex::new(point, kind));
    let mut new_cells = CellKeyBuffer::with_capacity(plans.len());
    for plan in &plans {
        let mut vertices = plan.old_vertices;
        vertices[plan.facet.index()] = vertex;
        let new_key = tds
            .insert_cell(vertices)
            .ok_or_else(|| InsertionError::CavityFilling {
                message: "cone cell references a missing vertex".to_string(),
            })?;
        if let Some(new_cell) = tds.cell_mut(new_key) {
            new_cell.set_neighbor(plan.facet.index(), plan.external);
        }
        if let Some(external_key) = plan.external
            && let Some(external) = tds.cell_mut(external_key)
            && let Some(back) = external.neighbor_index(plan.facet.cell_key())
        {
            external.set_neighbor(back, Some(new_key));
        }
        new_cells.push(new_key);
    }
    for uses in edges.values() {
        let [(p0, k0), (p1, k1)] = [uses[0], uses[1]];
        let (c0, c1) = (new_cells[p0], new_cells[p1]);
        if let Some(cell) = tds.cell_mut(c0) {
            cell.set_neighbor(k0, Some(c1));
        }
        if let Some(cell) = tds.cell_mut(c1) {
            cell.set_neighbor(k1, Some(c0));
        }
    }

    for &cell_key in &new_cells {
        let Some(vertices) = tds.cell(cell_key).map(|c| *c.vertices()) else {
            continue;
        };
        for v in vertices {
            if let Some(vertex) = tds.vertex_mut(v) {
                vertex.incident_cell = Some(cell_key);
            }
        }
    }
    for &cell_key in conflict_cells {
        tds.remove_cell(cell_key);
    }

    tracing::trace!(
        new_cells = new_cells.len(),
        removed = conflict_cells.len(),
        "inserted vertex"
    );
    Ok(InsertionInfo {
        vertex,
        new_cells,
        removed: conflict_cells.len(),
    })
}
