//! Delaunay empty-circumsphere property validation utilities.
//!
//! The check is local: for every pair of adjacent cells, the vertex of one
//! opposite the shared facet must not lie strictly inside the circumsphere
//! of the other. For a triangulation of a convex region this local
//! condition is equivalent to the global empty-circumsphere property.

use thiserror::Error;

use crate::core::triangulation_data_structure::{CellKey, Tds, TdsValidationError, VertexKey};
use crate::geometry::predicates::{InSphere, insphere};

/// Errors that can occur during Delaunay property validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DelaunayValidationError {
    /// A neighbor's opposite vertex lies inside a cell's circumsphere.
    #[error("Cell {cell_key:?} has vertex {vertex_key:?} inside its circumsphere")]
    DelaunayViolation {
        /// The violating cell
        cell_key: CellKey,
        /// The vertex inside its circumsphere
        vertex_key: VertexKey,
    },
    /// Structural corruption found before the geometric check.
    #[error("TDS corruption: {source}")]
    TriangulationState {
        /// The underlying TDS validation error.
        #[from]
        source: TdsValidationError,
    },
}

/// Returns the first vertex of a neighboring cell that lies strictly inside
/// `cell_key`'s circumsphere.
fn first_violating_vertex(tds: &Tds, cell_key: CellKey) -> Option<VertexKey> {
    let cell = tds.cell(cell_key)?;
    let points = tds.cell_points(cell_key)?;
    for neighbor_key in cell.neighbors().iter().flatten() {
        let Some(neighbor) = tds.cell(*neighbor_key) else {
            continue;
        };
        let Some(back) = neighbor.neighbor_index(cell_key) else {
            continue;
        };
        let opposite = neighbor.vertices()[back];
        if let Some(p) = tds.vertex_point(opposite)
            && insphere(&points, p) == InSphere::INSIDE
        {
            return Some(opposite);
        }
    }
    None
}

/// Keys of all cells that violate the local Delaunay condition.
#[must_use]
pub fn find_delaunay_violations(tds: &Tds) -> Vec<CellKey> {
    tds.cell_keys()
        .filter(|&k| first_violating_vertex(tds, k).is_some())
        .collect()
}

/// Validates structure, then the Delaunay property.
///
/// # Errors
///
/// Returns the first structural error, or the first
/// [`DelaunayValidationError::DelaunayViolation`] found.
pub fn validate_delaunay(tds: &Tds) -> Result<(), DelaunayValidationError> {
    tds.is_valid()?;
    for cell_key in tds.cell_keys() {
        if let Some(vertex_key) = first_violating_vertex(tds, cell_key) {
            #[cfg(debug_assertions)]
            if std::env::var_os("IMPLICIT_MESH_DEBUG_DELAUNAY").is_some() {
                eprintln!(
                    "validate_delaunay: cell {cell_key:?} circumcenter={:?} violated by {vertex_key:?}",
                    tds.cell(cell_key).map(crate::core::cell::Cell::circumcenter)
                );
            }
            return Err(DelaunayValidationError::DelaunayViolation {
                cell_key,
                vertex_key,
            });
        }
    }
    Ok(())
}
