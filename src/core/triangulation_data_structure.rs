//! Triangulation data structure: vertex and cell storage plus topology.
//!
//! [`Tds`] owns every [`Vertex`] and [`Cell`] in slotmap arenas addressed by
//! [`VertexKey`] and [`CellKey`]. It knows nothing about Delaunay geometry
//! beyond cell orientation; insertion lives in
//! [`algorithms::insertion`](crate::core::algorithms::insertion) and the
//! Delaunay wrapper in [`triangulation`](crate::core::triangulation).
//!
//! # Invariants
//!
//! - Every cell references four distinct, existing vertices in positive
//!   orientation.
//! - `cell.neighbor(i)` is the cell across the facet opposite vertex `i`, and
//!   adjacency is mutual.
//! - Every vertex with cells has an `incident_cell` that contains it.

use slotmap::new_key_type;

use crate::core::cell::Cell;
use crate::core::collections::{CellKeyBuffer, FastHashSet, SmallBuffer, StorageMap};
use crate::core::facet::{FACET_VERTEX_INDICES, FacetHandle};
use crate::core::vertex::Vertex;
use crate::geometry::point::Point3;
use crate::geometry::predicates::{Orientation, simplex_orientation};

new_key_type! {
    /// Key of a vertex in a [`Tds`].
    pub struct VertexKey;
    /// Key of a cell in a [`Tds`].
    pub struct CellKey;
}

/// Inline capacity for the vertices adjacent to one vertex.
pub const VERTEX_STAR_SIZE: usize = 32;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// A violated structural invariant, reported by [`Tds::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TdsValidationError {
    /// A cell references a vertex that does not exist.
    #[error("Cell {cell_key:?} references missing vertex {vertex_key:?}")]
    MissingVertex {
        /// The offending cell
        cell_key: CellKey,
        /// The missing vertex
        vertex_key: VertexKey,
    },

    /// A cell repeats a vertex.
    #[error("Cell {cell_key:?} has repeated vertices")]
    DuplicateVertexInCell {
        /// The offending cell
        cell_key: CellKey,
    },

    /// A cell is not positively oriented.
    #[error("Cell {cell_key:?} has {orientation} orientation")]
    BadOrientation {
        /// The offending cell
        cell_key: CellKey,
        /// The orientation found
        orientation: Orientation,
    },

    /// Neighbor pointers are not mutual or do not share a facet.
    #[error("Cell {cell_key:?} neighbor {facet_index} is inconsistent: {message}")]
    InconsistentNeighbor {
        /// The offending cell
        cell_key: CellKey,
        /// Facet index of the bad neighbor pointer
        facet_index: usize,
        /// What is wrong
        message: String,
    },

    /// A vertex's incident cell is missing or does not contain it.
    #[error("Vertex {vertex_key:?} has an invalid incident cell")]
    InvalidIncidentCell {
        /// The offending vertex
        vertex_key: VertexKey,
    },
}

// =============================================================================
// TDS STRUCT DEFINITION
// =============================================================================

/// Storage and combinatorial topology of a tetrahedral mesh.
#[derive(Clone, Debug, Default)]
pub struct Tds {
    vertices: StorageMap<VertexKey, Vertex>,
    cells: StorageMap<CellKey, Cell>,
}

impl Tds {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: StorageMap::with_key(),
            cells: StorageMap::with_key(),
        }
    }

    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn vertex(&self, key: VertexKey) -> Option<&Vertex> {
        self.vertices.get(key)
    }

    pub fn vertex_mut(&mut self, key: VertexKey) -> Option<&mut Vertex> {
        self.vertices.get_mut(key)
    }

    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&Cell> {
        self.cells.get(key)
    }

    pub fn cell_mut(&mut self, key: CellKey) -> Option<&mut Cell> {
        self.cells.get_mut(key)
    }

    #[must_use]
    pub fn contains_cell(&self, key: CellKey) -> bool {
        self.cells.contains_key(key)
    }

    #[must_use]
    pub fn contains_vertex(&self, key: VertexKey) -> bool {
        self.vertices.contains_key(key)
    }

    /// Iterates vertices in storage order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex)> {
        self.vertices.iter()
    }

    /// Iterates cells in storage order.
    pub fn cells(&self) -> impl Iterator<Item = (CellKey, &Cell)> {
        self.cells.iter()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = (CellKey, &mut Cell)> {
        self.cells.iter_mut()
    }

    pub fn cell_keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.cells.keys()
    }

    pub fn vertex_keys(&self) -> impl Iterator<Item = VertexKey> + '_ {
        self.vertices.keys()
    }

    pub fn insert_vertex(&mut self, vertex: Vertex) -> VertexKey {
        self.vertices.insert(vertex)
    }

    /// Inserts a cell over existing vertices and returns its key. Neighbors
    /// are left unset.
    ///
    /// Returns `None` if a vertex key is missing.
    pub fn insert_cell(&mut self, vertices: [VertexKey; 4]) -> Option<CellKey> {
        let points = self.points_of(&vertices)?;
        Some(self.cells.insert(Cell::new(vertices, &points)))
    }

    pub fn remove_cell(&mut self, key: CellKey) -> Option<Cell> {
        self.cells.remove(key)
    }

    #[must_use]
    pub fn vertex_point(&self, key: VertexKey) -> Option<Point3> {
        self.vertices.get(key).map(Vertex::point)
    }

    /// Points of four vertex keys, in order.
    #[must_use]
    pub fn points_of(&self, vertices: &[VertexKey; 4]) -> Option<[Point3; 4]> {
        Some([
            self.vertex_point(vertices[0])?,
            self.vertex_point(vertices[1])?,
            self.vertex_point(vertices[2])?,
            self.vertex_point(vertices[3])?,
        ])
    }

    /// Points of a cell's vertices, in cell order.
    #[must_use]
    pub fn cell_points(&self, key: CellKey) -> Option<[Point3; 4]> {
        self.points_of(self.cells.get(key)?.vertices())
    }

    // =========================================================================
    // FACET QUERIES
    // =========================================================================

    /// Vertex keys of a facet, oriented outward from the handle's cell.
    #[must_use]
    pub fn facet_vertices(&self, facet: FacetHandle) -> Option<[VertexKey; 3]> {
        let cell = self.cells.get(facet.cell_key())?;
        let [a, b, c] = FACET_VERTEX_INDICES[facet.index()];
        let v = cell.vertices();
        Some([v[a], v[b], v[c]])
    }

    /// Points of a facet, oriented outward from the handle's cell.
    #[must_use]
    pub fn facet_points(&self, facet: FacetHandle) -> Option<[Point3; 3]> {
        let [a, b, c] = self.facet_vertices(facet)?;
        Some([
            self.vertex_point(a)?,
            self.vertex_point(b)?,
            self.vertex_point(c)?,
        ])
    }

    /// The same facet seen from the neighboring cell, if there is one.
    #[must_use]
    pub fn mirror_facet(&self, facet: FacetHandle) -> Option<FacetHandle> {
        let cell_key = facet.cell_key();
        let neighbor_key = self.cells.get(cell_key)?.neighbor(facet.index())?;
        let index = self.cells.get(neighbor_key)?.neighbor_index(cell_key)?;
        u8::try_from(index)
            .ok()
            .map(|i| FacetHandle::new(neighbor_key, i))
    }

    // =========================================================================
    // VERTEX STARS
    // =========================================================================

    /// All cells containing `vertex`, found by walking across the facets
    /// that contain it, starting from its incident cell.
    #[must_use]
    pub fn incident_cells(&self, vertex: VertexKey) -> CellKeyBuffer {
        let mut result = CellKeyBuffer::new();
        let Some(start) = self.vertices.get(vertex).and_then(|v| v.incident_cell) else {
            return result;
        };
        if !self
            .cells
            .get(start)
            .is_some_and(|c| c.contains_vertex(vertex))
        {
            return result;
        }

        let mut visited: FastHashSet<CellKey> = FastHashSet::default();
        let mut stack = vec![start];
        visited.insert(start);
        while let Some(key) = stack.pop() {
            let Some(cell) = self.cells.get(key) else {
                continue;
            };
            result.push(key);
            let Some(own) = cell.index_of(vertex) else {
                continue;
            };
            for (i, neighbor) in cell.neighbors().iter().enumerate() {
                if i == own {
                    continue;
                }
                if let Some(n) = *neighbor
                    && visited.insert(n)
                {
                    stack.push(n);
                }
            }
        }
        result
    }

    /// Vertices sharing an edge with `vertex`.
    #[must_use]
    pub fn adjacent_vertices(&self, vertex: VertexKey) -> SmallBuffer<VertexKey, VERTEX_STAR_SIZE> {
        let mut result: SmallBuffer<VertexKey, VERTEX_STAR_SIZE> = SmallBuffer::new();
        for cell_key in self.incident_cells(vertex) {
            if let Some(cell) = self.cells.get(cell_key) {
                for &v in cell.vertices() {
                    if v != vertex && !result.contains(&v) {
                        result.push(v);
                    }
                }
            }
        }
        result
    }

    /// Cells around the edge `(a, b)` in circulation order.
    ///
    /// Returns `None` if the edge does not exist or its ring is open (the
    /// edge lies on the convex hull).
    #[must_use]
    pub fn cells_around_edge(&self, a: VertexKey, b: VertexKey) -> Option<CellKeyBuffer> {
        let start = self
            .incident_cells(a)
            .into_iter()
            .find(|&c| self.cells.get(c).is_some_and(|cell| cell.contains_vertex(b)))?;

        let mut ring = CellKeyBuffer::new();
        let mut previous: Option<CellKey> = None;
        let mut current = start;
        loop {
            ring.push(current);
            let cell = self.cells.get(current)?;
            let mut others = (0..4).filter(|&i| {
                let v = cell.vertices()[i];
                v != a && v != b
            });
            let (k, l) = (others.next()?, others.next()?);
            let (nk, nl) = (cell.neighbor(k)?, cell.neighbor(l)?);
            let next = if Some(nk) == previous { nl } else { nk };
            previous = Some(current);
            current = next;
            if current == start {
                return Some(ring);
            }
            if ring.len() > self.cells.len() {
                return None;
            }
        }
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Checks every structural invariant and returns the first violation.
    ///
    /// # Errors
    ///
    /// Returns the first [`TdsValidationError`] found.
    pub fn is_valid(&self) -> Result<(), TdsValidationError> {
        for (cell_key, cell) in &self.cells {
            let vertices = cell.vertices();
            for &vertex_key in vertices {
                if !self.vertices.contains_key(vertex_key) {
                    return Err(TdsValidationError::MissingVertex {
                        cell_key,
                        vertex_key,
                    });
                }
            }
            for i in 0..4 {
                for j in (i + 1)..4 {
                    if vertices[i] == vertices[j] {
                        return Err(TdsValidationError::DuplicateVertexInCell { cell_key });
                    }
                }
            }
            if let Some([a, b, c, d]) = self.cell_points(cell_key) {
                let orientation = simplex_orientation(a, b, c, d);
                if orientation != Orientation::POSITIVE {
                    return Err(TdsValidationError::BadOrientation {
                        cell_key,
                        orientation,
                    });
                }
            }
            for (facet_index, neighbor) in cell.neighbors().iter().enumerate() {
                let Some(neighbor_key) = *neighbor else {
                    continue;
                };
                let inconsistent = |message: &str| TdsValidationError::InconsistentNeighbor {
                    cell_key,
                    facet_index,
                    message: message.to_string(),
                };
                let other = self
                    .cells
                    .get(neighbor_key)
                    .ok_or_else(|| inconsistent("neighbor does not exist"))?;
                let back = other
                    .neighbor_index(cell_key)
                    .ok_or_else(|| inconsistent("neighbor does not point back"))?;
                // The shared facet is everything but the opposite vertices.
                if other.contains_vertex(vertices[facet_index]) {
                    return Err(inconsistent("opposite vertex appears in neighbor"));
                }
                let shared = (0..4)
                    .filter(|&i| i != facet_index)
                    .all(|i| other.contains_vertex(vertices[i]));
                if !shared || cell.contains_vertex(other.vertices()[back]) {
                    return Err(inconsistent("cells do not share the facet"));
                }
            }
        }

        for (vertex_key, vertex) in &self.vertices {
            if let Some(cell_key) = vertex.incident_cell
                && !self
                    .cells
                    .get(cell_key)
                    .is_some_and(|c| c.contains_vertex(vertex_key))
            {
                return Err(TdsValidationError::InvalidIncidentCell { vertex_key });
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vertex::VertexKind;

    /// Two tetrahedra glued along the facet (a, b, c).
    fn double_tet() -> (Tds, [VertexKey; 5], CellKey, CellKey) {
        let mut tds = Tds::new();
        let points = [
            Point3::ORIGIN,
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.2, 0.2, 1.0),
            Point3::new(0.2, 0.2, -1.0),
        ];
        let keys = points.map(|p| tds.insert_vertex(Vertex::new(p, VertexKind::Bounding)));
        let [a, b, c, top, bottom] = keys;
        let upper = tds.insert_cell([a, b, c, top]).unwrap();
        let lower = tds.insert_cell([a, c, b, bottom]).unwrap();
        tds.cell_mut(upper).unwrap().set_neighbor(3, Some(lower));
        tds.cell_mut(lower).unwrap().set_neighbor(3, Some(upper));
        for (k, cell) in [(a, upper), (b, upper), (c, upper), (top, upper), (bottom, lower)] {
            tds.vertex_mut(k).unwrap().incident_cell = Some(cell);
        }
        (tds, keys, upper, lower)
    }

    #[test]
    fn test_double_tet_is_valid() {
        let (tds, _, _, _) = double_tet();
        assert_eq!(tds.number_of_vertices(), 5);
        assert_eq!(tds.number_of_cells(), 2);
        assert!(tds.is_valid().is_ok());
    }

    #[test]
    fn test_mirror_facet() {
        let (tds, keys, upper, lower) = double_tet();
        let facet = FacetHandle::new(upper, 3);
        let mirror = tds.mirror_facet(facet).unwrap();
        assert_eq!(mirror.cell_key(), lower);
        assert_eq!(mirror.facet_index(), 3);
        assert!(tds.mirror_facet(FacetHandle::new(upper, 0)).is_none());

        let mut seen = tds.facet_vertices(facet).unwrap().to_vec();
        seen.sort();
        let mut expected = vec![keys[0], keys[1], keys[2]];
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_incident_cells_and_adjacency() {
        let (tds, keys, _, _) = double_tet();
        assert_eq!(tds.incident_cells(keys[0]).len(), 2);
        assert_eq!(tds.incident_cells(keys[3]).len(), 1);
        assert_eq!(tds.adjacent_vertices(keys[0]).len(), 4);
        assert_eq!(tds.adjacent_vertices(keys[4]).len(), 3);
    }

    #[test]
    fn test_open_edge_ring() {
        let (tds, keys, _, _) = double_tet();
        // Every edge of a two-cell complex lies on its hull.
        assert!(tds.cells_around_edge(keys[0], keys[1]).is_none());
        assert!(tds.cells_around_edge(keys[3], keys[4]).is_none());
    }

    #[test]
    fn test_validation_detects_broken_neighbors() {
        let (mut tds, _, upper, lower) = double_tet();
        tds.cell_mut(lower).unwrap().set_neighbor(3, None);
        assert!(matches!(
            tds.is_valid(),
            Err(TdsValidationError::InconsistentNeighbor { cell_key, .. }) if cell_key == upper
        ));
    }

    #[test]
    fn test_validation_detects_bad_orientation() {
        let mut tds = Tds::new();
        let points = [
            Point3::ORIGIN,
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let keys = points.map(|p| tds.insert_vertex(Vertex::new(p, VertexKind::Bounding)));
        tds.insert_cell(keys).unwrap();
        assert!(matches!(
            tds.is_valid(),
            Err(TdsValidationError::BadOrientation {
                orientation: Orientation::NEGATIVE,
                ..
            })
        ));
    }
}
