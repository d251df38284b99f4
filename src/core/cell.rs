//! Tetrahedral cells.
//!
//! A cell stores its four vertex keys in positive orientation, its four
//! neighbors (neighbor `i` is across the facet opposite vertex `i`), a cached
//! circumsphere and its sub-domain label.

use crate::core::triangulation_data_structure::{CellKey, VertexKey};
use crate::domain::multi_domain::SubdomainLabel;
use crate::geometry::point::Point3;
use crate::geometry::util::tetrahedron_circumcenter;

/// A tetrahedron of the triangulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    vertices: [VertexKey; 4],
    neighbors: [Option<CellKey>; 4],
    circumcenter: Point3,
    squared_circumradius: f64,
    label: SubdomainLabel,
}

impl Cell {
    /// Creates a cell from positively oriented vertices and their points.
    ///
    /// If the circumcenter cannot be computed (the cell is numerically flat)
    /// the centroid is cached instead and a warning is logged.
    #[must_use]
    pub fn new(vertices: [VertexKey; 4], points: &[Point3; 4]) -> Self {
        let circumcenter = tetrahedron_circumcenter(points).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to centroid for cell circumcenter");
            Point3::centroid(points).unwrap_or(points[0])
        });
        Self {
            vertices,
            neighbors: [None; 4],
            circumcenter,
            squared_circumradius: circumcenter.distance_squared(points[0]),
            label: SubdomainLabel::Outside,
        }
    }

    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 4] {
        &self.vertices
    }

    #[inline]
    #[must_use]
    pub const fn neighbors(&self) -> &[Option<CellKey>; 4] {
        &self.neighbors
    }

    #[inline]
    #[must_use]
    pub const fn neighbor(&self, index: usize) -> Option<CellKey> {
        self.neighbors[index]
    }

    #[inline]
    pub const fn set_neighbor(&mut self, index: usize, neighbor: Option<CellKey>) {
        self.neighbors[index] = neighbor;
    }

    #[inline]
    #[must_use]
    pub const fn circumcenter(&self) -> Point3 {
        self.circumcenter
    }

    #[inline]
    #[must_use]
    pub const fn squared_circumradius(&self) -> f64 {
        self.squared_circumradius
    }

    #[inline]
    #[must_use]
    pub const fn label(&self) -> SubdomainLabel {
        self.label
    }

    #[inline]
    pub const fn set_label(&mut self, label: SubdomainLabel) {
        self.label = label;
    }

    /// Position of `vertex` in this cell, if present.
    #[must_use]
    pub fn index_of(&self, vertex: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&v| v == vertex)
    }

    #[must_use]
    pub fn contains_vertex(&self, vertex: VertexKey) -> bool {
        self.vertices.contains(&vertex)
    }

    /// Index of the facet shared with `neighbor`, if adjacent.
    #[must_use]
    pub fn neighbor_index(&self, neighbor: CellKey) -> Option<usize> {
        self.neighbors.iter().position(|&n| n == Some(neighbor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vertex::{Vertex, VertexKind};
    use crate::core::collections::StorageMap;
    use approx::assert_relative_eq;

    #[test]
    fn test_cell_caches_circumsphere() {
        let points = [
            Point3::ORIGIN,
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 2.0),
        ];
        let mut vertices: StorageMap<VertexKey, Vertex> = StorageMap::with_key();
        let keys = points.map(|p| vertices.insert(Vertex::new(p, VertexKind::Bounding)));

        let mut cell = Cell::new(keys, &points);
        assert_relative_eq!(cell.circumcenter().x(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(cell.squared_circumradius(), 3.0, epsilon = 1e-12);
        assert_eq!(cell.label(), SubdomainLabel::Outside);
        assert_eq!(cell.index_of(keys[2]), Some(2));
        assert!(cell.neighbors().iter().all(Option::is_none));

        cell.set_label(SubdomainLabel::Subdomain(0));
        assert_eq!(cell.label(), SubdomainLabel::Subdomain(0));
    }

    #[test]
    fn test_flat_cell_falls_back_to_centroid() {
        let points = [
            Point3::ORIGIN,
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let mut vertices: StorageMap<VertexKey, Vertex> = StorageMap::with_key();
        let keys = points.map(|p| vertices.insert(Vertex::new(p, VertexKind::Bounding)));
        let cell = Cell::new(keys, &points);
        assert_eq!(cell.circumcenter(), Point3::new(0.5, 0.5, 0.0));
    }
}
