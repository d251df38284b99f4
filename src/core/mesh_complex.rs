//! Mesh complex extraction and export.
//!
//! A [`MeshComplex`] is an immutable snapshot of a labeled triangulation:
//! the cells carrying a sub-domain label (the 3-complex) and the facets
//! where the label changes (the 2-complex), over a compacted vertex table.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::core::collections::{FastHashMap, FastHashSet};
use crate::core::facet::FacetHandle;
use crate::core::triangulation::Triangulation;
use crate::core::triangulation_data_structure::VertexKey;
use crate::domain::labeled::LabeledDomain;
use crate::domain::multi_domain::SubdomainLabel;
use crate::geometry::point::Point3;
use crate::geometry::quality::{
    CellGeometry, FacetGeometry, normalized_volume, radius_edge_ratio, radius_ratio,
};
use crate::geometry::util::{min_triangle_angle, triangle_circumradius};

/// A boundary triangle between two labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshFacet {
    /// Vertex indices, oriented outward from `labels[0]`
    pub vertices: [usize; 3],
    /// Labels on the two sides; `labels[0] < labels[1]`
    pub labels: [SubdomainLabel; 2],
    /// Where the dual Voronoi edge crosses the boundary
    pub surface_center: Point3,
}

/// A labeled tetrahedron.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshCell {
    /// Vertex indices, positively oriented
    pub vertices: [usize; 4],
    /// Sub-domain label, never `Outside`
    pub label: SubdomainLabel,
}

/// Labeled 2-complex and 3-complex extracted from a triangulation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshComplex {
    vertices: Vec<Point3>,
    facets: Vec<MeshFacet>,
    cells: Vec<MeshCell>,
}

/// Summary quality measures of a [`MeshComplex`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshStatistics {
    pub vertices: usize,
    pub facets: usize,
    pub cells: usize,
    /// Smallest facet angle, in degrees
    pub min_facet_angle: f64,
    /// Largest facet circumradius
    pub max_facet_size: f64,
    /// Largest cell radius-edge ratio
    pub max_radius_edge_ratio: f64,
    /// Largest cell circumradius-to-inradius ratio (3 is optimal)
    pub max_radius_ratio: f64,
    /// Smallest normalized cell volume (1 is optimal)
    pub min_normalized_volume: f64,
}

impl MeshComplex {
    /// Extracts the labeled complex. Cells labeled with an index in
    /// `excluded_subdomains` are treated as `Outside`.
    #[must_use]
    pub fn extract(
        triangulation: &Triangulation,
        domain: &LabeledDomain,
        excluded_subdomains: &[usize],
    ) -> Self {
        let tds = triangulation.tds();
        let effective = |label: SubdomainLabel| match label {
            SubdomainLabel::Subdomain(i) if excluded_subdomains.contains(&i) => {
                SubdomainLabel::Outside
            }
            other => other,
        };

        let mut raw_cells: Vec<([VertexKey; 4], SubdomainLabel)> = Vec::new();
        let mut raw_facets: Vec<([VertexKey; 3], [SubdomainLabel; 2], Point3)> = Vec::new();
        for (cell_key, cell) in tds.cells() {
            let label = effective(cell.label());
            if !label.is_outside() {
                raw_cells.push((*cell.vertices(), label));
            }
            for (i, neighbor_key) in cell.neighbors().iter().enumerate() {
                let neighbor = neighbor_key.and_then(|n| tds.cell(n));
                let other = neighbor.map_or(SubdomainLabel::Outside, |n| effective(n.label()));
                // Emit each facet once, from its smaller-label side.
                if label >= other {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                let handle = FacetHandle::new(cell_key, i as u8);
                let (Some(vertices), Some(points)) =
                    (tds.facet_vertices(handle), tds.facet_points(handle))
                else {
                    continue;
                };
                let surface_center = neighbor
                    .and_then(|n| domain.surface_crossing(cell.circumcenter(), n.circumcenter()))
                    .or_else(|| Point3::centroid(&points))
                    .unwrap_or(points[0]);
                raw_facets.push((vertices, [label, other], surface_center));
            }
        }

        // Compact vertices in storage order.
        let used: FastHashSet<VertexKey> = raw_cells
            .iter()
            .flat_map(|(v, _)| v.iter().copied())
            .chain(raw_facets.iter().flat_map(|(v, _, _)| v.iter().copied()))
            .collect();
        let mut index_of: FastHashMap<VertexKey, usize> = FastHashMap::default();
        let mut vertices = Vec::with_capacity(used.len());
        for (key, vertex) in tds.vertices() {
            if used.contains(&key) {
                index_of.insert(key, vertices.len());
                vertices.push(vertex.point());
            }
        }
        let map = |key: &VertexKey| index_of.get(key).copied().unwrap_or(usize::MAX);

        let cells = raw_cells
            .iter()
            .map(|(v, label)| MeshCell {
                vertices: [map(&v[0]), map(&v[1]), map(&v[2]), map(&v[3])],
                label: *label,
            })
            .collect();
        let facets = raw_facets
            .iter()
            .map(|(v, labels, surface_center)| MeshFacet {
                vertices: [map(&v[0]), map(&v[1]), map(&v[2])],
                labels: *labels,
                surface_center: *surface_center,
            })
            .collect();

        Self {
            vertices,
            facets,
            cells,
        }
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    #[must_use]
    pub fn facets(&self) -> &[MeshFacet] {
        &self.facets
    }

    #[must_use]
    pub fn cells(&self) -> &[MeshCell] {
        &self.cells
    }

    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn number_of_facets(&self) -> usize {
        self.facets.len()
    }

    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.facets.is_empty()
    }

    /// Triangle and surface center of facet `index`.
    #[must_use]
    pub fn facet_geometry(&self, index: usize) -> Option<FacetGeometry> {
        let facet = self.facets.get(index)?;
        let [a, b, c] = facet.vertices;
        Some(FacetGeometry {
            vertices: [
                *self.vertices.get(a)?,
                *self.vertices.get(b)?,
                *self.vertices.get(c)?,
            ],
            surface_center: facet.surface_center,
        })
    }

    /// Vertex positions of cell `index`.
    #[must_use]
    pub fn cell_geometry(&self, index: usize) -> Option<CellGeometry> {
        let cell = self.cells.get(index)?;
        let [a, b, c, d] = cell.vertices;
        Some(CellGeometry {
            vertices: [
                *self.vertices.get(a)?,
                *self.vertices.get(b)?,
                *self.vertices.get(c)?,
                *self.vertices.get(d)?,
            ],
        })
    }

    /// Computes summary quality measures. Degenerate elements are skipped.
    #[must_use]
    pub fn statistics(&self) -> MeshStatistics {
        let mut stats = MeshStatistics {
            vertices: self.vertices.len(),
            facets: self.facets.len(),
            cells: self.cells.len(),
            min_facet_angle: f64::INFINITY,
            max_facet_size: 0.0,
            max_radius_edge_ratio: 0.0,
            max_radius_ratio: 0.0,
            min_normalized_volume: f64::INFINITY,
        };
        for facet in (0..self.facets.len()).filter_map(|i| self.facet_geometry(i)) {
            let [a, b, c] = facet.vertices;
            stats.min_facet_angle = stats.min_facet_angle.min(min_triangle_angle(a, b, c));
            if let Ok(size) = triangle_circumradius(a, b, c) {
                stats.max_facet_size = stats.max_facet_size.max(size);
            }
        }
        for cell in (0..self.cells.len()).filter_map(|i| self.cell_geometry(i)) {
            if let Ok(r) = radius_edge_ratio(&cell.vertices) {
                stats.max_radius_edge_ratio = stats.max_radius_edge_ratio.max(r);
            }
            if let Ok(r) = radius_ratio(&cell.vertices) {
                stats.max_radius_ratio = stats.max_radius_ratio.max(r);
            }
            if let Ok(v) = normalized_volume(&cell.vertices) {
                stats.min_normalized_volume = stats.min_normalized_volume.min(v);
            }
        }
        stats
    }

    /// Writes the complex in Medit `.mesh` format. Indices are 1-based;
    /// tetrahedron references are sub-domain index + 1 and triangle
    /// references number each label pair in order of first appearance.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from `writer`.
    pub fn write_medit<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "MeshVersionFormatted 1")?;
        writeln!(writer, "Dimension 3")?;

        writeln!(writer, "Vertices")?;
        writeln!(writer, "{}", self.vertices.len())?;
        for p in &self.vertices {
            writeln!(writer, "{} {} {} 0", p.x(), p.y(), p.z())?;
        }

        let mut patches: FastHashMap<[SubdomainLabel; 2], usize> = FastHashMap::default();
        writeln!(writer, "Triangles")?;
        writeln!(writer, "{}", self.facets.len())?;
        for facet in &self.facets {
            let next = patches.len() + 1;
            let patch = *patches.entry(facet.labels).or_insert(next);
            let [a, b, c] = facet.vertices;
            writeln!(writer, "{} {} {} {patch}", a + 1, b + 1, c + 1)?;
        }

        writeln!(writer, "Tetrahedra")?;
        writeln!(writer, "{}", self.cells.len())?;
        for cell in &self.cells {
            let [a, b, c, d] = cell.vertices;
            let reference = cell.label.index().map_or(0, |i| i + 1);
            writeln!(writer, "{} {} {} {} {reference}", a + 1, b + 1, c + 1, d + 1)?;
        }
        writeln!(writer, "End")?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::seeding::build_seed_triangulation;
    use crate::domain::function::{ScalarFunction, SphereFunction};
    use crate::domain::labeled::BoundingSphere;
    use crate::geometry::predicates::{Orientation, simplex_orientation};

    fn two_balls() -> LabeledDomain {
        // Inner ball (subdomain 0) and surrounding shell (subdomain 1).
        let functions: Vec<Box<dyn ScalarFunction>> = vec![
            Box::new(SphereFunction::centered(0.6)),
            Box::new(SphereFunction::centered(1.2)),
        ];
        LabeledDomain::from_patterns(
            functions,
            &["--", "+-"],
            BoundingSphere::new(Point3::ORIGIN, 4.0),
            1e-6,
        )
        .unwrap()
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let domain = two_balls();
        let (tri, _) = build_seed_triangulation(&domain, 1000, 5).unwrap();
        let a = MeshComplex::extract(&tri, &domain, &[]);
        let b = MeshComplex::extract(&tri, &domain, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_extracted_complex_is_consistent() {
        let domain = two_balls();
        let (tri, _) = build_seed_triangulation(&domain, 1000, 5).unwrap();
        let mesh = MeshComplex::extract(&tri, &domain, &[]);

        assert!(mesh.cells().iter().all(|c| !c.label.is_outside()));
        for facet in mesh.facets() {
            assert!(facet.labels[0] < facet.labels[1]);
            assert!(facet.vertices.iter().all(|&i| i < mesh.number_of_vertices()));
        }
        for (i, cell) in mesh.cells().iter().enumerate() {
            assert!(cell.vertices.iter().all(|&v| v < mesh.number_of_vertices()));
            let [a, b, c, d] = mesh.cell_geometry(i).unwrap().vertices;
            assert_eq!(simplex_orientation(a, b, c, d), Orientation::POSITIVE);
        }
        // Every compacted vertex is referenced.
        let mut referenced = vec![false; mesh.number_of_vertices()];
        for cell in mesh.cells() {
            for &v in &cell.vertices {
                referenced[v] = true;
            }
        }
        for facet in mesh.facets() {
            for &v in &facet.vertices {
                referenced[v] = true;
            }
        }
        assert!(referenced.iter().all(|&r| r));
    }

    #[test]
    fn test_excluded_subdomain_becomes_outside() {
        let domain = two_balls();
        let (tri, _) = build_seed_triangulation(&domain, 1000, 5).unwrap();
        let full = MeshComplex::extract(&tri, &domain, &[]);
        let inner_only = MeshComplex::extract(&tri, &domain, &[1]);
        assert!(inner_only.cells().iter().all(|c| c.label == SubdomainLabel::Subdomain(0)));
        assert!(inner_only.number_of_cells() <= full.number_of_cells());
        assert!(
            inner_only
                .facets()
                .iter()
                .all(|f| f.labels == [SubdomainLabel::Subdomain(0), SubdomainLabel::Outside])
        );
    }

    #[test]
    fn test_write_medit() {
        let mesh = MeshComplex {
            vertices: vec![
                Point3::ORIGIN,
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            facets: vec![MeshFacet {
                vertices: [1, 2, 3],
                labels: [SubdomainLabel::Subdomain(0), SubdomainLabel::Outside],
                surface_center: Point3::new(0.3, 0.3, 0.3),
            }],
            cells: vec![MeshCell {
                vertices: [0, 1, 2, 3],
                label: SubdomainLabel::Subdomain(2),
            }],
        };
        let mut out = Vec::new();
        mesh.write_medit(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "MeshVersionFormatted 1");
        assert!(text.contains("Triangles\n1\n2 3 4 1\n"));
        assert!(text.contains("Tetrahedra\n1\n1 2 3 4 3\n"));
        assert_eq!(*lines.last().unwrap(), "End");

        let stats = mesh.statistics();
        assert_eq!(stats.cells, 1);
        approx::assert_relative_eq!(stats.min_facet_angle, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mesh = MeshComplex {
            vertices: vec![Point3::new(1.0, 2.0, 3.0)],
            facets: Vec::new(),
            cells: Vec::new(),
        };
        let json = serde_json::to_string(&mesh).unwrap();
        let back: MeshComplex = serde_json::from_str(&json).unwrap();
        assert_eq!(mesh, back);
    }
}
