//! Property-based tests for the Delaunay triangulation.
//!
//! This module uses proptest to verify:
//! - Random insertions keep the triangulation structurally valid and Delaunay
//! - Vertex counts and stars stay consistent after every insertion
//! - Re-inserting an existing point is rejected without changes

use implicit_mesh::core::triangulation::Triangulation;
use implicit_mesh::core::vertex::VertexKind;
use implicit_mesh::domain::multi_domain::SubdomainLabel;
use implicit_mesh::geometry::point::Point3;
use implicit_mesh::geometry::predicates::{Orientation, simplex_orientation};
use proptest::prelude::*;

// =============================================================================
// TEST CONFIGURATION
// =============================================================================

const INTERIOR: VertexKind = VertexKind::Interior(SubdomainLabel::Subdomain(0));

fn points_in_cube(max: usize) -> impl Strategy<Value = Vec<Point3>> {
    prop::collection::vec(
        prop::array::uniform3(-1.0f64..1.0).prop_map(Point3::from),
        4..max,
    )
}

fn build(points: &[Point3]) -> (Triangulation, usize) {
    let mut tri = Triangulation::new(Point3::ORIGIN, 2.0, 17).unwrap();
    let mut inserted = 0;
    for &p in points {
        if tri.insert(p, INTERIOR).is_ok() {
            inserted += 1;
        }
    }
    (tri, inserted)
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: the triangulation stays valid and Delaunay after random
    /// insertions
    #[test]
    fn prop_random_insertions_are_delaunay(points in points_in_cube(40)) {
        let (tri, inserted) = build(&points);
        prop_assert_eq!(tri.number_of_mesh_vertices(), inserted);
        prop_assert!(tri.is_valid().is_ok());
        prop_assert!(tri.validate_delaunay().is_ok());
    }

    /// Property: every cell is positively oriented
    #[test]
    fn prop_cells_are_positively_oriented(points in points_in_cube(30)) {
        let (tri, _) = build(&points);
        for (cell_key, _) in tri.tds().cells() {
            let [a, b, c, d] = tri.tds().cell_points(cell_key).unwrap();
            prop_assert_eq!(simplex_orientation(a, b, c, d), Orientation::POSITIVE);
        }
    }

    /// Property: every vertex's incident cells contain it, and its incident
    /// cell hint is one of them
    #[test]
    fn prop_vertex_stars_are_consistent(points in points_in_cube(30)) {
        let (tri, _) = build(&points);
        let tds = tri.tds();
        for (key, vertex) in tds.vertices() {
            let star = tds.incident_cells(key);
            prop_assert!(!star.is_empty());
            for &cell in &star {
                prop_assert!(tds.cell(cell).unwrap().contains_vertex(key));
            }
            let hint = vertex.incident_cell.unwrap();
            prop_assert!(star.contains(&hint));
        }
    }

    /// Property: inserting an existing point again fails and leaves the
    /// triangulation unchanged
    #[test]
    fn prop_duplicate_insertion_is_rejected(points in points_in_cube(20)) {
        let (mut tri, _) = build(&points);
        let vertices = tri.number_of_vertices();
        let cells = tri.number_of_cells();
        prop_assert!(tri.insert(points[0], INTERIOR).is_err());
        prop_assert_eq!(tri.number_of_vertices(), vertices);
        prop_assert_eq!(tri.number_of_cells(), cells);
    }
}

// =============================================================================
// EDGE CASES
// =============================================================================

#[test]
fn test_cospherical_points_stay_delaunay() {
    // The eight corners of a cube lie on one sphere.
    let mut points = Vec::new();
    for &x in &[-0.5, 0.5] {
        for &y in &[-0.5, 0.5] {
            for &z in &[-0.5, 0.5] {
                points.push(Point3::new(x, y, z));
            }
        }
    }
    points.push(Point3::ORIGIN);
    let (tri, inserted) = build(&points);
    assert_eq!(inserted, 9);
    assert!(tri.is_valid().is_ok());
    assert!(tri.validate_delaunay().is_ok());
}

#[test]
fn test_coplanar_points_stay_valid() {
    let points: Vec<Point3> = (0..25)
        .map(|i| {
            let (u, v) = (f64::from(i % 5), f64::from(i / 5));
            Point3::new(0.2 * u - 0.4, 0.2 * v - 0.4, 0.0)
        })
        .collect();
    let (tri, inserted) = build(&points);
    assert_eq!(inserted, 25);
    assert!(tri.is_valid().is_ok());
    assert!(tri.validate_delaunay().is_ok());
}
