//! Lloyd relocation restricted to sub-domains.
//!
//! Each iteration moves every relocatable interior vertex to the centroid
//! of its restricted Voronoi cell, then rebuilds the triangulation from the
//! moved vertex set.
//!
//! The Voronoi cell of `v` is the union of one pyramid per incident edge
//! `(v, w)`: the apex is `v` and the base is the Voronoi face dual to the
//! edge, whose corners are the circumcenters of the cells around the edge in
//! circulation order. Each pyramid is fanned into tetrahedra; a tetrahedron
//! counts toward the restricted centroid only if its centroid carries `v`'s
//! label.
//!
//! # Relative displacement
//!
//! Moves are measured relative to the shortest edge incident to the vertex.
//! A vertex whose relative move is below the freeze bound is not moved and
//! stays frozen until one of its neighbors moves. The run converges once the
//! mean relative move over all relocatable vertices drops below the
//! convergence ratio, or once every vertex is frozen.

use serde::{Deserialize, Serialize};

use crate::core::algorithms::insertion::InsertionError;
use crate::core::collections::{FastHashMap, FastHashSet};
use crate::core::triangulation::Triangulation;
use crate::core::triangulation_data_structure::{Tds, VertexKey};
use crate::core::util::hilbert::hilbert_order;
use crate::core::vertex::VertexKind;
use crate::domain::labeled::LabeledDomain;
use crate::domain::multi_domain::SubdomainLabel;
use crate::geometry::point::Point3;
use crate::geometry::util::tetrahedron_volume;

/// Default iteration cap.
pub const DEFAULT_LLOYD_MAX_ITERATIONS: usize = 25;

/// Default convergence ratio on the mean relative displacement.
pub const DEFAULT_LLOYD_CONVERGENCE_EPSILON: f64 = 0.02;

/// Default relative move below which a vertex is frozen.
pub const DEFAULT_LLOYD_FREEZE_BOUND: f64 = 0.01;

/// Errors from Lloyd relocation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LloydError {
    /// A vertex could be reinserted neither at its target nor at its old
    /// position.
    #[error("Cannot reinsert vertex at {point} during rebuild: {source}")]
    Rebuild {
        /// The old position
        point: Point3,
        /// Why the reinsertion failed
        #[source]
        source: InsertionError,
    },
    /// The rebuild triangulation could not be created.
    #[error("Rebuild failed: {0}")]
    Insertion(#[from] InsertionError),
}

/// Statistics of a Lloyd run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LloydReport {
    /// Iterations performed
    pub iterations: usize,
    /// Mean relative displacement of each iteration
    pub displacement_history: Vec<f64>,
    /// Mean relative displacement of the last iteration
    pub mean_relative_displacement: f64,
    /// Largest distance a vertex actually moved in the last iteration
    pub max_displacement: f64,
    /// Vertices moved in the last iteration
    pub moved_vertices: usize,
    /// Vertices frozen in the last iteration
    pub frozen_vertices: usize,
    /// Whether the run met the convergence ratio
    pub converged: bool,
}

/// Centroid of the restricted Voronoi cell of `vertex`, or `None` when it
/// cannot be computed (open star, empty restriction).
#[must_use]
pub fn restricted_voronoi_centroid(
    tds: &Tds,
    domain: &LabeledDomain,
    vertex: VertexKey,
    label: SubdomainLabel,
) -> Option<Point3> {
    let apex = tds.vertex_point(vertex)?;
    let mut weighted = Point3::ORIGIN;
    let mut total = 0.0;
    for neighbor in tds.adjacent_vertices(vertex) {
        let ring = tds.cells_around_edge(vertex, neighbor)?;
        let corners: Vec<Point3> = ring
            .iter()
            .filter_map(|&c| tds.cell(c).map(crate::core::cell::Cell::circumcenter))
            .collect();
        if corners.len() < 3 {
            continue;
        }
        for pair in corners[1..].windows(2) {
            let tet = [apex, corners[0], pair[0], pair[1]];
            let volume = tetrahedron_volume(&tet).abs();
            if volume <= 0.0 {
                continue;
            }
            let Some(centroid) = Point3::centroid(&tet) else {
                continue;
            };
            if domain.label_at(centroid) == label {
                weighted = weighted + centroid * volume;
                total += volume;
            }
        }
    }
    (total > 0.0).then(|| weighted / total)
}

/// One relocation target.
struct Move {
    vertex: VertexKey,
    old: Point3,
    target: Point3,
    local_size: f64,
}

/// Targets of one iteration.
struct Candidates {
    moves: Vec<Move>,
    /// Positions of vertices that stay put because their move is too small
    frozen: Vec<[u64; 3]>,
    /// Interior vertices eligible for relocation, frozen ones included
    relocatable: usize,
}

fn point_key(p: Point3) -> [u64; 3] {
    p.coords().map(f64::to_bits)
}

fn shortest_incident_edge(tds: &Tds, vertex: VertexKey, p: Point3) -> Option<f64> {
    let shortest = tds
        .adjacent_vertices(vertex)
        .iter()
        .filter_map(|&w| tds.vertex_point(w))
        .map(|q| p.distance(q))
        .fold(f64::INFINITY, f64::min);
    (shortest.is_finite() && shortest > 0.0).then_some(shortest)
}

fn relocation_targets(
    triangulation: &Triangulation,
    domain: &LabeledDomain,
    freeze_bound: f64,
    frozen: &FastHashSet<[u64; 3]>,
    moved: &FastHashSet<[u64; 3]>,
) -> Candidates {
    let tds = triangulation.tds();
    let mut candidates = Candidates {
        moves: Vec::new(),
        frozen: Vec::new(),
        relocatable: 0,
    };
    for (key, vertex) in triangulation.mesh_vertices() {
        let VertexKind::Interior(label) = vertex.kind() else {
            continue;
        };
        if !vertex.kind().is_relocatable() {
            continue;
        }
        if tds
            .incident_cells(key)
            .iter()
            .any(|&c| triangulation.touches_bounding(c))
        {
            continue;
        }
        candidates.relocatable += 1;

        let old = vertex.point();
        let still_frozen = frozen.contains(&point_key(old))
            && !tds
                .adjacent_vertices(key)
                .iter()
                .filter_map(|&w| tds.vertex_point(w))
                .any(|q| moved.contains(&point_key(q)));
        if still_frozen {
            candidates.frozen.push(point_key(old));
            continue;
        }

        let Some(target) = restricted_voronoi_centroid(tds, domain, key, label) else {
            continue;
        };
        if domain.label_at(target) != label {
            continue;
        }
        let Some(local_size) = shortest_incident_edge(tds, key, old) else {
            continue;
        };
        if old.distance(target) / local_size < freeze_bound {
            candidates.frozen.push(point_key(old));
            continue;
        }
        candidates.moves.push(Move {
            vertex: key,
            old,
            target,
            local_size,
        });
    }
    candidates
}

/// Rebuilds the triangulation with some vertices moved. Vertices whose
/// target is rejected stay where they were; the returned flags tell, per
/// move, whether the target was kept.
fn rebuild(
    triangulation: &Triangulation,
    domain: &LabeledDomain,
    moves: &[Move],
) -> Result<(Triangulation, Vec<bool>), LloydError> {
    let targets: FastHashMap<VertexKey, usize> = moves
        .iter()
        .enumerate()
        .map(|(i, m)| (m.vertex, i))
        .collect();
    let entries: Vec<(Point3, Point3, VertexKind, Option<usize>)> = triangulation
        .mesh_vertices()
        .map(|(key, v)| {
            let index = targets.get(&key).copied();
            let target = index.map_or(v.point(), |i| moves[i].target);
            (target, v.point(), v.kind(), index)
        })
        .collect();
    let points: Vec<Point3> = entries.iter().map(|(p, _, _, _)| *p).collect();

    let mut accepted = vec![false; moves.len()];
    let mut rebuilt = triangulation.empty_like()?;
    for i in hilbert_order(&points) {
        let (target, old, kind, index) = entries[i];
        match rebuilt.insert(target, kind) {
            Ok(_) => {
                if let Some(index) = index {
                    accepted[index] = true;
                }
            }
            Err(first) => {
                if index.is_none() {
                    return Err(LloydError::Rebuild {
                        point: old,
                        source: first,
                    });
                }
                tracing::warn!(%target, error = %first, "relocation rejected, keeping old position");
                rebuilt
                    .insert(old, kind)
                    .map_err(|source| LloydError::Rebuild { point: old, source })?;
            }
        }
    }
    rebuilt.label_cells(domain);
    Ok((rebuilt, accepted))
}

/// Runs up to `max_iterations` Lloyd iterations in place.
///
/// `convergence_epsilon` bounds the mean displacement relative to the
/// shortest incident edge; vertices whose relative move is below
/// `freeze_bound` are frozen (`0.0` disables freezing).
///
/// # Errors
///
/// Returns [`LloydError`] if the rebuild cannot reinsert a vertex.
pub fn optimize(
    triangulation: &mut Triangulation,
    domain: &LabeledDomain,
    max_iterations: usize,
    convergence_epsilon: f64,
    freeze_bound: f64,
) -> Result<LloydReport, LloydError> {
    let mut report = LloydReport::default();
    let mut frozen = FastHashSet::default();
    let mut moved = FastHashSet::default();
    for iteration in 0..max_iterations {
        let candidates =
            relocation_targets(triangulation, domain, freeze_bound, &frozen, &moved);

        let accepted = if candidates.moves.is_empty() {
            Vec::new()
        } else {
            let (rebuilt, accepted) = rebuild(triangulation, domain, &candidates.moves)?;
            *triangulation = rebuilt;
            accepted
        };

        let mut max_displacement = 0.0_f64;
        let mut relative_sum = 0.0;
        moved.clear();
        for (m, _) in candidates.moves.iter().zip(&accepted).filter(|(_, ok)| **ok) {
            let distance = m.old.distance(m.target);
            max_displacement = max_displacement.max(distance);
            relative_sum += distance / m.local_size;
            moved.insert(point_key(m.target));
        }
        #[allow(clippy::cast_precision_loss)]
        let mean_relative = if candidates.relocatable == 0 {
            0.0
        } else {
            relative_sum / candidates.relocatable as f64
        };
        frozen = candidates.frozen.iter().copied().collect();

        report.iterations = iteration + 1;
        report.displacement_history.push(mean_relative);
        report.mean_relative_displacement = mean_relative;
        report.max_displacement = max_displacement;
        report.moved_vertices = moved.len();
        report.frozen_vertices = frozen.len();
        tracing::debug!(
            iteration,
            moved = report.moved_vertices,
            frozen = report.frozen_vertices,
            mean_relative,
            max_displacement,
            "lloyd iteration"
        );
        if moved.is_empty() || mean_relative < convergence_epsilon {
            report.converged = true;
            break;
        }
    }
    tracing::info!(
        iterations = report.iterations,
        converged = report.converged,
        mean_relative = report.mean_relative_displacement,
        "lloyd relocation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::refinement::RefinementEngine;
    use crate::core::algorithms::seeding::build_seed_triangulation;
    use crate::domain::function::{ScalarFunction, SphereFunction};
    use crate::domain::labeled::BoundingSphere;
    use crate::geometry::quality::MeshCriteria;

    // =============================================================================
    // HELPERS
    // =============================================================================

    fn refined_ball() -> (Triangulation, LabeledDomain) {
        let functions: Vec<Box<dyn ScalarFunction>> = vec![Box::new(SphereFunction::centered(1.0))];
        let domain = LabeledDomain::from_patterns(
            functions,
            &["-"],
            BoundingSphere::new(Point3::ORIGIN, 4.0),
            1e-6,
        )
        .unwrap();
        let (mut tri, _) = build_seed_triangulation(&domain, 512, 9).unwrap();
        let criteria = MeshCriteria {
            facet_angle: 25.0,
            facet_size: 0.5,
            facet_distance: 0.1,
            cell_radius_edge_ratio: 3.0,
            cell_size: 0.6,
        };
        RefinementEngine::new(&mut tri, &domain, criteria, 100_000)
            .run()
            .unwrap();
        (tri, domain)
    }

    fn kinds(tri: &Triangulation) -> Vec<VertexKind> {
        let mut kinds: Vec<VertexKind> = tri.mesh_vertices().map(|(_, v)| v.kind()).collect();
        kinds.sort_by_key(|k| format!("{k:?}"));
        kinds
    }

    fn targets(tri: &Triangulation, domain: &LabeledDomain, freeze_bound: f64) -> Candidates {
        relocation_targets(
            tri,
            domain,
            freeze_bound,
            &FastHashSet::default(),
            &FastHashSet::default(),
        )
    }

    // =============================================================================
    // TARGETS
    // =============================================================================

    #[test]
    fn test_centroid_stays_in_label() {
        let (tri, domain) = refined_ball();
        let candidates = targets(&tri, &domain, 0.0);
        assert!(!candidates.moves.is_empty());
        assert!(candidates.frozen.is_empty());
        for m in &candidates.moves {
            assert_eq!(domain.label_at(m.target), SubdomainLabel::Subdomain(0));
            assert!(m.local_size > 0.0);
        }
    }

    #[test]
    fn test_freeze_bound_holds_small_moves() {
        let (tri, domain) = refined_ball();
        let all = targets(&tri, &domain, 0.0);
        let bound = 0.05;
        let frozen = targets(&tri, &domain, bound);

        assert_eq!(all.relocatable, frozen.relocatable);
        assert_eq!(all.moves.len(), frozen.moves.len() + frozen.frozen.len());
        for m in &frozen.moves {
            assert!(m.old.distance(m.target) / m.local_size >= bound);
        }
    }

    #[test]
    fn test_frozen_vertex_thaws_when_neighbor_moves() {
        let (tri, domain) = refined_ball();
        let all = targets(&tri, &domain, 0.0);
        let first = &all.moves[0];
        let frozen: FastHashSet<[u64; 3]> = std::iter::once(point_key(first.old)).collect();

        let held = relocation_targets(&tri, &domain, 0.0, &frozen, &FastHashSet::default());
        assert!(held.moves.iter().all(|m| m.vertex != first.vertex));
        assert_eq!(held.frozen, vec![point_key(first.old)]);

        let neighbor = tri.tds().adjacent_vertices(first.vertex)[0];
        let neighbor_point = tri.tds().vertex_point(neighbor).unwrap();
        let moved: FastHashSet<[u64; 3]> = std::iter::once(point_key(neighbor_point)).collect();
        let thawed = relocation_targets(&tri, &domain, 0.0, &frozen, &moved);
        assert!(thawed.moves.iter().any(|m| m.vertex == first.vertex));
    }

    // =============================================================================
    // OPTIMIZE
    // =============================================================================

    #[test]
    fn test_optimize_preserves_vertices_and_delaunay() {
        let (mut tri, domain) = refined_ball();
        let before = tri.number_of_mesh_vertices();
        let kinds_before = kinds(&tri);

        let report = optimize(&mut tri, &domain, 5, 1e-3, 0.0).unwrap();
        assert!(report.iterations >= 1 && report.iterations <= 5);
        assert_eq!(report.displacement_history.len(), report.iterations);
        assert!(report.displacement_history.iter().all(|d| d.is_finite()));
        assert_eq!(
            report.converged,
            report.moved_vertices == 0
                || report.displacement_history.last().is_some_and(|&d| d < 1e-3)
        );

        assert_eq!(tri.number_of_mesh_vertices(), before);
        assert_eq!(kinds(&tri), kinds_before);
        assert!(tri.validate_delaunay().is_ok());
    }

    #[test]
    fn test_displacement_is_measured_on_rebuilt_positions() {
        let (mut tri, domain) = refined_ball();
        let planned = targets(&tri, &domain, 0.0);

        let report = optimize(&mut tri, &domain, 1, 1e-9, 0.0).unwrap();
        assert_eq!(report.iterations, 1);

        let present: FastHashSet<[u64; 3]> =
            tri.mesh_vertices().map(|(_, v)| point_key(v.point())).collect();
        let kept: Vec<&Move> = planned
            .moves
            .iter()
            .filter(|m| present.contains(&point_key(m.target)))
            .collect();
        let largest = kept
            .iter()
            .map(|m| m.old.distance(m.target))
            .fold(0.0_f64, f64::max);
        assert_eq!(report.moved_vertices, kept.len());
        approx::assert_relative_eq!(report.max_displacement, largest);
    }

    #[test]
    fn test_relative_convergence_with_freezing() {
        let (mut tri, domain) = refined_ball();
        let report = optimize(
            &mut tri,
            &domain,
            DEFAULT_LLOYD_MAX_ITERATIONS,
            DEFAULT_LLOYD_CONVERGENCE_EPSILON,
            DEFAULT_LLOYD_FREEZE_BOUND,
        )
        .unwrap();
        assert!(report.converged, "history {:?}", report.displacement_history);
        assert!(report.mean_relative_displacement < DEFAULT_LLOYD_CONVERGENCE_EPSILON);
        assert!(tri.validate_delaunay().is_ok());
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let (mut tri, domain) = refined_ball();
        let points: Vec<Point3> = tri.mesh_vertices().map(|(_, v)| v.point()).collect();
        let report = optimize(&mut tri, &domain, 0, 1e-3, DEFAULT_LLOYD_FREEZE_BOUND).unwrap();
        assert_eq!(report.iterations, 0);
        assert!(!report.converged);
        let after: Vec<Point3> = tri.mesh_vertices().map(|(_, v)| v.point()).collect();
        assert_eq!(points, after);
    }
}
