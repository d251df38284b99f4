//! Seed triangulation builder.
//!
//! The bounding cube of the bounding sphere is cut into an `n × n × n` grid
//! and one jittered sample is drawn per grid cell (stratified sampling).
//! Samples inside the bounding sphere are classified. Then:
//!
//! 1. every sub-domain spec must be hit by at least one sample, otherwise
//!    seeding fails with [`DomainEmptyError`]; one sample per sub-domain is
//!    drawn as an interior seed;
//! 2. every pair of axis-adjacent samples with different labels yields a
//!    surface point by bisection; surface points are thinned to the grid
//!    spacing.
//!
//! Seeds are inserted in Hilbert order and every cell is labeled.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::algorithms::insertion::InsertionError;
use crate::core::collections::HashGridIndex;
use crate::core::triangulation::Triangulation;
use crate::core::util::hilbert::hilbert_order;
use crate::core::vertex::VertexKind;
use crate::domain::labeled::LabeledDomain;
use crate::domain::multi_domain::SubdomainLabel;
use crate::geometry::point::Point3;

/// Default number of stratified samples.
pub const DEFAULT_SEED_SAMPLE_BUDGET: usize = 4096;

/// Jitter stays this far from grid-cell walls so adjacent samples never
/// coincide.
const JITTER_MARGIN: f64 = 0.1;

/// A sub-domain spec matched none of the stratified samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Sub-domain spec {spec_index} matched none of {samples} samples")]
pub struct DomainEmptyError {
    /// Index of the spec with no sample
    pub spec_index: usize,
    /// Number of samples drawn inside the bounding sphere
    pub samples: usize,
}

/// Errors from building the seed triangulation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeedError {
    /// A sub-domain has no sample.
    #[error(transparent)]
    DomainEmpty(#[from] DomainEmptyError),
    /// Inserting a seed failed.
    #[error("Seed insertion failed: {0}")]
    Insertion(#[from] InsertionError),
}

/// Statistics of the seeding phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    /// Grid resolution per axis
    pub grid_resolution: usize,
    /// Samples inside the bounding sphere
    pub samples: usize,
    /// Interior seeds inserted (one per sub-domain)
    pub interior_seeds: usize,
    /// Surface crossings found before thinning
    pub surface_candidates: usize,
    /// Surface seeds inserted
    pub surface_seeds: usize,
    /// Seeds skipped as duplicates
    pub skipped_duplicates: usize,
}

/// Grid resolution per axis for a sample budget.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn grid_resolution(sample_budget: usize) -> usize {
    ((sample_budget as f64).cbrt().floor() as usize).max(2)
}

struct Sample {
    point: Point3,
    label: SubdomainLabel,
}

/// Builds the seed triangulation of `domain`.
///
/// # Errors
///
/// Returns [`SeedError::DomainEmpty`] if a sub-domain spec matches no
/// sample, or [`SeedError::Insertion`] if the triangulation rejects a seed
/// for a reason other than duplication.
pub fn build_seed_triangulation(
    domain: &LabeledDomain,
    sample_budget: usize,
    rng_seed: u64,
) -> Result<(Triangulation, SeedReport), SeedError> {
    let sphere = *domain.bounding_sphere();
    let radius = sphere.radius();
    let n = grid_resolution(sample_budget);
    #[allow(clippy::cast_precision_loss)]
    let spacing = 2.0 * radius / n as f64;
    let corner = sphere.center - Point3::new(radius, radius, radius);
    let mut rng = StdRng::seed_from_u64(rng_seed);

    // Stratified jittered samples; `None` outside the bounding sphere.
    let mut grid: Vec<Option<Sample>> = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let mut jitter = || rng.random_range(JITTER_MARGIN..1.0 - JITTER_MARGIN);
                #[allow(clippy::cast_precision_loss)]
                let offset = Point3::new(
                    (i as f64 + jitter()) * spacing,
                    (j as f64 + jitter()) * spacing,
                    (k as f64 + jitter()) * spacing,
                );
                let point = corner + offset;
                grid.push(sphere.contains(point).then(|| Sample {
                    point,
                    label: domain.label_at(point),
                }));
            }
        }
    }
    let index = |i: usize, j: usize, k: usize| (i * n + j) * n + k;
    let samples = grid.iter().flatten().count();

    let mut report = SeedReport {
        grid_resolution: n,
        samples,
        ..SeedReport::default()
    };
    let mut seeds: Vec<(Point3, VertexKind)> = Vec::new();

    for spec_index in 0..domain.number_of_subdomains() {
        let label = SubdomainLabel::Subdomain(spec_index);
        let hits: Vec<Point3> = grid
            .iter()
            .flatten()
            .filter(|s| s.label == label)
            .map(|s| s.point)
            .collect();
        if hits.is_empty() {
            return Err(DomainEmptyError {
                spec_index,
                samples,
            }
            .into());
        }
        let chosen = hits[rng.random_range(0..hits.len())];
        seeds.push((chosen, VertexKind::Interior(label)));
        report.interior_seeds += 1;
    }

    let mut accepted: HashGridIndex<()> = HashGridIndex::new(spacing);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let Some(a) = &grid[index(i, j, k)] else {
                    continue;
                };
                let forward = [
                    (i + 1 < n).then(|| index(i + 1, j, k)),
                    (j + 1 < n).then(|| index(i, j + 1, k)),
                    (k + 1 < n).then(|| index(i, j, k + 1)),
                ];
                for b in forward.into_iter().flatten().filter_map(|idx| grid[idx].as_ref()) {
                    if a.label == b.label {
                        continue;
                    }
                    let Some(crossing) = domain.surface_crossing(a.point, b.point) else {
                        continue;
                    };
                    report.surface_candidates += 1;
                    if accepted.has_point_within(crossing, spacing) {
                        continue;
                    }
                    accepted.insert(crossing, ());
                    seeds.push((crossing, VertexKind::surface(a.label, b.label)));
                }
            }
        }
    }

    let mut triangulation = Triangulation::new(sphere.center, radius, rng_seed)?;
    let points: Vec<Point3> = seeds.iter().map(|(p, _)| *p).collect();
    for i in hilbert_order(&points) {
        let (point, kind) = seeds[i];
        match triangulation.insert(point, kind) {
            Ok(_) => {
                if matches!(kind, VertexKind::Surface(_)) {
                    report.surface_seeds += 1;
                }
            }
            Err(InsertionError::DuplicateVertex { .. }) => {
                tracing::warn!(%point, "skipping duplicate seed");
                report.skipped_duplicates += 1;
                if matches!(kind, VertexKind::Interior(_)) {
                    report.interior_seeds -= 1;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    triangulation.label_cells(domain);

    tracing::debug!(
        grid = n,
        samples = report.samples,
        interior = report.interior_seeds,
        surface = report.surface_seeds,
        cells = triangulation.number_of_cells(),
        "seed triangulation built"
    );
    Ok((triangulation, report))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::function::{ScalarFunction, SphereFunction};
    use crate::domain::labeled::BoundingSphere;

    fn ball_domain(patterns: &[&str], functions: Vec<Box<dyn ScalarFunction>>) -> LabeledDomain {
        LabeledDomain::from_patterns(
            functions,
            patterns,
            BoundingSphere::new(Point3::ORIGIN, 4.0),
            1e-6,
        )
        .unwrap()
    }

    #[test]
    fn test_grid_resolution() {
        assert_eq!(grid_resolution(4096), 16);
        assert_eq!(grid_resolution(1000), 10);
        assert_eq!(grid_resolution(1), 2);
    }

    #[test]
    fn test_seeds_cover_each_subdomain() {
        let domain = ball_domain(&["-"], vec![Box::new(SphereFunction::centered(1.0))]);
        let (tri, report) = build_seed_triangulation(&domain, 1000, 42).unwrap();

        assert_eq!(report.interior_seeds, 1);
        assert!(report.surface_seeds > 10);
        assert!(report.surface_candidates >= report.surface_seeds);
        assert_eq!(
            tri.number_of_mesh_vertices(),
            report.interior_seeds + report.surface_seeds
        );
        assert!(tri.validate_delaunay().is_ok());

        // Seeds lie strictly inside the bounding sphere.
        for (_, v) in tri.mesh_vertices() {
            assert!(domain.bounding_sphere().contains(v.point()));
        }
        // Surface seeds lie close to the unit sphere.
        for (_, v) in tri.mesh_vertices() {
            if matches!(v.kind(), VertexKind::Surface(_)) {
                approx::assert_relative_eq!(v.point().norm(), 1.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_seeding_is_deterministic() {
        let domain = ball_domain(&["-"], vec![Box::new(SphereFunction::centered(1.0))]);
        let (a, ra) = build_seed_triangulation(&domain, 512, 7).unwrap();
        let (b, rb) = build_seed_triangulation(&domain, 512, 7).unwrap();
        assert_eq!(ra, rb);
        let pa: Vec<Point3> = a.mesh_vertices().map(|(_, v)| v.point()).collect();
        let pb: Vec<Point3> = b.mesh_vertices().map(|(_, v)| v.point()).collect();
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_impossible_spec_is_domain_empty() {
        // Inside and outside the same sphere at once.
        let functions: Vec<Box<dyn ScalarFunction>> = vec![
            Box::new(SphereFunction::centered(1.0)),
            Box::new(SphereFunction::centered(1.0)),
        ];
        let domain = ball_domain(&["--", "+-"], functions);
        let err = build_seed_triangulation(&domain, 512, 1).unwrap_err();
        assert!(matches!(
            err,
            SeedError::DomainEmpty(DomainEmptyError { spec_index: 1, .. })
        ));
    }
}
