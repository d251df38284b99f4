//! # implicit-mesh
//!
//! Delaunay refinement meshing of volumes bounded by implicit surfaces, in
//! the spirit of [CGAL](https://www.cgal.org)'s Mesh_3 package.
//!
//! A domain is described by a set of scalar functions and a list of
//! sub-domain sign patterns. A point belongs to sub-domain `i` when the
//! signs of the functions at that point match pattern `i`; zero counts as
//! `+`. The mesher produces a tetrahedral mesh of every sub-domain together
//! with the triangulated surfaces separating them.
//!
//! # Features
//!
//! - Analytic sphere and torus functions, plus arbitrary closures
//! - Multi-domain sign patterns such as `"+-"`
//! - Exact orientation and insphere predicates
//! - Facet criteria (angle, size, approximation distance) and cell criteria
//!   (radius-edge ratio, size)
//! - Optional Lloyd relocation restricted to sub-domains
//! - Medit export and serialization with [serde](https://serde.rs)
//!
//! # Basic Usage
//!
//! A torus intersected with a ball:
//!
//! ```rust
//! use implicit_mesh::prelude::*;
//!
//! let functions: Vec<Box<dyn ScalarFunction>> = vec![
//!     Box::new(TorusFunction::default()),
//!     Box::new(SphereFunction::centered(3.0)),
//! ];
//! let domain = LabeledDomain::from_patterns(
//!     functions,
//!     &["+-"],
//!     BoundingSphere::new(Point3::ORIGIN, 25.0),
//!     1e-4,
//! )
//! .unwrap();
//!
//! let options = MeshOptions {
//!     criteria: MeshCriteria {
//!         facet_angle: 20.0,
//!         facet_size: 1.5,
//!         facet_distance: 0.5,
//!         cell_radius_edge_ratio: 4.0,
//!         cell_size: 2.0,
//!     },
//!     seed_sample_budget: 512,
//!     ..MeshOptions::no_lloyd()
//! };
//! let mesh = generate_mesh(&domain, options).unwrap();
//!
//! assert!(mesh.number_of_cells() > 0);
//! assert!(mesh.cells().iter().all(|c| c.label == SubdomainLabel::Subdomain(0)));
//! ```
//!
//! # Debugging
//!
//! Debug builds honor two environment variables:
//!
//! - `IMPLICIT_MESH_DEBUG_PROGRESS_EVERY=n` prints refinement progress every
//!   `n` insertions;
//! - `IMPLICIT_MESH_DEBUG_DELAUNAY` prints every violation found by Delaunay
//!   validation.

#![forbid(unsafe_code)]

#[macro_use]
extern crate derive_builder;

/// Triangulation data structures and the meshing algorithms built on them.
pub mod core {
    /// Insertion, point location, seeding, refinement and relocation.
    pub mod algorithms {
        /// Cavity-based vertex insertion
        pub mod insertion;
        /// Restricted Lloyd relocation
        pub mod lloyd;
        /// Point location and conflict regions
        pub mod locate;
        /// Delaunay refinement engine
        pub mod refinement;
        /// Seed triangulation builder
        pub mod seeding;
    }
    pub mod cell;
    /// Storage and hashing aliases plus a uniform hash grid
    pub mod collections;
    pub mod facet;
    /// Extraction and export of the final mesh
    pub mod mesh_complex;
    /// Delaunay triangulation inside an enclosing simplex
    pub mod triangulation;
    pub mod triangulation_data_structure;
    /// Helpers that operate on whole triangulations or point sets.
    pub mod util {
        /// Delaunay property validation
        pub mod delaunay_validation;
        /// Hilbert curve ordering
        pub mod hilbert;
        pub use delaunay_validation::*;
        pub use hilbert::*;
    }
    pub mod vertex;

    pub use cell::*;
    pub use facet::*;
    pub use mesh_complex::*;
    pub use triangulation::*;
    pub use triangulation_data_structure::*;
    pub use vertex::*;
}

/// Scalar functions, sign patterns and labeled domains.
pub mod domain {
    pub mod function;
    pub mod labeled;
    pub mod multi_domain;

    pub use function::*;
    pub use labeled::*;
    pub use multi_domain::*;
}

/// Points, exact predicates and quality measures.
pub mod geometry {
    pub mod point;
    pub mod predicates;
    /// Mesh criteria and simplex quality measures
    pub mod quality;
    /// Circumcenters, angles and volumes
    pub mod util;

    pub use point::*;
    pub use predicates::*;
    pub use quality::*;
    pub use util::*;
}

pub mod mesher;

/// Commonly used types for building meshes.
pub mod prelude {
    pub use crate::core::{
        algorithms::{
            lloyd::{
                DEFAULT_LLOYD_CONVERGENCE_EPSILON, DEFAULT_LLOYD_FREEZE_BOUND,
                DEFAULT_LLOYD_MAX_ITERATIONS, LloydError, LloydReport,
            },
            refinement::{
                RefinementAbortedError, RefinementEngine, RefinementError, RefinementReport,
                RefinementState,
            },
            seeding::{DomainEmptyError, SeedReport, build_seed_triangulation},
        },
        mesh_complex::*,
        triangulation::Triangulation,
        vertex::VertexKind,
    };

    pub use crate::core::collections::{
        CellKeyBuffer, FastHashMap, FastHashSet, SmallBuffer, fast_hash_map_with_capacity,
        fast_hash_set_with_capacity,
    };

    pub use crate::domain::{function::*, labeled::*, multi_domain::*};

    pub use crate::geometry::{point::*, predicates::*, quality::*};

    pub use crate::mesher::*;
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use crate::{
        core::{
            cell::Cell, mesh_complex::MeshComplex, triangulation::Triangulation,
            triangulation_data_structure::Tds, vertex::Vertex,
        },
        domain::labeled::LabeledDomain,
        geometry::{point::Point3, quality::MeshCriteria},
        is_normal,
        mesher::MeshOptions,
    };

    // =============================================================================
    // TYPE SAFETY TESTS
    // =============================================================================

    #[test]
    fn normal_types() {
        assert!(is_normal::<Point3>());
        assert!(is_normal::<Vertex>());
        assert!(is_normal::<Cell>());
        assert!(is_normal::<Tds>());
        assert!(is_normal::<Triangulation>());
        assert!(is_normal::<MeshCriteria>());
        assert!(is_normal::<MeshOptions>());
        assert!(is_normal::<MeshComplex>());
        assert!(is_normal::<LabeledDomain>());
    }

    #[test]
    fn test_prelude_collections_exports() {
        use crate::prelude::*;

        let mut map: FastHashMap<u64, usize> = FastHashMap::default();
        map.insert(123, 456);
        assert_eq!(map.get(&123), Some(&456));

        let mut set: FastHashSet<u64> = FastHashSet::default();
        set.insert(789);
        assert!(set.contains(&789));

        let mut buffer: SmallBuffer<i32, 8> = SmallBuffer::new();
        buffer.push(42);
        assert_eq!(buffer.len(), 1);

        assert!(fast_hash_map_with_capacity::<u64, usize>(100).capacity() >= 100);
        assert!(fast_hash_set_with_capacity::<u64>(50).capacity() >= 50);
    }

    #[test]
    fn test_prelude_quality_exports() {
        use crate::prelude::*;

        let tet = [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ];
        approx::assert_relative_eq!(radius_ratio(&tet).unwrap(), 3.0, epsilon = 1e-9);
        approx::assert_relative_eq!(normalized_volume(&tet).unwrap(), 1.0, epsilon = 1e-9);
    }
}
