//! End-to-end mesh generation.
//!
//! [`generate_mesh`] runs the full pipeline over a [`LabeledDomain`]:
//!
//! 1. build the seed triangulation;
//! 2. refine until every surface facet and labeled cell meets the criteria;
//! 3. optionally relocate vertices with Lloyd iterations, then refine again
//!    to repair any element the relocation degraded;
//! 4. extract the [`MeshComplex`].
//!
//! # Examples
//!
//! ```
//! use implicit_mesh::prelude::*;
//!
//! let functions: Vec<Box<dyn ScalarFunction>> = vec![Box::new(SphereFunction::centered(1.0))];
//! let domain = LabeledDomain::from_patterns(
//!     functions,
//!     &["-"],
//!     BoundingSphere::new(Point3::ORIGIN, 4.0),
//!     1e-6,
//! )
//! .unwrap();
//! let criteria = MeshCriteriaBuilder::default()
//!     .facet_angle(25.0)
//!     .facet_size(0.5)
//!     .facet_distance(0.1)
//!     .cell_radius_edge_ratio(3.0)
//!     .cell_size(0.8)
//!     .build()
//!     .unwrap();
//! let options = MeshOptions {
//!     criteria,
//!     seed_sample_budget: 512,
//!     ..MeshOptions::no_lloyd()
//! };
//!
//! let mesh = generate_mesh(&domain, options).unwrap();
//! assert!(mesh.number_of_cells() > 0);
//! assert!(mesh.cells().iter().all(|c| !c.label.is_outside()));
//! ```

use serde::{Deserialize, Serialize};

use crate::core::algorithms::insertion::InsertionError;
use crate::core::algorithms::lloyd::{
    DEFAULT_LLOYD_CONVERGENCE_EPSILON, DEFAULT_LLOYD_FREEZE_BOUND, DEFAULT_LLOYD_MAX_ITERATIONS,
    LloydError, LloydReport, optimize,
};
use crate::core::algorithms::refinement::{
    DEFAULT_MAX_REFINEMENT_STEPS, RefinementAbortedError, RefinementEngine, RefinementError,
    RefinementReport,
};
use crate::core::algorithms::seeding::{
    DEFAULT_SEED_SAMPLE_BUDGET, DomainEmptyError, SeedError, SeedReport,
    build_seed_triangulation,
};
use crate::core::mesh_complex::{MeshComplex, MeshStatistics};
use crate::core::triangulation::Triangulation;
use crate::domain::labeled::LabeledDomain;
use crate::geometry::quality::MeshCriteria;

/// Default seed for every random choice of the pipeline.
pub const DEFAULT_RNG_SEED: u64 = 0x5eed_ca11;

// =============================================================================
// OPTIONS
// =============================================================================

/// Mesh generation options.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct MeshOptions {
    /// Quality bounds for surface facets and cells.
    #[builder(default)]
    pub criteria: MeshCriteria,
    /// Run Lloyd relocation after refinement.
    #[builder(default = "false")]
    pub use_lloyd: bool,
    /// Lloyd iteration cap.
    #[builder(default = "DEFAULT_LLOYD_MAX_ITERATIONS")]
    pub lloyd_max_iterations: usize,
    /// Lloyd stops once the mean move, relative to the shortest incident
    /// edge, is below this ratio.
    #[builder(default = "DEFAULT_LLOYD_CONVERGENCE_EPSILON")]
    pub lloyd_convergence_epsilon: f64,
    /// Vertices whose relative move is below this ratio are frozen.
    #[builder(default = "DEFAULT_LLOYD_FREEZE_BOUND")]
    pub lloyd_freeze_bound: f64,
    /// Insertion budget shared by all refinement passes.
    #[builder(default = "DEFAULT_MAX_REFINEMENT_STEPS")]
    pub max_refinement_steps: usize,
    /// Number of stratified samples used for seeding.
    #[builder(default = "DEFAULT_SEED_SAMPLE_BUDGET")]
    pub seed_sample_budget: usize,
    #[builder(default = "DEFAULT_RNG_SEED")]
    pub rng_seed: u64,
    /// Sub-domain indices dropped from the output.
    #[builder(default)]
    pub excluded_subdomains: Vec<usize>,
    /// Validate the Delaunay property every `n` refinement insertions.
    #[builder(default)]
    pub validate_every: Option<usize>,
}

impl MeshOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(eps) = self.lloyd_convergence_epsilon
            && !(eps.is_finite() && eps > 0.0)
        {
            return Err(format!(
                "lloyd_convergence_epsilon must be positive and finite, got {eps}"
            ));
        }
        if let Some(bound) = self.lloyd_freeze_bound
            && !(bound.is_finite() && bound >= 0.0)
        {
            return Err(format!(
                "lloyd_freeze_bound must be non-negative and finite, got {bound}"
            ));
        }
        if self.seed_sample_budget == Some(0) {
            return Err("seed_sample_budget must be positive".to_string());
        }
        if let Some(Some(0)) = self.validate_every {
            return Err("validate_every must be positive when set".to_string());
        }
        Ok(())
    }
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            criteria: MeshCriteria::default(),
            use_lloyd: false,
            lloyd_max_iterations: DEFAULT_LLOYD_MAX_ITERATIONS,
            lloyd_convergence_epsilon: DEFAULT_LLOYD_CONVERGENCE_EPSILON,
            lloyd_freeze_bound: DEFAULT_LLOYD_FREEZE_BOUND,
            max_refinement_steps: DEFAULT_MAX_REFINEMENT_STEPS,
            seed_sample_budget: DEFAULT_SEED_SAMPLE_BUDGET,
            rng_seed: DEFAULT_RNG_SEED,
            excluded_subdomains: Vec::new(),
            validate_every: None,
        }
    }
}

impl MeshOptions {
    /// Default options with Lloyd relocation enabled.
    #[must_use]
    pub fn lloyd() -> Self {
        Self {
            use_lloyd: true,
            ..Self::default()
        }
    }

    /// Default options with Lloyd relocation disabled.
    #[must_use]
    pub fn no_lloyd() -> Self {
        Self::default()
    }
}

// =============================================================================
// ERRORS AND REPORT
// =============================================================================

/// Errors from [`generate_mesh`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshGenerationError {
    /// A sub-domain matched no seed sample.
    #[error(transparent)]
    DomainEmpty(#[from] DomainEmptyError),
    /// Refinement did not converge within the budget.
    #[error(transparent)]
    RefinementAborted(#[from] RefinementAbortedError),
    /// The triangulation rejected a point it should have accepted.
    #[error("Triangulation failure: {0}")]
    Insertion(#[from] InsertionError),
    /// Sampled validation found a broken invariant.
    #[error("Invariant violated after {steps} insertions: {message}")]
    InvariantViolation {
        /// Insertions performed
        steps: usize,
        /// Validation error message
        message: String,
    },
    /// Lloyd relocation failed.
    #[error(transparent)]
    Lloyd(#[from] LloydError),
    /// Invalid options.
    #[error("Invalid mesh options: {0}")]
    Options(String),
}

impl From<SeedError> for MeshGenerationError {
    fn from(error: SeedError) -> Self {
        match error {
            SeedError::DomainEmpty(e) => Self::DomainEmpty(e),
            SeedError::Insertion(e) => Self::Insertion(e),
        }
    }
}

impl From<RefinementError> for MeshGenerationError {
    fn from(error: RefinementError) -> Self {
        match error {
            RefinementError::Aborted(e) => Self::RefinementAborted(e),
            RefinementError::Insertion(e) => Self::Insertion(e),
            RefinementError::InvariantViolation { steps, message } => {
                Self::InvariantViolation { steps, message }
            }
        }
    }
}

impl From<MeshOptionsBuilderError> for MeshGenerationError {
    fn from(error: MeshOptionsBuilderError) -> Self {
        Self::Options(error.to_string())
    }
}

/// Statistics of every phase of a [`generate_mesh_with_report`] run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshReport {
    pub seeding: SeedReport,
    pub refinement: RefinementReport,
    /// Present when Lloyd relocation ran
    pub lloyd: Option<LloydReport>,
    /// Repair pass after Lloyd relocation
    pub post_lloyd_refinement: Option<RefinementReport>,
    pub statistics: MeshStatistics,
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Generates a labeled tetrahedral mesh of `domain`.
///
/// # Errors
///
/// Returns [`MeshGenerationError::DomainEmpty`] if a sub-domain has no seed
/// sample, [`MeshGenerationError::RefinementAborted`] if refinement does not
/// converge within `options.max_refinement_steps` insertions, and the
/// remaining variants for internal failures or invalid options.
pub fn generate_mesh(
    domain: &LabeledDomain,
    options: MeshOptions,
) -> Result<MeshComplex, MeshGenerationError> {
    generate_mesh_with_report(domain, options).map(|(mesh, _)| mesh)
}

/// Like [`generate_mesh`], also returning per-phase statistics.
///
/// # Errors
///
/// See [`generate_mesh`].
pub fn generate_mesh_with_report(
    domain: &LabeledDomain,
    options: MeshOptions,
) -> Result<(MeshComplex, MeshReport), MeshGenerationError> {
    if options.validate_every == Some(0) {
        return Err(MeshGenerationError::Options(
            "validate_every must be positive when set".to_string(),
        ));
    }

    let (mut triangulation, seeding) =
        build_seed_triangulation(domain, options.seed_sample_budget, options.rng_seed)?;
    tracing::info!(
        vertices = triangulation.number_of_mesh_vertices(),
        cells = triangulation.number_of_cells(),
        "seeding finished"
    );

    let refinement = refine(
        &mut triangulation,
        domain,
        &options,
        options.max_refinement_steps,
    )?;
    tracing::info!(
        steps = refinement.steps,
        vertices = triangulation.number_of_mesh_vertices(),
        "refinement converged"
    );

    let (lloyd, post_lloyd_refinement) = if options.use_lloyd {
        let lloyd = optimize(
            &mut triangulation,
            domain,
            options.lloyd_max_iterations,
            options.lloyd_convergence_epsilon,
            options.lloyd_freeze_bound,
        )?;
        let remaining = options.max_refinement_steps.saturating_sub(refinement.steps);
        let repair = refine(&mut triangulation, domain, &options, remaining)?;
        tracing::info!(steps = repair.steps, "post-relocation refinement converged");
        (Some(lloyd), Some(repair))
    } else {
        (None, None)
    };

    let mesh = MeshComplex::extract(&triangulation, domain, &options.excluded_subdomains);
    let statistics = mesh.statistics();
    tracing::info!(
        vertices = statistics.vertices,
        facets = statistics.facets,
        cells = statistics.cells,
        min_facet_angle = statistics.min_facet_angle,
        "mesh extracted"
    );
    Ok((
        mesh,
        MeshReport {
            seeding,
            refinement,
            lloyd,
            post_lloyd_refinement,
            statistics,
        },
    ))
}

fn refine(
    triangulation: &mut Triangulation,
    domain: &LabeledDomain,
    options: &MeshOptions,
    max_steps: usize,
) -> Result<RefinementReport, RefinementError> {
    RefinementEngine::new(triangulation, domain, options.criteria, max_steps)
        .with_validation_every(options.validate_every)
        .run()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = MeshOptions::default();
        assert_eq!(options.criteria, MeshCriteria::default());
        assert!(!options.use_lloyd);
        assert_eq!(options.lloyd_max_iterations, 25);
        approx::assert_relative_eq!(options.lloyd_convergence_epsilon, 0.02);
        approx::assert_relative_eq!(options.lloyd_freeze_bound, 0.01);
        assert_eq!(options.seed_sample_budget, DEFAULT_SEED_SAMPLE_BUDGET);
        assert!(options.excluded_subdomains.is_empty());
        assert!(MeshOptions::lloyd().use_lloyd);
        assert_eq!(MeshOptions::no_lloyd(), options);
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let built = MeshOptionsBuilder::default().build().unwrap();
        assert_eq!(built, MeshOptions::default());
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(
            MeshOptionsBuilder::default()
                .lloyd_convergence_epsilon(0.0)
                .build()
                .is_err()
        );
        assert!(
            MeshOptionsBuilder::default()
                .lloyd_freeze_bound(-0.1)
                .build()
                .is_err()
        );
        assert!(
            MeshOptionsBuilder::default()
                .lloyd_freeze_bound(0.0)
                .build()
                .is_ok()
        );
        assert!(
            MeshOptionsBuilder::default()
                .seed_sample_budget(0)
                .build()
                .is_err()
        );
        let err: MeshGenerationError = MeshOptionsBuilder::default()
            .validate_every(Some(0))
            .build()
            .unwrap_err()
            .into();
        assert!(matches!(err, MeshGenerationError::Options(_)));
    }

    #[test]
    fn test_options_serde_roundtrip() {
        let options = MeshOptionsBuilder::default()
            .use_lloyd(true)
            .excluded_subdomains(vec![1])
            .build()
            .unwrap();
        let json = serde_json::to_string(&options).unwrap();
        let back: MeshOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, back);
    }

    #[test]
    fn test_error_conversion() {
        let aborted = RefinementAbortedError {
            steps: 3,
            remaining_violations: 7,
        };
        let err: MeshGenerationError = RefinementError::from(aborted).into();
        assert_eq!(err, MeshGenerationError::RefinementAborted(aborted));

        let empty = DomainEmptyError {
            spec_index: 2,
            samples: 10,
        };
        let err: MeshGenerationError = SeedError::from(empty).into();
        assert_eq!(err, MeshGenerationError::DomainEmpty(empty));
    }
}
