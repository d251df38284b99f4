//! Delaunay refinement driven by facet and cell quality criteria.
//!
//! The engine keeps a priority queue of bad elements. A *surface facet*
//! separates two cells with different labels; its *surface center* is the
//! point where the dual Voronoi edge (the segment between the two
//! circumcenters) crosses the domain boundary. Bad surface facets are
//! refined by inserting their surface center. Bad labeled cells are refined
//! by inserting their circumcenter, unless it falls inside the surface
//! Delaunay ball of a surface facet in its conflict region, in which case
//! that facet's surface center is inserted instead.
//!
//! Facets always come before cells; within a level the largest violation
//! goes first. Entries are checked again when popped, since the element may
//! have been destroyed in the meantime.
//!
//! # States
//!
//! `Seeded → Refining → Converged | Aborted`. The engine aborts when the
//! insertion budget is exhausted, or when the only bad elements left could
//! not be refined (the triangulation rejected their refinement point).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::algorithms::insertion::{InsertionError, InsertionInfo};
use crate::core::collections::{CellKeyBuffer, FastHashSet};
use crate::core::facet::FacetHandle;
use crate::core::triangulation::Triangulation;
use crate::core::triangulation_data_structure::{CellKey, VertexKey};
use crate::core::vertex::VertexKind;
use crate::domain::labeled::LabeledDomain;
use crate::domain::multi_domain::SubdomainLabel;
use crate::geometry::point::Point3;
use crate::geometry::quality::{
    CellGeometry, FacetGeometry, MeshCriteria, Verdict, evaluate_cell, evaluate_facet,
};

/// Default insertion budget.
pub const DEFAULT_MAX_REFINEMENT_STEPS: usize = 500_000;

/// Interval (in insertions) between progress log lines.
const PROGRESS_LOG_INTERVAL: usize = 10_000;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// The insertion budget ran out, or only unrefinable violations remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Refinement aborted after {steps} insertions with {remaining_violations} violations left")]
pub struct RefinementAbortedError {
    /// Insertions performed
    pub steps: usize,
    /// Bad facets and cells left
    pub remaining_violations: usize,
}

/// Errors from the refinement engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RefinementError {
    /// Refinement did not converge.
    #[error(transparent)]
    Aborted(#[from] RefinementAbortedError),
    /// The triangulation failed in a way that indicates corruption.
    #[error("Insertion failed during refinement: {0}")]
    Insertion(#[from] InsertionError),
    /// Sampled validation found a broken invariant.
    #[error("Invariant violated after {steps} insertions: {message}")]
    InvariantViolation {
        /// Insertions performed
        steps: usize,
        /// Validation error message
        message: String,
    },
}

// =============================================================================
// SURFACE FACETS
// =============================================================================

/// A facet whose two cells carry different labels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceFacet {
    /// Handle from the side it was queried from
    pub facet: FacetHandle,
    /// Vertex keys, oriented outward from `facet`'s cell
    pub vertices: [VertexKey; 3],
    /// Labels on the two sides, sorted
    pub labels: [SubdomainLabel; 2],
    /// Triangle and surface center
    pub geometry: FacetGeometry,
}

impl SurfaceFacet {
    /// Squared radius of the surface Delaunay ball (centered at the surface
    /// center, through the facet's vertices).
    #[must_use]
    pub fn squared_ball_radius(&self) -> f64 {
        self.geometry
            .surface_center
            .distance_squared(self.geometry.vertices[0])
    }

    /// Returns `true` if `point` is strictly inside the surface ball.
    #[must_use]
    pub fn ball_contains(&self, point: Point3) -> bool {
        point.distance_squared(self.geometry.surface_center) < self.squared_ball_radius()
    }
}

/// Returns the facet as a [`SurfaceFacet`] if it has a neighbor with a
/// different label.
#[must_use]
pub fn surface_facet(
    triangulation: &Triangulation,
    domain: &LabeledDomain,
    facet: FacetHandle,
) -> Option<SurfaceFacet> {
    let tds = triangulation.tds();
    let cell = tds.cell(facet.cell_key())?;
    let neighbor = tds.cell(cell.neighbor(facet.index())?)?;
    let (inside, outside) = (cell.label(), neighbor.label());
    if inside == outside {
        return None;
    }
    // Bisect from the smaller label's side so both handles agree.
    let (labels, from, to) = if inside < outside {
        ([inside, outside], cell, neighbor)
    } else {
        ([outside, inside], neighbor, cell)
    };
    let surface_center = domain.surface_crossing(from.circumcenter(), to.circumcenter())?;
    Some(SurfaceFacet {
        facet,
        vertices: tds.facet_vertices(facet)?,
        labels,
        geometry: FacetGeometry {
            vertices: tds.facet_points(facet)?,
            surface_center,
        },
    })
}

// =============================================================================
// QUEUE
// =============================================================================

/// An element the engine may refine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    /// A surface facet
    Facet(FacetHandle),
    /// A labeled cell
    Cell(CellKey),
}

/// Vertex-set identity of an element, stable across handle changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum ElementId {
    Facet([VertexKey; 3]),
    Cell([VertexKey; 4]),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    /// Facets (1) pop before cells (0).
    level: u8,
    magnitude: OrderedFloat<f64>,
    sequence: Reverse<u64>,
    element: Element,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Lifecycle of a [`RefinementEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementState {
    /// Constructed; no sweep yet.
    Seeded,
    /// Queue active.
    Refining,
    /// Every facet and cell satisfies the criteria.
    Converged,
    /// Budget exhausted or stuck on unrefinable elements.
    Aborted,
}

/// Result of one [`RefinementEngine::step`].
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// A point was inserted.
    Inserted {
        /// The inserted point
        point: Point3,
        /// Its vertex kind
        kind: VertexKind,
    },
    /// The popped element's refinement point could not be inserted.
    Unrefinable,
    /// Terminal: converged.
    Converged,
    /// Terminal: aborted.
    Aborted,
}

/// Statistics of a refinement run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// Total insertions
    pub steps: usize,
    /// Surface centers inserted for bad facets
    pub facet_insertions: usize,
    /// Circumcenters inserted for bad cells
    pub cell_insertions: usize,
    /// Cell refinements redirected to an encroached surface facet
    pub redirected_insertions: usize,
    /// Elements whose refinement point was rejected
    pub unrefinable: usize,
    /// Queue entries dropped because the element no longer existed
    pub stale_entries: usize,
    /// Full sweeps over the triangulation
    pub sweeps: usize,
    /// Bad elements left at termination
    pub remaining_violations: usize,
}

/// Refines a labeled triangulation until every surface facet and labeled
/// cell satisfies the [`MeshCriteria`].
pub struct RefinementEngine<'a> {
    triangulation: &'a mut Triangulation,
    domain: &'a LabeledDomain,
    criteria: MeshCriteria,
    max_steps: usize,
    validate_every: Option<usize>,
    state: RefinementState,
    queue: BinaryHeap<QueueEntry>,
    sequence: u64,
    unrefinable: FastHashSet<ElementId>,
    report: RefinementReport,
    #[cfg(debug_assertions)]
    progress_every: Option<usize>,
}

impl<'a> RefinementEngine<'a> {
    /// Creates an engine over a labeled seed triangulation.
    #[must_use]
    pub fn new(
        triangulation: &'a mut Triangulation,
        domain: &'a LabeledDomain,
        criteria: MeshCriteria,
        max_steps: usize,
    ) -> Self {
        Self {
            triangulation,
            domain,
            criteria,
            max_steps,
            validate_every: None,
            state: RefinementState::Seeded,
            queue: BinaryHeap::new(),
            sequence: 0,
            unrefinable: FastHashSet::default(),
            report: RefinementReport::default(),
            #[cfg(debug_assertions)]
            progress_every: std::env::var("IMPLICIT_MESH_DEBUG_PROGRESS_EVERY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0),
        }
    }

    /// Validates the Delaunay property every `n` insertions.
    #[must_use]
    pub fn with_validation_every(mut self, n: Option<usize>) -> Self {
        self.validate_every = n;
        self
    }

    #[must_use]
    pub const fn state(&self) -> RefinementState {
        self.state
    }

    #[must_use]
    pub const fn report(&self) -> &RefinementReport {
        &self.report
    }

    #[must_use]
    pub fn triangulation(&self) -> &Triangulation {
        self.triangulation
    }

    /// Number of queued entries, stale ones included.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // =========================================================================
    // EVALUATION
    // =========================================================================

    fn cell_verdict(&self, cell_key: CellKey) -> Option<Verdict> {
        let cell = self.triangulation.tds().cell(cell_key)?;
        if cell.label().is_outside() {
            return Some(Verdict::Satisfied);
        }
        if self.triangulation.touches_bounding(cell_key) {
            return Some(Verdict::Violated {
                magnitude: f64::INFINITY,
            });
        }
        let vertices = self.triangulation.tds().cell_points(cell_key)?;
        Some(evaluate_cell(&CellGeometry { vertices }, &self.criteria))
    }

    fn facet_verdict(&self, facet: FacetHandle) -> Option<(SurfaceFacet, Verdict)> {
        let surface = surface_facet(self.triangulation, self.domain, facet)?;
        let verdict = evaluate_facet(&surface.geometry, &self.criteria);
        Some((surface, verdict))
    }

    fn element_id(&self, element: Element) -> Option<ElementId> {
        let tds = self.triangulation.tds();
        Some(match element {
            Element::Facet(facet) => {
                let mut v = tds.facet_vertices(facet)?;
                v.sort_unstable();
                ElementId::Facet(v)
            }
            Element::Cell(cell_key) => {
                let mut v = *tds.cell(cell_key)?.vertices();
                v.sort_unstable();
                ElementId::Cell(v)
            }
        })
    }

    fn verdict(&self, element: Element) -> Option<Verdict> {
        match element {
            Element::Facet(facet) => self.facet_verdict(facet).map(|(_, v)| v),
            Element::Cell(cell_key) => self.cell_verdict(cell_key),
        }
    }

    fn push(&mut self, element: Element, verdict: Verdict) {
        let level = match element {
            Element::Facet(_) => 1,
            Element::Cell(_) => 0,
        };
        self.sequence += 1;
        self.queue.push(QueueEntry {
            level,
            magnitude: OrderedFloat(verdict.magnitude()),
            sequence: Reverse(self.sequence),
            element,
        });
    }

    /// Queues `element` if it is bad and refinable. Returns `Some(true)` if
    /// queued, `Some(false)` if bad but unrefinable, `None` if fine.
    fn consider(&mut self, element: Element) -> Option<bool> {
        let verdict = self.verdict(element)?;
        if verdict.is_satisfied() {
            return None;
        }
        if self
            .element_id(element)
            .is_some_and(|id| self.unrefinable.contains(&id))
        {
            return Some(false);
        }
        self.push(element, verdict);
        Some(true)
    }

    /// Candidate elements around a set of cells: the cells themselves and
    /// all their facets that have a neighbor.
    fn elements_of(&self, cells: &[CellKey]) -> Vec<Element> {
        let tds = self.triangulation.tds();
        let mut elements = Vec::with_capacity(cells.len() * 5);
        for &cell_key in cells {
            let Some(cell) = tds.cell(cell_key) else {
                continue;
            };
            elements.push(Element::Cell(cell_key));
            for (i, neighbor) in cell.neighbors().iter().enumerate() {
                if neighbor.is_some() {
                    #[allow(clippy::cast_possible_truncation)]
                    elements.push(Element::Facet(FacetHandle::new(cell_key, i as u8)));
                }
            }
        }
        elements
    }

    /// Every cell, and every interior facet once (from its lower-keyed
    /// side).
    fn all_elements(&self) -> Vec<Element> {
        let tds = self.triangulation.tds();
        let mut elements = Vec::with_capacity(tds.number_of_cells() * 3);
        for (cell_key, cell) in tds.cells() {
            elements.push(Element::Cell(cell_key));
            for (i, neighbor) in cell.neighbors().iter().enumerate() {
                if neighbor.is_some_and(|n| cell_key < n) {
                    #[allow(clippy::cast_possible_truncation)]
                    elements.push(Element::Facet(FacetHandle::new(cell_key, i as u8)));
                }
            }
        }
        elements
    }

    /// Re-checks every element. Returns `(queued, unrefinable_bad)`.
    fn sweep(&mut self) -> (usize, usize) {
        self.report.sweeps += 1;
        let (mut queued, mut stuck) = (0, 0);
        for element in self.all_elements() {
            match self.consider(element) {
                Some(true) => queued += 1,
                Some(false) => stuck += 1,
                None => {}
            }
        }
        tracing::debug!(
            queued,
            stuck,
            cells = self.triangulation.number_of_cells(),
            "refinement sweep"
        );
        (queued, stuck)
    }

    /// Number of bad facets and cells in the current triangulation.
    #[must_use]
    pub fn count_violations(&self) -> usize {
        self.all_elements()
            .into_iter()
            .filter(|&e| self.verdict(e).is_some_and(|v| !v.is_satisfied()))
            .count()
    }

    // =========================================================================
    // STEPPING
    // =========================================================================

    /// Performs one refinement insertion (or reaches a terminal state).
    ///
    /// # Errors
    ///
    /// Returns [`RefinementError::Insertion`] on triangulation corruption
    /// and [`RefinementError::InvariantViolation`] when sampled validation
    /// fails.
    pub fn step(&mut self) -> Result<StepOutcome, RefinementError> {
        match self.state {
            RefinementState::Converged => return Ok(StepOutcome::Converged),
            RefinementState::Aborted => return Ok(StepOutcome::Aborted),
            RefinementState::Seeded => {
                self.state = RefinementState::Refining;
                self.sweep();
            }
            RefinementState::Refining => {}
        }

        loop {
            let Some(entry) = self.queue.pop() else {
                let (queued, stuck) = self.sweep();
                if queued > 0 {
                    continue;
                }
                if stuck > 0 {
                    return Ok(self.abort(stuck));
                }
                self.state = RefinementState::Converged;
                tracing::info!(
                    steps = self.report.steps,
                    cells = self.triangulation.number_of_cells(),
                    "refinement converged"
                );
                return Ok(StepOutcome::Converged);
            };

            // Lazily drop stale or fixed entries.
            let Some(verdict) = self.verdict(entry.element) else {
                self.report.stale_entries += 1;
                continue;
            };
            if verdict.is_satisfied() {
                continue;
            }
            let Some(id) = self.element_id(entry.element) else {
                self.report.stale_entries += 1;
                continue;
            };
            if self.unrefinable.contains(&id) {
                continue;
            }

            if self.report.steps >= self.max_steps {
                let remaining = self.count_violations();
                return Ok(self.abort(remaining));
            }
            return self.refine(entry.element, id);
        }
    }

    fn abort(&mut self, remaining: usize) -> StepOutcome {
        self.state = RefinementState::Aborted;
        self.report.remaining_violations = remaining;
        tracing::warn!(
            steps = self.report.steps,
            remaining,
            "refinement aborted"
        );
        StepOutcome::Aborted
    }

    fn refine(&mut self, element: Element, id: ElementId) -> Result<StepOutcome, RefinementError> {
        match element {
            Element::Facet(facet) => {
                let Some(surface) = surface_facet(self.triangulation, self.domain, facet) else {
                    return Ok(StepOutcome::Unrefinable);
                };
                let outcome = self.insert_point(
                    surface.geometry.surface_center,
                    VertexKind::Surface(surface.labels),
                    id,
                    None,
                )?;
                if matches!(outcome, StepOutcome::Inserted { .. }) {
                    self.report.facet_insertions += 1;
                }
                Ok(outcome)
            }
            Element::Cell(cell_key) => {
                let Some(cell) = self.triangulation.tds().cell(cell_key) else {
                    return Ok(StepOutcome::Unrefinable);
                };
                let (center, label) = (cell.circumcenter(), cell.label());
                let region = match self.triangulation.conflict_region(center) {
                    Ok(region) => region,
                    Err(e) => return self.mark_unrefinable(id, center, &e),
                };
                if let Some(surface) = self.encroached_facet(center, &region) {
                    self.report.redirected_insertions += 1;
                    let facet_id = self.element_id(Element::Facet(surface.facet)).unwrap_or(id);
                    let outcome = self.insert_point(
                        surface.geometry.surface_center,
                        VertexKind::Surface(surface.labels),
                        facet_id,
                        None,
                    )?;
                    match outcome {
                        StepOutcome::Inserted { .. } => self.report.facet_insertions += 1,
                        // The cell would keep redirecting to the same facet.
                        StepOutcome::Unrefinable => {
                            self.unrefinable.insert(id);
                        }
                        StepOutcome::Converged | StepOutcome::Aborted => {}
                    }
                    return Ok(outcome);
                }
                let outcome =
                    self.insert_point(center, VertexKind::Interior(label), id, Some(region))?;
                if matches!(outcome, StepOutcome::Inserted { .. }) {
                    self.report.cell_insertions += 1;
                }
                Ok(outcome)
            }
        }
    }

    /// First surface facet of the region whose surface ball contains `point`.
    fn encroached_facet(&self, point: Point3, region: &[CellKey]) -> Option<SurfaceFacet> {
        region.iter().find_map(|&cell_key| {
            (0..4_u8).find_map(|i| {
                surface_facet(self.triangulation, self.domain, FacetHandle::new(cell_key, i))
                    .filter(|s| s.ball_contains(point))
            })
        })
    }

    fn mark_unrefinable(
        &mut self,
        id: ElementId,
        point: Point3,
        error: &InsertionError,
    ) -> Result<StepOutcome, RefinementError> {
        match error {
            InsertionError::DuplicateVertex { .. }
            | InsertionError::CavityFilling { .. }
            | InsertionError::OutsideBounds { .. }
            | InsertionError::NonFinite { .. } => {
                tracing::warn!(%point, %error, "refinement point rejected, element marked unrefinable");
                self.unrefinable.insert(id);
                self.report.unrefinable += 1;
                Ok(StepOutcome::Unrefinable)
            }
            other => Err(RefinementError::Insertion(other.clone())),
        }
    }

    fn insert_point(
        &mut self,
        point: Point3,
        kind: VertexKind,
        id: ElementId,
        region: Option<CellKeyBuffer>,
    ) -> Result<StepOutcome, RefinementError> {
        let region = match region {
            Some(region) => region,
            None => match self.triangulation.conflict_region(point) {
                Ok(region) => region,
                Err(e) => return self.mark_unrefinable(id, point, &e),
            },
        };
        let info = match self
            .triangulation
            .insert_with_conflict_region(point, kind, &region)
        {
            Ok(info) => info,
            Err(e) => return self.mark_unrefinable(id, point, &e),
        };
        self.after_insertion(&info)?;
        Ok(StepOutcome::Inserted { point, kind })
    }

    fn after_insertion(&mut self, info: &InsertionInfo) -> Result<(), RefinementError> {
        self.report.steps += 1;
        let steps = self.report.steps;

        for &cell_key in &info.new_cells {
            self.triangulation.label_cell(cell_key, self.domain);
        }
        for element in self.elements_of(&info.new_cells) {
            self.consider(element);
        }

        if let Some(n) = self.validate_every
            && n > 0
            && steps % n == 0
        {
            self.triangulation
                .validate_delaunay()
                .map_err(|e| RefinementError::InvariantViolation {
                    steps,
                    message: e.to_string(),
                })?;
        }

        if steps % PROGRESS_LOG_INTERVAL == 0 {
            tracing::debug!(
                steps,
                queue = self.queue.len(),
                vertices = self.triangulation.number_of_mesh_vertices(),
                "refinement progress"
            );
        }
        #[cfg(debug_assertions)]
        if let Some(every) = self.progress_every
            && steps % every == 0
        {
            eprintln!(
                "refinement: steps={steps} queue={} vertices={} cells={}",
                self.queue.len(),
                self.triangulation.number_of_mesh_vertices(),
                self.triangulation.number_of_cells()
            );
        }
        Ok(())
    }

    /// Steps until the engine converges or aborts.
    ///
    /// # Errors
    ///
    /// Returns [`RefinementError::Aborted`] if the budget runs out or only
    /// unrefinable violations remain, and propagates [`step`](Self::step)
    /// errors.
    pub fn run(&mut self) -> Result<RefinementReport, RefinementError> {
        loop {
            match self.step()? {
                StepOutcome::Converged => return Ok(self.report),
                StepOutcome::Aborted => {
                    return Err(RefinementAbortedError {
                        steps: self.report.steps,
                        remaining_violations: self.report.remaining_violations,
                    }
                    .into());
                }
                StepOutcome::Inserted { .. } | StepOutcome::Unrefinable => {}
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
