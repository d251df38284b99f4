//! Point location and conflict regions.
//!
//! Point location is a remembering stochastic walk: starting from a hint
//! cell, repeatedly cross a facet that separates the current cell from the
//! query point, trying facets in a random rotation and never stepping
//! straight back. Expected cost is sublinear for well-ordered insertions.
//!
//! # References
//!
//! - O. Devillers, S. Pion, and M. Teillaud, "Walking in a Triangulation",
//!   International Journal of Foundations of Computer Science, 2001.

use rand::Rng;

use crate::core::collections::{CellKeyBuffer, FastHashSet};
use crate::core::facet::{FACET_VERTEX_INDICES, FacetHandle};
use crate::core::triangulation_data_structure::{CellKey, Tds, VertexKey};
use crate::geometry::point::Point3;
use crate::geometry::predicates::{InSphere, Orientation, insphere, simplex_orientation};

/// Safety limit for the walk before falling back to a scan.
pub const MAX_WALK_STEPS: usize = 10_000;

/// Result of a point location query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateResult {
    /// Point is strictly inside the cell
    InsideCell(CellKey),
    /// Point is on a facet of the cell
    OnFacet(CellKey, u8),
    /// Point is on an edge of the cell
    OnEdge(CellKey),
    /// Point coincides with a vertex
    OnVertex(VertexKey),
    /// Point is outside the convex hull
    Outside,
}

impl LocateResult {
    /// The cell containing the point, if it is not a vertex or outside.
    #[must_use]
    pub const fn cell(&self) -> Option<CellKey> {
        match self {
            Self::InsideCell(c) | Self::OnFacet(c, _) | Self::OnEdge(c) => Some(*c),
            Self::OnVertex(_) | Self::Outside => None,
        }
    }
}

/// Error during point location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    /// Triangulation has no cells
    #[error("Cannot locate in empty triangulation")]
    EmptyTriangulation,

    /// Cell reference is invalid
    #[error("Invalid cell reference: {cell_key:?}")]
    InvalidCell {
        /// The invalid cell key
        cell_key: CellKey,
    },

    /// The walk did not terminate (numerical issues)
    #[error("Cycle detected after {steps} steps - possible numerical degeneracy")]
    CycleDetected {
        /// Number of steps before giving up
        steps: usize,
    },
}

/// Error during conflict region search.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// Starting cell is invalid
    #[error("Invalid starting cell: {cell_key:?}")]
    InvalidStartCell {
        /// The invalid cell key
        cell_key: CellKey,
    },

    /// A cell referenced a missing vertex
    #[error("Failed to get vertices for cell {cell_key:?}")]
    VertexRetrievalFailed {
        /// The cell key that failed
        cell_key: CellKey,
    },
}

/// Classifies `point` against one cell: a facet it lies strictly beyond
/// (trying facets from `rotation`, the `back` facet last), or its position
/// inside.
enum CellTest {
    Beyond(usize),
    Inside,
    OnFacet(usize),
    OnEdge,
    OnVertex(usize),
}

fn test_cell(
    tds: &Tds,
    cell_key: CellKey,
    point: Point3,
    rotation: usize,
    back: Option<usize>,
) -> Option<CellTest> {
    let points = tds.cell_points(cell_key)?;
    let mut degenerate = [false; 4];
    let mut beyond_back = false;
    for k in 0..4 {
        let i = (rotation + k) % 4;
        let [a, b, c] = FACET_VERTEX_INDICES[i];
        match simplex_orientation(points[a], points[b], points[c], point) {
            // Same side as the outward normal.
            Orientation::POSITIVE if back == Some(i) => beyond_back = true,
            Orientation::POSITIVE => return Some(CellTest::Beyond(i)),
            Orientation::DEGENERATE => degenerate[i] = true,
            Orientation::NEGATIVE => {}
        }
    }
    if beyond_back && let Some(i) = back {
        return Some(CellTest::Beyond(i));
    }
    Some(match degenerate.iter().filter(|&&d| d).count() {
        0 => CellTest::Inside,
        1 => CellTest::OnFacet(degenerate.iter().position(|&d| d).unwrap_or(0)),
        2 => CellTest::OnEdge,
        _ => CellTest::OnVertex(degenerate.iter().position(|&d| !d).unwrap_or(0)),
    })
}

fn finish(tds: &Tds, cell_key: CellKey, test: CellTest) -> LocateResult {
    match test {
        CellTest::Inside | CellTest::Beyond(_) => LocateResult::InsideCell(cell_key),
        CellTest::OnFacet(i) => LocateResult::OnFacet(cell_key, u8::try_from(i).unwrap_or(0)),
        CellTest::OnEdge => LocateResult::OnEdge(cell_key),
        CellTest::OnVertex(i) => tds
            .cell(cell_key)
            .map_or(LocateResult::Outside, |c| LocateResult::OnVertex(c.vertices()[i])),
    }
}

/// Locates `point` with a remembering stochastic walk from `hint`.
///
/// # Errors
///
/// Returns [`LocateError::EmptyTriangulation`] if there are no cells,
/// [`LocateError::InvalidCell`] on a dangling neighbor pointer, and
/// [`LocateError::CycleDetected`] if the walk exceeds [`MAX_WALK_STEPS`].
pub fn locate<R: Rng>(
    tds: &Tds,
    point: Point3,
    hint: Option<CellKey>,
    rng: &mut R,
) -> Result<LocateResult, LocateError> {
    let start = hint
        .filter(|&k| tds.contains_cell(k))
        .or_else(|| tds.cell_keys().next())
        .ok_or(LocateError::EmptyTriangulation)?;

    let mut current = start;
    let mut previous: Option<CellKey> = None;
    for _ in 0..MAX_WALK_STEPS {
        let rotation = rng.random_range(0..4_usize);
        let cell = tds
            .cell(current)
            .ok_or(LocateError::InvalidCell { cell_key: current })?;
        let back = previous.and_then(|p| cell.neighbor_index(p));
        let test = test_cell(tds, current, point, rotation, back)
            .ok_or(LocateError::InvalidCell { cell_key: current })?;
        match test {
            CellTest::Beyond(i) => {
                let Some(next) = cell.neighbor(i) else {
                    return Ok(LocateResult::Outside);
                };
                previous = Some(current);
                current = next;
            }
            other => return Ok(finish(tds, current, other)),
        }
    }
    Err(LocateError::CycleDetected {
        steps: MAX_WALK_STEPS,
    })
}

/// Locates `point` by testing every cell. Used when the walk fails.
#[must_use]
pub fn locate_by_scan(tds: &Tds, point: Point3) -> LocateResult {
    for cell_key in tds.cell_keys() {
        if let Some(test) = test_cell(tds, cell_key, point, 0, None)
            && !matches!(test, CellTest::Beyond(_))
        {
            return finish(tds, cell_key, test);
        }
    }
    LocateResult::Outside
}

/// Collects every cell whose circumsphere strictly contains `point`,
/// by breadth-first search from `start`.
///
/// `start` must itself be in conflict; cospherical neighbors are not.
///
/// # Errors
///
/// Returns [`ConflictError`] if `start` or a visited cell is missing.
pub fn find_conflict_region(
    tds: &Tds,
    start: CellKey,
    point: Point3,
) -> Result<CellKeyBuffer, ConflictError> {
    if !tds.contains_cell(start) {
        return Err(ConflictError::InvalidStartCell { cell_key: start });
    }
    let mut region = CellKeyBuffer::new();
    let mut visited: FastHashSet<CellKey> = FastHashSet::default();
    let mut queue = std::collections::VecDeque::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(cell_key) = queue.pop_front() {
        let points = tds
            .cell_points(cell_key)
            .ok_or(ConflictError::VertexRetrievalFailed { cell_key })?;
        if cell_key != start && insphere(&points, point) != InSphere::INSIDE {
            continue;
        }
        region.push(cell_key);
        let Some(cell) = tds.cell(cell_key) else {
            continue;
        };
        for neighbor in cell.neighbors().iter().flatten() {
            if visited.insert(*neighbor) {
                queue.push_back(*neighbor);
            }
        }
    }
    Ok(region)
}

/// Facets of the conflict region whose other side is outside it (or the
/// hull), seen from the conflict cells.
#[must_use]
pub fn extract_cavity_boundary(tds: &Tds, conflict_cells: &[CellKey]) -> Vec<FacetHandle> {
    let in_region: FastHashSet<CellKey> = conflict_cells.iter().copied().collect();
    let mut boundary = Vec::new();
    for &cell_key in conflict_cells {
        let Some(cell) = tds.cell(cell_key) else {
            continue;
        };
        for (i, neighbor) in cell.neighbors().iter().enumerate() {
            if neighbor.is_none_or(|n| !in_region.contains(&n)) {
                #[allow(clippy::cast_possible_truncation)]
                boundary.push(FacetHandle::new(cell_key, i as u8));
            }
        }
    }
    boundary
}

// =============================================================================
// TESTS
// =============================================================================
