//! Facet handles.
//!
//! A facet is identified by a cell and the index of the vertex opposite to
//! it. The same triangle has two handles, one from each adjacent cell; see
//! [`Tds::mirror_facet`](crate::core::triangulation_data_structure::Tds::mirror_facet).

use crate::core::triangulation_data_structure::CellKey;

/// Vertex indices of facet `i` of a positively oriented cell, ordered so
/// that the facet's normal (right-hand rule) points out of the cell.
pub const FACET_VERTEX_INDICES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Lightweight handle to the facet of `cell` opposite vertex `index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacetHandle {
    cell_key: CellKey,
    facet_index: u8,
}

impl FacetHandle {
    /// # Panics
    ///
    /// Debug builds assert that `facet_index < 4`.
    #[inline]
    #[must_use]
    pub fn new(cell_key: CellKey, facet_index: u8) -> Self {
        debug_assert!(facet_index < 4, "facet index {facet_index} out of range");
        Self {
            cell_key,
            facet_index,
        }
    }

    #[inline]
    #[must_use]
    pub const fn cell_key(&self) -> CellKey {
        self.cell_key
    }

    #[inline]
    #[must_use]
    pub const fn facet_index(&self) -> u8 {
        self.facet_index
    }

    /// The facet index as a `usize`, for array indexing.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.facet_index as usize
    }
}
