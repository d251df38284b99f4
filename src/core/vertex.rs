//! Triangulation vertices.

use serde::{Deserialize, Serialize};

use crate::core::triangulation_data_structure::CellKey;
use crate::domain::multi_domain::SubdomainLabel;
use crate::geometry::point::Point3;

/// Role of a vertex in the mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    /// Corner of the enclosing simplex; never part of the output mesh.
    Bounding,
    /// Interior point of a sub-domain (seed or cell circumcenter).
    Interior(SubdomainLabel),
    /// Point on the interface between two labels (sorted), e.g. a facet's
    /// surface center.
    Surface([SubdomainLabel; 2]),
}

impl VertexKind {
    /// Surface kind with its labels in sorted order.
    #[must_use]
    pub fn surface(a: SubdomainLabel, b: SubdomainLabel) -> Self {
        if a <= b {
            Self::Surface([a, b])
        } else {
            Self::Surface([b, a])
        }
    }

    #[must_use]
    pub const fn is_bounding(&self) -> bool {
        matches!(self, Self::Bounding)
    }

    /// Returns `true` if Lloyd relocation may move this vertex.
    #[must_use]
    pub const fn is_relocatable(&self) -> bool {
        matches!(self, Self::Interior(label) if !label.is_outside())
    }
}

/// A vertex of the triangulation. Owned by the
/// [`Tds`](crate::core::triangulation_data_structure::Tds).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    point: Point3,
    kind: VertexKind,
    /// Some cell containing this vertex; maintained by insertion.
    pub incident_cell: Option<CellKey>,
}

impl Vertex {
    #[must_use]
    pub const fn new(point: Point3, kind: VertexKind) -> Self {
        Self {
            point,
            kind,
            incident_cell: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn point(&self) -> Point3 {
        self.point
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> VertexKind {
        self.kind
    }
}
