// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Geometry containers.
//!
//! Geometries are composite nodes. Mesh geometries additionally reference
//! their coordinate and connectivity arrays by id; those arrays are usually
//! children of the geometry but may be shared with another geometry (a
//! triangle mesh and a point cloud over the same vertex list, for example).
use crate::container::Container;
use crate::ident::NodeId;
use super::array::{checked_product, ShapeError};

/// Regular grid geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeom {
    dimensions: [usize; 3],
    num_cells: usize,
    origin: [f64; 3],
    spacing: [f64; 3],
    pub(crate) children: Container,
}

impl ImageGeom {
    /// Creates an image geometry with unit spacing at the origin.
    pub fn new(dimensions: [usize; 3]) -> Result<Self, ShapeError> {
        Self::with_frame(dimensions, [0.0; 3], [1.0; 3])
    }

    /// Creates an image geometry with an explicit origin and spacing.
    ///
    /// Fails with [`ShapeError::TooLarge`] when the cell count overflows.
    pub fn with_frame(
        dimensions: [usize; 3],
        origin: [f64; 3],
        spacing: [f64; 3],
    ) -> Result<Self, ShapeError> {
        let num_cells = checked_product(&dimensions).ok_or_else(|| ShapeError::TooLarge {
            shape: dimensions.to_vec(),
        })?;
        Ok(Self {
            dimensions,
            num_cells,
            origin,
            spacing,
            children: Container::new(),
        })
    }

    /// Cell counts along x, y, z.
    #[must_use]
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    /// World-space position of the first cell corner.
    #[must_use]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Cell size along x, y, z.
    #[must_use]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Total number of cells.
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Direct children.
    #[must_use]
    pub fn children(&self) -> &Container {
        &self.children
    }
}

/// Mesh topology of a [`MeshGeom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    /// Points only.
    Vertex,
    /// Line segments.
    Edge,
    /// Triangles.
    Triangle,
    /// Quadrilaterals.
    Quad,
}

impl MeshKind {
    /// Every mesh kind.
    pub const ALL: [Self; 4] = [Self::Vertex, Self::Edge, Self::Triangle, Self::Quad];

    /// Persisted object-type name.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Vertex => "VertexGeom",
            Self::Edge => "EdgeGeom",
            Self::Triangle => "TriangleGeom",
            Self::Quad => "QuadGeom",
        }
    }

    /// Vertices per edge (2) or per face (3, 4); `None` for point clouds.
    #[must_use]
    pub const fn vertices_per_cell(self) -> Option<usize> {
        match self {
            Self::Vertex => None,
            Self::Edge => Some(2),
            Self::Triangle => Some(3),
            Self::Quad => Some(4),
        }
    }

    /// Returns `true` when the kind has a face list.
    #[must_use]
    pub const fn has_faces(self) -> bool {
        matches!(self, Self::Triangle | Self::Quad)
    }

    /// Returns `true` when the kind has an edge list.
    #[must_use]
    pub const fn has_edges(self) -> bool {
        !matches!(self, Self::Vertex)
    }
}

/// Which id slot of a [`MeshGeom`] a reference occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshSlot {
    /// Vertex coordinate array (`N x 3` floats).
    Vertices,
    /// Edge connectivity array (`N x 2` indices).
    Edges,
    /// Face connectivity array (`N x 3` or `N x 4` indices).
    Faces,
}

/// Unstructured mesh geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshGeom {
    kind: MeshKind,
    vertices: Option<NodeId>,
    edges: Option<NodeId>,
    faces: Option<NodeId>,
    pub(crate) children: Container,
}

impl MeshGeom {
    /// Creates a mesh with no arrays attached yet.
    #[must_use]
    pub fn new(kind: MeshKind) -> Self {
        Self {
            kind,
            vertices: None,
            edges: None,
            faces: None,
            children: Container::new(),
        }
    }

    /// Mesh topology.
    #[must_use]
    pub fn kind(&self) -> MeshKind {
        self.kind
    }

    /// Id stored in `slot`, if any.
    #[must_use]
    pub fn reference(&self, slot: MeshSlot) -> Option<NodeId> {
        match slot {
            MeshSlot::Vertices => self.vertices,
            MeshSlot::Edges => self.edges,
            MeshSlot::Faces => self.faces,
        }
    }

    /// All populated references.
    pub fn references(&self) -> impl Iterator<Item = (MeshSlot, NodeId)> + '_ {
        [
            (MeshSlot::Vertices, self.vertices),
            (MeshSlot::Edges, self.edges),
            (MeshSlot::Faces, self.faces),
        ]
        .into_iter()
        .filter_map(|(slot, id)| id.map(|id| (slot, id)))
    }

    /// Sets or clears the id in `slot`.
    ///
    /// Use [`Graph::set_mesh_reference`](crate::Graph::set_mesh_reference)
    /// on a live graph so the id is checked.
    pub(crate) fn set_reference(&mut self, slot: MeshSlot, id: Option<NodeId>) {
        match slot {
            MeshSlot::Vertices => self.vertices = id,
            MeshSlot::Edges => self.edges = id,
            MeshSlot::Faces => self.faces = id,
        }
    }

    /// Clears every slot that points at `id`.
    pub(crate) fn forget(&mut self, id: NodeId) {
        for slot in [&mut self.vertices, &mut self.edges, &mut self.faces] {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }

    /// Direct children.
    #[must_use]
    pub fn children(&self) -> &Container {
        &self.children
    }
}
