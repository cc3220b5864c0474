// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph node records and concrete node types.
use std::collections::BTreeSet;

use crate::container::Container;
use crate::ident::NodeId;

mod array;
mod geometry;
mod group;

pub use array::{
    checked_product, element_count, ArrayValues, DataArray, DataType, Element, ScalarData,
    ShapeError, StringArray, UnknownDataType,
};
pub use geometry::{ImageGeom, MeshGeom, MeshKind, MeshSlot};
pub use group::{AttributeMatrix, DataGroup};

/// Concrete payload of a [`Node`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Plain composite.
    Group(DataGroup),
    /// Tuple-constrained composite.
    AttributeMatrix(AttributeMatrix),
    /// Typed numeric array.
    Array(DataArray),
    /// Array of strings.
    Strings(StringArray),
    /// Single typed value.
    Scalar(ScalarData),
    /// Regular grid geometry.
    Image(ImageGeom),
    /// Unstructured mesh geometry.
    Mesh(MeshGeom),
}

impl NodeKind {
    /// Type tag used for serialization dispatch.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Group(_) => "DataGroup",
            Self::AttributeMatrix(_) => "AttributeMatrix",
            Self::Array(_) => "DataArray",
            Self::Strings(_) => "StringArray",
            Self::Scalar(_) => "ScalarData",
            Self::Image(_) => "ImageGeom",
            Self::Mesh(m) => m.kind().type_name(),
        }
    }

    /// Nested container for composite kinds.
    #[must_use]
    pub fn children(&self) -> Option<&Container> {
        match self {
            Self::Group(g) => Some(&g.children),
            Self::AttributeMatrix(m) => Some(&m.children),
            Self::Image(g) => Some(&g.children),
            Self::Mesh(g) => Some(&g.children),
            Self::Array(_) | Self::Strings(_) | Self::Scalar(_) => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Container> {
        match self {
            Self::Group(g) => Some(&mut g.children),
            Self::AttributeMatrix(m) => Some(&mut m.children),
            Self::Image(g) => Some(&mut g.children),
            Self::Mesh(g) => Some(&mut g.children),
            Self::Array(_) | Self::Strings(_) | Self::Scalar(_) => None,
        }
    }

    /// Returns `true` for kinds that own a nested container.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.children().is_some()
    }

    /// Tuple count for array-like kinds.
    #[must_use]
    pub fn num_tuples(&self) -> Option<usize> {
        match self {
            Self::Array(a) => Some(a.num_tuples()),
            Self::Strings(s) => Some(s.num_tuples()),
            _ => None,
        }
    }

    /// Returns a copy with an empty container, for subtree copies that
    /// rebuild child edges themselves.
    pub(crate) fn detached_clone(&self) -> Self {
        let mut copy = self.clone();
        if let Some(children) = copy.children_mut() {
            *children = Container::new();
        }
        copy
    }
}

/// One addressable element of the graph.
///
/// The node's name is unique among the children of every parent that holds
/// it. The parent set always includes every container that lists the node;
/// [`NodeId::ROOT`] stands for the graph's root container.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    name: String,
    pub(crate) parents: BTreeSet<NodeId>,
    pub(crate) importable: bool,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String, kind: NodeKind) -> Self {
        Self {
            id,
            name,
            parents: BTreeSet::new(),
            importable: true,
            kind,
        }
    }

    /// Graph-unique id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Sibling-unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Ids of every container holding this node ([`NodeId::ROOT`] for the root).
    pub fn parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.parents.iter().copied()
    }

    /// Number of parent edges.
    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    /// Whether a reader should materialize this node on reload.
    #[must_use]
    pub fn is_importable(&self) -> bool {
        self.importable
    }

    /// Concrete payload.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Serialization type tag.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Nested container for composite nodes.
    #[must_use]
    pub fn children(&self) -> Option<&Container> {
        self.kind.children()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Concrete node type that can be stored in, and borrowed back out of, a
/// [`NodeKind`].
///
/// Sealed: implemented for the seven node payload types only.
pub trait NodeVariant: sealed::Sealed + Sized {
    /// Human-readable type name used in mismatch errors.
    const TYPE_NAME: &'static str;

    /// Borrows `Self` out of `kind` when the variant matches.
    fn from_kind(kind: &NodeKind) -> Option<&Self>;
    /// Mutably borrows `Self` out of `kind` when the variant matches.
    fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self>;
    /// Wraps `self` as a [`NodeKind`].
    fn into_kind(self) -> NodeKind;
}

macro_rules! node_variant {
    ($t:ty, $variant:ident, $name:literal) => {
        impl sealed::Sealed for $t {}

        impl NodeVariant for $t {
            const TYPE_NAME: &'static str = $name;

            fn from_kind(kind: &NodeKind) -> Option<&Self> {
                match kind {
                    NodeKind::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_kind_mut(kind: &mut NodeKind) -> Option<&mut Self> {
                match kind {
                    NodeKind::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_kind(self) -> NodeKind {
                NodeKind::$variant(self)
            }
        }

        impl From<$t> for NodeKind {
            fn from(value: $t) -> Self {
                NodeKind::$variant(value)
            }
        }
    };
}

node_variant!(DataGroup, Group, "DataGroup");
node_variant!(AttributeMatrix, AttributeMatrix, "AttributeMatrix");
node_variant!(DataArray, Array, "DataArray");
node_variant!(StringArray, Strings, "StringArray");
node_variant!(ScalarData, Scalar, "ScalarData");
node_variant!(ImageGeom, Image, "ImageGeom");
node_variant!(MeshGeom, Mesh, "MeshGeom");
