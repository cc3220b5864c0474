// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type-name keyed factory registry.
//!
//! Readers never switch on concrete node types: they look the stored
//! `ObjectType` up here and hand the entry to whatever factory answers. Each
//! back end owns its own registry instance, so a back end can override the
//! encoding of one type without touching the others.
use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::reader::ReadContext;
use super::writer::WriteContext;
use super::{factories, Backend, EntryRead, GroupWrite, IoError};
use crate::ident::NodeId;
use crate::node::{MeshKind, Node};

/// Reconstructs and serializes one concrete node type on back end `B`.
pub trait NodeFactory<B: Backend>: Send + Sync {
    /// Materializes `entry` as node `id` under `parent` (the root container
    /// when `None`). Composite factories recurse through
    /// [`ReadContext::read_children`]. In preflight mode the factory must
    /// not read payload bytes.
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError>;

    /// Serializes `node` as a child of `parent`. Composite factories recurse
    /// through [`WriteContext::write_children`].
    fn write(
        &self,
        ctx: &mut WriteContext<'_, B>,
        node: &Node,
        parent: &mut dyn GroupWrite,
    ) -> Result<(), IoError>;
}

/// Lookup miss in a [`FactoryRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no factory registered for type {0:?}")]
pub struct UnknownType(pub String);

/// Factories keyed by persisted type name.
pub struct FactoryRegistry<B: Backend> {
    factories: FxHashMap<String, Box<dyn NodeFactory<B>>>,
}

impl<B: Backend> FactoryRegistry<B> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Registry holding a factory for every built-in node type.
    #[must_use]
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register("DataGroup", factories::GroupFactory);
        reg.register("AttributeMatrix", factories::AttributeMatrixFactory);
        reg.register("DataArray", factories::ArrayFactory);
        reg.register("StringArray", factories::StringArrayFactory);
        reg.register("ScalarData", factories::ScalarFactory);
        reg.register("ImageGeom", factories::ImageFactory);
        for kind in MeshKind::ALL {
            reg.register(kind.type_name(), factories::MeshFactory(kind));
        }
        reg
    }

    /// Registers `factory` under `type_name`. The last registration for a
    /// name wins; returns `true` when an earlier one was replaced.
    pub fn register(&mut self, type_name: &str, factory: impl NodeFactory<B> + 'static) -> bool {
        self.factories
            .insert(type_name.to_owned(), Box::new(factory))
            .is_some()
    }

    /// Factory registered under `type_name`.
    pub fn lookup(&self, type_name: &str) -> Result<&dyn NodeFactory<B>, UnknownType> {
        self.factories
            .get(type_name)
            .map(AsRef::as_ref)
            .ok_or_else(|| UnknownType(type_name.to_owned()))
    }

    /// Returns `true` if `type_name` has a factory.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<B: Backend> Default for FactoryRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> fmt::Debug for FactoryRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("backend", &B::NAME)
            .field("types", &self.type_names())
            .finish()
    }
}
