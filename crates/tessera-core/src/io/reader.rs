// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Back-end independent graph reader.
//!
//! Walks a persisted hierarchy from its root group. Each entry's
//! `ObjectId` is checked against the graph built so far: an id already
//! materialized (reached again through a link) only gains another parent,
//! anything else is handed to the factory registered for its `ObjectType`.
//! The first error aborts the read.
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use super::factory::FactoryRegistry;
use super::{attrs, display_location, AttrValue, Backend, EntryRead, IoError};
use crate::config::CoreConfig;
use crate::graph::{Graph, GraphError};
use crate::ident::{DataPath, NodeId};
use crate::node::{MeshGeom, NodeKind};

/// Read-time switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Rebuild structure and shapes only; never touch payload bytes.
    pub preflight: bool,
    /// Check payload digests on full reads.
    pub verify_digests: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            preflight: false,
            verify_digests: true,
        }
    }
}

impl ReadOptions {
    /// Structure-only read.
    #[must_use]
    pub fn preflight() -> Self {
        Self {
            preflight: true,
            ..Self::default()
        }
    }

    /// Full read honouring `config.verify_payload_digests`.
    #[must_use]
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            preflight: false,
            verify_digests: config.verify_payload_digests,
        }
    }
}

/// In-progress read handed to factories.
pub struct ReadContext<'r, B: Backend> {
    graph: Graph,
    registry: &'r FactoryRegistry<B>,
    options: ReadOptions,
    skipped: FxHashSet<NodeId>,
}

impl<'r, B: Backend> ReadContext<'r, B> {
    fn new(registry: &'r FactoryRegistry<B>, options: ReadOptions) -> Self {
        Self {
            graph: Graph::new(),
            registry,
            options,
            skipped: FxHashSet::default(),
        }
    }

    /// `true` when payload bytes must not be read.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        self.options.preflight
    }

    /// Graph materialized so far.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Adds the node `entry` describes under `parent`.
    pub fn insert(
        &mut self,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
        kind: NodeKind,
    ) -> Result<(), IoError> {
        self.graph
            .insert_with_id(id, parent, entry.name(), kind)
            .map_err(|e| IoError::graph(entry.path(), e))?;
        debug!(id = id.value(), location = %display_location(entry.path()), "materialized");
        Ok(())
    }

    /// Reads every child of `entry` into `parent`.
    pub fn read_children(&mut self, entry: &dyn EntryRead, parent: Option<NodeId>) -> Result<(), IoError> {
        for child in entry.children()? {
            self.read_entry(child.as_ref(), parent)?;
        }
        Ok(())
    }

    fn read_entry(&mut self, entry: &dyn EntryRead, parent: Option<NodeId>) -> Result<(), IoError> {
        if matches!(entry.attr(attrs::IMPORTABLE), Some(AttrValue::Bool(false))) {
            if let Ok(Some(id)) = entry.attr_opt_u64(attrs::OBJECT_ID) {
                self.skipped.insert(NodeId(id));
            }
            warn!(location = %display_location(entry.path()), "skipping non-importable entry");
            return Ok(());
        }
        if entry.attr(attrs::OBJECT_ID).is_none() {
            return Err(IoError::MissingObjectId {
                location: display_location(entry.path()),
            });
        }
        let id = NodeId(entry.attr_u64(attrs::OBJECT_ID)?);
        if entry.attr(attrs::OBJECT_TYPE).is_none() {
            return Err(IoError::MissingObjectType {
                location: display_location(entry.path()),
            });
        }
        let type_name = entry.attr_str(attrs::OBJECT_TYPE)?;

        if self.skipped.contains(&id) {
            return Ok(());
        }
        if let Some(existing) = self.graph.node(id) {
            if existing.type_name() != type_name {
                return Err(IoError::attr(
                    entry.path(),
                    attrs::OBJECT_TYPE,
                    format!("id {id} was already read as {}", existing.type_name()),
                ));
            }
            self.graph
                .set_additional_parent(id, parent)
                .map_err(|e| IoError::graph(entry.path(), e))?;
            debug!(id = id.value(), location = %display_location(entry.path()), "linked shared node");
            return Ok(());
        }

        let registry = self.registry;
        let factory = registry.lookup(type_name).map_err(|e| IoError::UnknownType {
            type_name: e.0,
            location: display_location(entry.path()),
        })?;
        factory.read(self, entry, parent, id)
    }

    /// Clears mesh references to entries skipped as non-importable.
    fn drop_skipped_references(&mut self) {
        if self.skipped.is_empty() {
            return;
        }
        let mut stale = Vec::new();
        for node in self.graph.nodes() {
            if let NodeKind::Mesh(mesh) = node.kind() {
                for (slot, target) in mesh.references() {
                    if self.skipped.contains(&target) {
                        stale.push((node.id(), slot));
                    }
                }
            }
        }
        for (id, slot) in stale {
            if let Some(mesh) = self.graph.get_as_mut::<MeshGeom>(id) {
                mesh.set_reference(slot, None);
            }
        }
    }
}

/// Reads the hierarchy under `root` into a fresh graph.
pub fn read_graph<B: Backend>(
    root: &dyn EntryRead,
    registry: &FactoryRegistry<B>,
    options: ReadOptions,
) -> Result<Graph, IoError> {
    let next = match root.attr(attrs::NEXT_OBJECT_ID) {
        None => return Err(IoError::MissingIdAllocator),
        Some(AttrValue::U64(n)) => *n,
        Some(other) => {
            return Err(IoError::InvalidIdAllocator(format!(
                "expected u64, found {}",
                other.kind()
            )))
        }
    };

    let mut ctx = ReadContext::new(registry, options);
    ctx.read_children(root, None)?;
    ctx.drop_skipped_references();
    let mut graph = ctx.graph;

    graph
        .set_next_id(NodeId(next))
        .map_err(|e| IoError::InvalidIdAllocator(e.to_string()))?;
    graph.check_integrity().map_err(|e| match e {
        GraphError::DanglingReference { mesh, target } => IoError::DanglingReference { mesh, target },
        other => IoError::graph(&DataPath::root(), other),
    })?;
    info!(
        backend = B::NAME,
        nodes = graph.len(),
        preflight = options.preflight,
        "graph read"
    );
    Ok(graph)
}
