// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Back-end independent graph writer.
//!
//! Every node is serialized at the first edge that reaches it, in container
//! order. Later edges to the same id become links to that first location,
//! so N reachable nodes and E edges yield N objects and E child records.
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use super::factory::FactoryRegistry;
use super::{attrs, display_location, AttrMap, AttrValue, Backend, GroupWrite, IoError};
use crate::graph::{Graph, GraphError};
use crate::ident::{DataPath, NodeId};
use crate::node::Node;

/// Counts from one write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Objects serialized with their own attributes and payload.
    pub payloads: usize,
    /// Parent-child edges recorded, links included.
    pub edges: usize,
}

/// In-progress write handed to factories.
pub struct WriteContext<'w, B: Backend> {
    graph: &'w Graph,
    registry: &'w FactoryRegistry<B>,
    written: FxHashMap<NodeId, DataPath>,
    summary: WriteSummary,
}

impl<'w, B: Backend> WriteContext<'w, B> {
    /// Graph being written.
    #[must_use]
    pub fn graph(&self) -> &'w Graph {
        self.graph
    }

    /// Attributes every object carries: id, type and the importable flag
    /// when cleared.
    #[must_use]
    pub fn object_attrs(&self, node: &Node) -> AttrMap {
        let mut map = AttrMap::new();
        map.insert(attrs::OBJECT_ID.into(), AttrValue::U64(node.id().value()));
        map.insert(attrs::OBJECT_TYPE.into(), AttrValue::Str(node.type_name().into()));
        if !node.is_importable() {
            map.insert(attrs::IMPORTABLE.into(), AttrValue::Bool(false));
        }
        map
    }

    /// Writes every child of `node` into `group`.
    pub fn write_children(&mut self, node: &Node, group: &mut dyn GroupWrite) -> Result<(), IoError> {
        let Some(children) = node.children() else {
            return Ok(());
        };
        for child in children {
            self.write_object(child, group)?;
        }
        Ok(())
    }

    /// Writes node `id` under `parent`, or a link when it was already
    /// written.
    pub fn write_object(&mut self, id: NodeId, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| IoError::graph(parent.path(), GraphError::NodeNotFound(id)))?;
        self.summary.edges += 1;
        if let Some(target) = self.written.get(&id) {
            parent.write_link(node.name(), target)?;
            debug!(id = id.value(), target = %display_location(target), "wrote link");
            return Ok(());
        }
        let location = parent
            .path()
            .child(node.name())
            .map_err(|e| IoError::graph(parent.path(), e.into()))?;
        let registry = self.registry;
        let factory = registry.lookup(node.type_name()).map_err(|e| IoError::UnknownType {
            type_name: e.0,
            location: display_location(&location),
        })?;
        debug!(id = id.value(), location = %display_location(&location), "writing object");
        self.written.insert(id, location);
        self.summary.payloads += 1;
        factory.write(self, node, parent)
    }
}

/// Writes `graph` into `root`. The caller finishes `root` afterwards.
pub fn write_graph<B: Backend>(
    graph: &Graph,
    registry: &FactoryRegistry<B>,
    root: &mut dyn GroupWrite,
) -> Result<WriteSummary, IoError> {
    root.set_attr(attrs::NEXT_OBJECT_ID, AttrValue::U64(graph.next_id().value()));
    let mut ctx = WriteContext {
        graph,
        registry,
        written: FxHashMap::default(),
        summary: WriteSummary::default(),
    };
    for id in graph.root() {
        ctx.write_object(id, root)?;
    }
    info!(
        backend = B::NAME,
        payloads = ctx.summary.payloads,
        edges = ctx.summary.edges,
        "graph written"
    );
    Ok(ctx.summary)
}
