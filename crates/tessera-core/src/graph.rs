// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! ID-addressed object graph.
//!
//! [`Graph`] owns every [`Node`] in a flat id index and a root [`Container`].
//! Parent/child relationships are stored twice: each composite's container
//! lists its children and each node records its parents. Both sides are
//! updated together by every structural operation, so no edge ever points at
//! a missing node.
use std::collections::{BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::container::Container;
use crate::diagnostic::{codes, Diagnostic, Diagnostics};
use crate::ident::{validate_name, DataPath, NodeId, PathError};
use crate::node::{AttributeMatrix, MeshGeom, MeshSlot, Node, NodeKind, NodeVariant};

/// Error returned by strict graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// No node has this id.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    /// The requested parent does not exist.
    #[error("parent {0} not found")]
    ParentNotFound(NodeId),
    /// The requested parent cannot hold children.
    #[error("node {0} is not a container")]
    NotAContainer(NodeId),
    /// A sibling already uses this name.
    #[error("name {name:?} already exists in container {parent}")]
    DuplicateName {
        /// Container holding the clash ([`NodeId::ROOT`] for the root).
        parent: NodeId,
        /// Conflicting name.
        name: String,
    },
    /// A node with this id already exists.
    #[error("node id {0} is already in use")]
    DuplicateId(NodeId),
    /// Id zero is reserved for the root container.
    #[error("node id {0} is reserved")]
    ReservedId(NodeId),
    /// The node exists but holds a different concrete type.
    #[error("node {id} is a {found}, expected {expected}")]
    TypeMismatch {
        /// Node id.
        id: NodeId,
        /// Requested type.
        expected: &'static str,
        /// Actual type.
        found: &'static str,
    },
    /// The parent lies inside the node's own subtree.
    #[error("making {parent} a parent of {node} would create a cycle")]
    WouldCreateCycle {
        /// Child node.
        node: NodeId,
        /// Proposed parent.
        parent: NodeId,
    },
    /// The node is not a child of the container.
    #[error("node {node} is not a child of {parent}")]
    NotAChild {
        /// Node id.
        node: NodeId,
        /// Container that does not list it ([`NodeId::ROOT`] for the root).
        parent: NodeId,
    },
    /// The node is already a child of the parent.
    #[error("node {node} is already a child of {parent}")]
    AlreadyChild {
        /// Child node.
        node: NodeId,
        /// Existing parent.
        parent: NodeId,
    },
    /// An array does not match its attribute matrix's tuple count.
    #[error("node {node} has {actual} tuples but matrix {matrix} requires {expected}")]
    TupleMismatch {
        /// Array node (or [`NodeId::ROOT`] for a node not yet created).
        node: NodeId,
        /// Attribute matrix.
        matrix: NodeId,
        /// Tuples required by the matrix.
        expected: usize,
        /// Tuples held by the array.
        actual: usize,
    },
    /// A mesh slot references something other than a live array.
    #[error("mesh {mesh} references {target}, which is not a live array")]
    DanglingReference {
        /// Mesh geometry.
        mesh: NodeId,
        /// Referenced id.
        target: NodeId,
    },
    /// A mesh being created references something other than a live array.
    #[error("new mesh references {target} in its {slot:?} slot, which is not a live array")]
    UnresolvedReference {
        /// Slot holding the reference.
        slot: MeshSlot,
        /// Referenced id.
        target: NodeId,
    },
    /// The allocator would hand out an id that is already in use.
    #[error("next object id {next} does not exceed existing id {id}")]
    IdBeyondAllocator {
        /// Highest id present.
        id: NodeId,
        /// Proposed allocator value.
        next: NodeId,
    },
    /// A path does not resolve.
    #[error("path {0:?} not found")]
    PathNotFound(String),
    /// A name is invalid.
    #[error(transparent)]
    InvalidName(#[from] PathError),
}

impl GraphError {
    /// Diagnostic code for this failure.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::NodeNotFound(_) | Self::PathNotFound(_) => codes::PATH_NOT_FOUND,
            Self::ParentNotFound(_) => codes::PARENT_NOT_FOUND,
            Self::NotAContainer(_) | Self::WouldCreateCycle { .. } => codes::NOT_A_CONTAINER,
            Self::DuplicateName { .. } | Self::AlreadyChild { .. } => codes::PATH_EXISTS,
            Self::TypeMismatch { .. } => codes::TYPE_MISMATCH,
            Self::TupleMismatch { .. } => codes::TUPLE_MISMATCH,
            Self::InvalidName(_) => codes::INVALID_NAME,
            Self::NotAChild { .. } => codes::NOT_A_CHILD,
            Self::DuplicateId(_)
            | Self::ReservedId(_)
            | Self::DanglingReference { .. }
            | Self::UnresolvedReference { .. }
            | Self::IdBeyondAllocator { .. } => codes::MUTATION_FAILED,
        }
    }
}

impl From<GraphError> for Diagnostic {
    fn from(err: GraphError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Maps an optional parent onto the key stored in a node's parent set.
fn parent_key(parent: Option<NodeId>) -> NodeId {
    parent.unwrap_or(NodeId::ROOT)
}

/// Inverse of [`parent_key`].
fn parent_slot(key: NodeId) -> Option<NodeId> {
    (key != NodeId::ROOT).then_some(key)
}

/// The object graph.
///
/// Cloning a graph (see [`Graph::deep_copy`]) copies every node and every
/// payload buffer; the copy shares no storage with the original.
#[derive(Debug, Clone)]
pub struct Graph {
    root: Container,
    nodes: FxHashMap<NodeId, Node>,
    next_id: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph whose allocator starts at [`NodeId::FIRST`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Container::new(),
            nodes: FxHashMap::default(),
            next_id: NodeId::FIRST.value(),
        }
    }

    /// Id the allocator hands out next.
    #[must_use]
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next_id)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the graph holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level container.
    #[must_use]
    pub fn root(&self) -> &Container {
        &self.root
    }

    /// Returns `true` if `id` names a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Every live id in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Creates a node under `parent` (the root container when `None`).
    ///
    /// The id is consumed only when the insert succeeds. Any children carried
    /// by a composite `value` are discarded; structure is built through the
    /// graph.
    pub fn create<T: NodeVariant>(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        value: T,
    ) -> Result<NodeId, GraphError> {
        validate_name(name)?;
        let mut kind = value.into_kind();
        if let Some(children) = kind.children_mut() {
            *children = Container::new();
        }
        if let NodeKind::Mesh(mesh) = &kind {
            for (slot, target) in mesh.references() {
                if self.get_as::<crate::node::DataArray>(target).is_none() {
                    return Err(GraphError::UnresolvedReference { slot, target });
                }
            }
        }
        self.check_insert(parent, name, &kind, None)?;
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes
            .insert(id, Node::new(id, name.to_owned(), kind));
        self.link(id, parent);
        debug!(id = id.value(), node_name = name, "created node");
        Ok(id)
    }

    /// Inserts a node under a caller-chosen id. Used by readers to
    /// materialize persisted nodes; bumps the allocator past `id`.
    ///
    /// Mesh references are not checked here since the referenced arrays may
    /// not be read yet; call [`Graph::check_integrity`] afterwards.
    pub(crate) fn insert_with_id(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        name: &str,
        mut kind: NodeKind,
    ) -> Result<(), GraphError> {
        if id == NodeId::ROOT {
            return Err(GraphError::ReservedId(id));
        }
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateId(id));
        }
        validate_name(name)?;
        if let Some(children) = kind.children_mut() {
            *children = Container::new();
        }
        self.check_insert(parent, name, &kind, None)?;
        self.nodes
            .insert(id, Node::new(id, name.to_owned(), kind));
        self.link(id, parent);
        self.next_id = self.next_id.max(id.value() + 1);
        Ok(())
    }

    /// Sets the allocator, refusing values at or below an id in use.
    pub(crate) fn set_next_id(&mut self, next: NodeId) -> Result<(), GraphError> {
        if next == NodeId::ROOT {
            return Err(GraphError::ReservedId(next));
        }
        if let Some(max) = self.nodes.keys().copied().max() {
            if max >= next {
                return Err(GraphError::IdBeyondAllocator { id: max, next });
            }
        }
        self.next_id = next.value();
        Ok(())
    }

    /// Node record for `id`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Borrows the node as `T`; `None` on a missing id or a type mismatch.
    #[must_use]
    pub fn get_as<T: NodeVariant>(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(&id).and_then(|n| T::from_kind(&n.kind))
    }

    /// Mutable counterpart of [`Graph::get_as`].
    ///
    /// Only concrete payload types are reachable, so edges and children stay
    /// under the graph's control:
    ///
    /// ```compile_fail
    /// use tessera_core::{Graph, NodeId, NodeKind};
    ///
    /// let mut graph = Graph::new();
    /// let _ = graph.get_as_mut::<NodeKind>(NodeId::ROOT);
    /// ```
    pub fn get_as_mut<T: NodeVariant>(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes
            .get_mut(&id)
            .and_then(|n| T::from_kind_mut(&mut n.kind))
    }

    /// Borrows the node as `T`, reporting why it could not.
    ///
    /// For callers that have already established existence (after preflight
    /// validated a path); a failure here indicates a defect upstream.
    pub fn get_ref_as<T: NodeVariant>(&self, id: NodeId) -> Result<&T, GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        T::from_kind(&node.kind).ok_or(GraphError::TypeMismatch {
            id,
            expected: T::TYPE_NAME,
            found: node.type_name(),
        })
    }

    /// Mutable counterpart of [`Graph::get_ref_as`].
    pub fn get_ref_as_mut<T: NodeVariant>(&mut self, id: NodeId) -> Result<&mut T, GraphError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::NodeNotFound(id))?;
        let found = node.type_name();
        T::from_kind_mut(&mut node.kind).ok_or(GraphError::TypeMismatch {
            id,
            expected: T::TYPE_NAME,
            found,
        })
    }

    /// Children of `parent` (the root container when `None`).
    pub fn children_of(&self, parent: Option<NodeId>) -> Result<&Container, GraphError> {
        match parent {
            None => Ok(&self.root),
            Some(p) => {
                let node = self.nodes.get(&p).ok_or(GraphError::ParentNotFound(p))?;
                node.children().ok_or(GraphError::NotAContainer(p))
            }
        }
    }

    fn children_of_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Container> {
        match parent {
            None => Some(&mut self.root),
            Some(p) => self.nodes.get_mut(&p).and_then(|n| n.kind.children_mut()),
        }
    }

    /// Child of `parent` called `name`.
    #[must_use]
    pub fn child_by_name(&self, parent: Option<NodeId>, name: &str) -> Option<NodeId> {
        let children = self.children_of(parent).ok()?;
        children
            .iter()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.name() == name))
    }

    /// Resolves a path to a node id. The root path resolves to nothing
    /// since the root container is not a node.
    #[must_use]
    pub fn find(&self, path: &DataPath) -> Option<NodeId> {
        let mut current = None;
        for part in path.parts() {
            current = Some(self.child_by_name(current, part)?);
        }
        current
    }

    /// Strict counterpart of [`Graph::find`].
    pub fn resolve(&self, path: &DataPath) -> Result<NodeId, GraphError> {
        self.find(path)
            .ok_or_else(|| GraphError::PathNotFound(path.to_string()))
    }

    /// Resolves a path naming a container: `Ok(None)` for the root,
    /// `Ok(Some(id))` for a composite node.
    pub fn resolve_container(&self, path: &DataPath) -> Result<Option<NodeId>, GraphError> {
        if path.is_root() {
            return Ok(None);
        }
        let id = self.resolve(path)?;
        self.children_of(Some(id))?;
        Ok(Some(id))
    }

    /// Every path that reaches `id`, sorted. Empty for a missing id.
    #[must_use]
    pub fn paths_of(&self, id: NodeId) -> Vec<DataPath> {
        let mut out: Vec<DataPath> = self
            .raw_paths(id)
            .into_iter()
            .filter_map(|parts| DataPath::from_parts(parts).ok())
            .collect();
        out.sort();
        out
    }

    /// First path (in sort order) reaching `id`.
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> Option<DataPath> {
        self.paths_of(id).into_iter().next()
    }

    fn raw_paths(&self, id: NodeId) -> Vec<Vec<String>> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for parent in node.parents() {
            if parent == NodeId::ROOT {
                out.push(vec![node.name().to_owned()]);
            } else {
                for mut prefix in self.raw_paths(parent) {
                    prefix.push(node.name().to_owned());
                    out.push(prefix);
                }
            }
        }
        out
    }

    /// Validates that `kind` may be inserted into `parent` under `name`.
    /// `existing` excludes a node from the sibling-name check.
    fn check_insert(
        &self,
        parent: Option<NodeId>,
        name: &str,
        kind: &NodeKind,
        existing: Option<NodeId>,
    ) -> Result<(), GraphError> {
        let children = self.children_of(parent)?;
        let clash = children.iter().any(|c| {
            Some(c) != existing && self.nodes.get(&c).is_some_and(|n| n.name() == name)
        });
        if clash {
            return Err(GraphError::DuplicateName {
                parent: parent_key(parent),
                name: name.to_owned(),
            });
        }
        if let Some(matrix_id) = parent {
            if let Some(matrix) = self.get_as::<AttributeMatrix>(matrix_id) {
                if let Some(actual) = kind.num_tuples() {
                    if actual != matrix.num_tuples() {
                        return Err(GraphError::TupleMismatch {
                            node: existing.unwrap_or(NodeId::ROOT),
                            matrix: matrix_id,
                            expected: matrix.num_tuples(),
                            actual,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Records the edge `parent -> id` on both sides.
    fn link(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(children) = self.children_of_mut(parent) {
            children.insert(id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parents.insert(parent_key(parent));
        }
    }

    /// Removes the edge `parent -> id` on both sides.
    fn unlink_edge(&mut self, id: NodeId, parent: Option<NodeId>) -> bool {
        let removed = self
            .children_of_mut(parent)
            .is_some_and(|children| children.remove(id));
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parents.remove(&parent_key(parent));
        }
        removed
    }

    /// Returns `true` when `candidate` is `id` or lies beneath it.
    fn is_in_subtree(&self, id: NodeId, candidate: NodeId) -> bool {
        let mut stack = vec![id];
        let mut seen = FxHashSet::default();
        while let Some(current) = stack.pop() {
            if current == candidate {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(children) = self.nodes.get(&current).and_then(Node::children) {
                stack.extend(children.iter());
            }
        }
        false
    }

    /// Registers an existing node as a child of another container as well.
    ///
    /// The node keeps its id and storage; after this call it is reachable
    /// from both parents and survives the removal of either one.
    pub fn set_additional_parent(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(), GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        let children = self.children_of(parent)?;
        if children.contains(id) {
            return Err(GraphError::AlreadyChild {
                node: id,
                parent: parent_key(parent),
            });
        }
        if let Some(p) = parent {
            if self.is_in_subtree(id, p) {
                return Err(GraphError::WouldCreateCycle { node: id, parent: p });
            }
        }
        self.check_insert(parent, node.name(), node.kind(), Some(id))?;
        self.link(id, parent);
        debug!(id = id.value(), parent = parent_key(parent).value(), "added parent");
        Ok(())
    }

    /// Removes one parent edge. The node is destroyed (with any descendants
    /// no longer owned elsewhere) once its last parent is gone.
    pub fn remove_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound(id));
        }
        if !self.unlink_edge(id, parent) {
            return Err(GraphError::NotAChild {
                node: id,
                parent: parent_key(parent),
            });
        }
        self.destroy_unowned(id);
        Ok(())
    }

    /// Detaches `id` from every parent and destroys it together with every
    /// descendant that is no longer owned by a surviving container.
    ///
    /// Returns whether the id existed. Mesh references to destroyed arrays
    /// are cleared.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let parents: Vec<NodeId> = node.parents().collect();
        for parent in parents {
            self.unlink_edge(id, parent_slot(parent));
        }
        let destroyed = self.destroy_unowned(id);
        debug!(id = id.value(), destroyed, "removed node");
        true
    }

    /// Destroys `start` and its descendants that have no remaining parent.
    fn destroy_unowned(&mut self, start: NodeId) -> usize {
        let mut queue = VecDeque::from([start]);
        let mut destroyed = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            let owned = self
                .nodes
                .get(&current)
                .is_none_or(|n| n.parent_count() > 0);
            if owned {
                continue;
            }
            let Some(node) = self.nodes.remove(&current) else {
                continue;
            };
            if let Some(children) = node.children() {
                for child in children {
                    if let Some(c) = self.nodes.get_mut(&child) {
                        c.parents.remove(&current);
                    }
                    queue.push_back(child);
                }
            }
            destroyed.insert(current);
        }
        if !destroyed.is_empty() {
            for node in self.nodes.values_mut() {
                if let NodeKind::Mesh(mesh) = &mut node.kind {
                    for gone in &destroyed {
                        mesh.forget(*gone);
                    }
                }
            }
        }
        destroyed.len()
    }

    /// Renames a node. The new name must be free in every parent.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<(), GraphError> {
        validate_name(new_name)?;
        let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        if node.name() == new_name {
            return Ok(());
        }
        for parent in node.parents() {
            let children = self.children_of(parent_slot(parent))?;
            let clash = children
                .iter()
                .any(|c| c != id && self.nodes.get(&c).is_some_and(|n| n.name() == new_name));
            if clash {
                return Err(GraphError::DuplicateName {
                    parent,
                    name: new_name.to_owned(),
                });
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.set_name(new_name.to_owned());
        }
        Ok(())
    }

    /// Marks whether readers should materialize the node on reload.
    pub fn set_importable(&mut self, id: NodeId, importable: bool) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        node.importable = importable;
        Ok(())
    }

    /// Points a mesh slot at an array node (or clears it).
    pub fn set_mesh_reference(
        &mut self,
        mesh: NodeId,
        slot: MeshSlot,
        target: Option<NodeId>,
    ) -> Result<(), GraphError> {
        if let Some(t) = target {
            if self.get_as::<crate::node::DataArray>(t).is_none() {
                return Err(GraphError::DanglingReference { mesh, target: t });
            }
        }
        self.get_ref_as_mut::<MeshGeom>(mesh)?
            .set_reference(slot, target);
        Ok(())
    }

    /// Structurally identical graph with independent storage.
    ///
    /// Ids, names, edges and the allocator value are preserved; every
    /// payload buffer is copied.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Copies the subtree rooted at `source` into `dest` under `name`.
    ///
    /// Every copied node gets a fresh id. Sharing inside the subtree is
    /// preserved in the copy; mesh references into the subtree are remapped
    /// and references to nodes outside it are kept as they are.
    pub fn copy_subtree(
        &mut self,
        source: NodeId,
        dest: Option<NodeId>,
        name: &str,
    ) -> Result<NodeId, GraphError> {
        validate_name(name)?;
        let src = self
            .nodes
            .get(&source)
            .ok_or(GraphError::NodeNotFound(source))?;
        self.check_insert(dest, name, src.kind(), None)?;

        let mut order = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![source];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(children) = self.nodes.get(&current).and_then(Node::children) {
                let mut kids: Vec<NodeId> = children.iter().collect();
                kids.reverse();
                stack.extend(kids);
            }
        }

        let mut remap = FxHashMap::default();
        for old in &order {
            remap.insert(*old, NodeId(self.next_id));
            self.next_id += 1;
        }

        let mut copies = Vec::with_capacity(order.len());
        for old in &order {
            let Some(node) = self.nodes.get(old) else {
                continue;
            };
            let mut kind = node.kind().detached_clone();
            if let NodeKind::Mesh(mesh) = &mut kind {
                let refs: Vec<(MeshSlot, NodeId)> = mesh.references().collect();
                for (slot, target) in refs {
                    if let Some(mapped) = remap.get(&target) {
                        mesh.set_reference(slot, Some(*mapped));
                    }
                }
            }
            let new_name = if *old == source { name } else { node.name() };
            let mut copy = Node::new(remap[old], new_name.to_owned(), kind);
            copy.importable = node.importable;
            let children: Vec<NodeId> = node
                .children()
                .map(|c| c.iter().collect())
                .unwrap_or_default();
            copies.push((copy, children));
        }

        let new_root = remap[&source];
        for (copy, _) in &copies {
            self.nodes.insert(copy.id(), copy.clone());
        }
        for (copy, children) in copies {
            for child in children {
                self.link(remap[&child], Some(copy.id()));
            }
        }
        self.link(new_root, dest);
        debug!(
            source = source.value(),
            copy = new_root.value(),
            nodes = order.len(),
            "copied subtree"
        );
        Ok(new_root)
    }

    /// Checks that every array at `paths` exists and that all agree on tuple
    /// count.
    ///
    /// Every unresolved path produces its own diagnostic. A disagreement is
    /// reported as one diagnostic listing every path with its count. Returns
    /// the common tuple count (0 for an empty list).
    pub fn validate_number_of_tuples(&self, paths: &[DataPath]) -> Result<usize, Diagnostics> {
        let mut errors = Vec::new();
        let mut counts = Vec::with_capacity(paths.len());
        for path in paths {
            match self.find(path) {
                None => errors.push(Diagnostic::new(
                    codes::PATH_NOT_FOUND,
                    format!("array {path} does not exist"),
                )),
                Some(id) => match self.nodes.get(&id).and_then(|n| n.kind.num_tuples()) {
                    Some(n) => counts.push((path, n)),
                    None => errors.push(Diagnostic::new(
                        codes::NOT_AN_ARRAY,
                        format!("{path} is not an array"),
                    )),
                },
            }
        }
        let first = counts.first().map(|(_, n)| *n);
        if let Some(expected) = first {
            if counts.iter().any(|(_, n)| *n != expected) {
                let listing = counts
                    .iter()
                    .map(|(p, n)| format!("{p}={n}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                errors.push(Diagnostic::new(
                    codes::TUPLE_MISMATCH,
                    format!("arrays disagree on number of tuples: {listing}"),
                ));
            }
        }
        if errors.is_empty() {
            Ok(first.unwrap_or(0))
        } else {
            Err(errors)
        }
    }

    /// Depth-first pre-order walk over every reachable edge, root first.
    ///
    /// `visit(parent, id, depth)` is called once per edge, so a shared node is
    /// visited once per parent. Returning `false` skips the node's children.
    pub fn walk(&self, mut visit: impl FnMut(Option<NodeId>, &Node, usize) -> bool) {
        let mut stack: Vec<(Option<NodeId>, NodeId, usize)> = self
            .root
            .iter()
            .rev()
            .map(|id| (None, id, 0))
            .collect();
        while let Some((parent, id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if visit(parent, node, depth) {
                if let Some(children) = node.children() {
                    let kids: Vec<NodeId> = children.iter().collect();
                    stack.extend(kids.into_iter().rev().map(|c| (Some(id), c, depth + 1)));
                }
            }
        }
    }

    /// Verifies edge symmetry, reachability, allocator headroom and mesh
    /// references. Intended for readers and tests.
    pub fn check_integrity(&self) -> Result<(), GraphError> {
        for (id, node) in &self.nodes {
            if node.parent_count() == 0 {
                return Err(GraphError::ParentNotFound(*id));
            }
            for parent in node.parents() {
                let children = self.children_of(parent_slot(parent))?;
                if !children.contains(*id) {
                    return Err(GraphError::NodeNotFound(*id));
                }
            }
            if let Some(children) = node.children() {
                for child in children {
                    let c = self.nodes.get(&child).ok_or(GraphError::NodeNotFound(child))?;
                    if !c.parents.contains(id) {
                        return Err(GraphError::ParentNotFound(*id));
                    }
                }
            }
            if id.value() >= self.next_id {
                return Err(GraphError::IdBeyondAllocator {
                    id: *id,
                    next: self.next_id(),
                });
            }
            if let NodeKind::Mesh(mesh) = node.kind() {
                for (_, target) in mesh.references() {
                    if self.get_as::<crate::node::DataArray>(target).is_none() {
                        return Err(GraphError::DanglingReference { mesh: *id, target });
                    }
                }
            }
        }
        for child in &self.root {
            if !self.nodes.contains_key(&child) {
                return Err(GraphError::NodeNotFound(child));
            }
        }
        Ok(())
    }

    /// Mesh nodes and the arrays they reference, for writers.
    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::node::{ArrayValues, DataArray, DataGroup, MeshKind, StringArray};

    fn path(s: &str) -> DataPath {
        s.parse().unwrap()
    }

    fn float_array(n: usize) -> DataArray {
        DataArray::new(vec![n], vec![1], vec![0.0_f32; n]).unwrap()
    }

    #[test]
    fn ids_are_monotonic_and_failed_creates_do_not_consume() {
        let mut g = Graph::new();
        let a = g.create(None, "a", DataGroup::new()).unwrap();
        assert!(g.create(None, "a", DataGroup::new()).is_err());
        let b = g.create(None, "b", DataGroup::new()).unwrap();
        assert_eq!(a, NodeId(1));
        assert_eq!(b, NodeId(2));
        g.remove(b);
        let c = g.create(None, "b", DataGroup::new()).unwrap();
        assert_eq!(c, NodeId(3));
    }

    #[test]
    fn deep_copy_has_independent_storage() {
        let mut g = Graph::new();
        let a = g.create(None, "A", float_array(10)).unwrap();
        let copy = g.deep_copy();
        g.get_as_mut::<DataArray>(a)
            .unwrap()
            .as_mut_slice::<f32>()
            .unwrap()[0] = 5.0;
        let copied = copy.get_as::<DataArray>(a).unwrap();
        assert_eq!(copied.as_slice::<f32>().unwrap()[0], 0.0);
        assert_eq!(copy.next_id(), g.next_id());
        assert_eq!(copy.paths_of(a), g.paths_of(a));
    }

    #[test]
    fn shared_node_survives_removal_of_one_parent() {
        let mut g = Graph::new();
        let p1 = g.create(None, "P1", DataGroup::new()).unwrap();
        let p2 = g.create(None, "P2", DataGroup::new()).unwrap();
        let x = g.create(Some(p1), "X", DataGroup::new()).unwrap();
        g.set_additional_parent(x, Some(p2)).unwrap();
        assert_eq!(g.paths_of(x), vec![path("P1/X"), path("P2/X")]);

        assert!(g.remove(p1));
        assert!(g.contains(x));
        assert_eq!(g.find(&path("P2/X")), Some(x));
        assert_eq!(g.node(x).unwrap().parent_count(), 1);
        g.check_integrity().unwrap();
    }

    #[test]
    fn remove_cascades_to_unowned_descendants() {
        let mut g = Graph::new();
        let top = g.create(None, "top", DataGroup::new()).unwrap();
        let mid = g.create(Some(top), "mid", DataGroup::new()).unwrap();
        let leaf = g.create(Some(mid), "leaf", float_array(2)).unwrap();
        g.set_additional_parent(leaf, Some(top)).unwrap();
        assert!(g.remove(top));
        assert!(g.is_empty());
        assert!(!g.contains(leaf));
        assert!(!g.remove(top));
    }

    #[test]
    fn additional_parent_rejects_cycles_and_duplicates() {
        let mut g = Graph::new();
        let a = g.create(None, "a", DataGroup::new()).unwrap();
        let b = g.create(Some(a), "b", DataGroup::new()).unwrap();
        assert!(matches!(
            g.set_additional_parent(a, Some(b)),
            Err(GraphError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            g.set_additional_parent(b, Some(a)),
            Err(GraphError::AlreadyChild { .. })
        ));
        let c = g.create(None, "b", DataGroup::new()).unwrap();
        assert!(matches!(
            g.set_additional_parent(c, Some(a)),
            Err(GraphError::DuplicateName { .. })
        ));
    }

    #[test]
    fn lookups_miss_quietly_and_strict_lookups_explain() {
        let mut g = Graph::new();
        let a = g.create(None, "a", DataGroup::new()).unwrap();
        assert!(g.get_as::<DataArray>(a).is_none());
        assert!(g.get_as::<DataGroup>(NodeId(99)).is_none());
        assert_eq!(
            g.get_ref_as::<DataArray>(a).unwrap_err(),
            GraphError::TypeMismatch {
                id: a,
                expected: "DataArray",
                found: "DataGroup"
            }
        );
        assert_eq!(
            g.get_ref_as::<DataArray>(NodeId(99)).unwrap_err(),
            GraphError::NodeNotFound(NodeId(99))
        );
    }

    #[test]
    fn attribute_matrix_enforces_tuple_count() {
        let mut g = Graph::new();
        let m = g.create(None, "m", AttributeMatrix::new(vec![2, 3]).unwrap()).unwrap();
        g.create(Some(m), "ok", float_array(6)).unwrap();
        assert!(matches!(
            g.create(Some(m), "bad", float_array(5)),
            Err(GraphError::TupleMismatch { expected: 6, actual: 5, .. })
        ));
        g.create(Some(m), "names", StringArray::shape_only(6)).unwrap();
    }

    #[test]
    fn tuple_validation_aggregates_every_path() {
        let mut g = Graph::new();
        g.create(None, "a", float_array(4)).unwrap();
        g.create(None, "b", float_array(4)).unwrap();
        g.create(None, "c", float_array(3)).unwrap();
        g.create(None, "grp", DataGroup::new()).unwrap();
        assert_eq!(
            g.validate_number_of_tuples(&[path("a"), path("b")]),
            Ok(4)
        );
        let errors = g
            .validate_number_of_tuples(&[path("a"), path("b"), path("c"), path("grp"), path("zz")])
            .unwrap_err();
        let found: Vec<i32> = errors.iter().map(|d| d.code).collect();
        assert_eq!(
            found,
            vec![codes::NOT_AN_ARRAY, codes::PATH_NOT_FOUND, codes::TUPLE_MISMATCH]
        );
        let mismatch = &errors[2].message;
        assert!(mismatch.contains("a=4") && mismatch.contains("b=4") && mismatch.contains("c=3"));
    }

    #[test]
    fn rename_checks_every_parent() {
        let mut g = Graph::new();
        let p1 = g.create(None, "p1", DataGroup::new()).unwrap();
        let p2 = g.create(None, "p2", DataGroup::new()).unwrap();
        let x = g.create(Some(p1), "x", DataGroup::new()).unwrap();
        g.set_additional_parent(x, Some(p2)).unwrap();
        g.create(Some(p2), "y", DataGroup::new()).unwrap();
        assert!(g.rename(x, "y").is_err());
        g.rename(x, "z").unwrap();
        assert_eq!(g.find(&path("p1/z")), Some(x));
        assert_eq!(g.find(&path("p2/z")), Some(x));
    }

    #[test]
    fn copy_subtree_preserves_internal_sharing() {
        let mut g = Graph::new();
        let src = g.create(None, "src", DataGroup::new()).unwrap();
        let inner = g.create(Some(src), "inner", DataGroup::new()).unwrap();
        let verts = g
            .create(Some(src), "verts", DataArray::new(vec![1], vec![3], vec![0.0_f32; 3]).unwrap())
            .unwrap();
        g.set_additional_parent(verts, Some(inner)).unwrap();
        let mesh = g.create(Some(src), "mesh", MeshGeom::new(MeshKind::Vertex)).unwrap();
        g.set_mesh_reference(mesh, MeshSlot::Vertices, Some(verts))
            .unwrap();

        let copy = g.copy_subtree(src, None, "dst").unwrap();
        let new_verts = g.find(&path("dst/verts")).unwrap();
        assert_ne!(new_verts, verts);
        assert_eq!(g.find(&path("dst/inner/verts")), Some(new_verts));
        let new_mesh = g.find(&path("dst/mesh")).unwrap();
        assert_eq!(
            g.get_as::<MeshGeom>(new_mesh)
                .unwrap()
                .reference(MeshSlot::Vertices),
            Some(new_verts)
        );
        assert_eq!(g.node(copy).unwrap().name(), "dst");
        g.check_integrity().unwrap();
    }

    #[test]
    fn removing_a_referenced_array_clears_the_mesh_slot() {
        let mut g = Graph::new();
        let verts = g
            .create(None, "verts", DataArray::new(vec![1], vec![3], vec![0.0_f64; 3]).unwrap())
            .unwrap();
        let mesh = g.create(None, "mesh", MeshGeom::new(MeshKind::Vertex)).unwrap();
        g.set_mesh_reference(mesh, MeshSlot::Vertices, Some(verts))
            .unwrap();
        g.remove(verts);
        assert_eq!(
            g.get_as::<MeshGeom>(mesh).unwrap().reference(MeshSlot::Vertices),
            None
        );
        g.check_integrity().unwrap();
    }

    #[test]
    fn walk_visits_shared_nodes_once_per_parent() {
        let mut g = Graph::new();
        let a = g.create(None, "a", DataGroup::new()).unwrap();
        let b = g.create(None, "b", DataGroup::new()).unwrap();
        let x = g.create(Some(a), "x", float_array(1)).unwrap();
        g.set_additional_parent(x, Some(b)).unwrap();
        let mut edges = Vec::new();
        g.walk(|parent, node, depth| {
            edges.push((parent, node.id(), depth));
            true
        });
        assert_eq!(
            edges,
            vec![(None, a, 0), (Some(a), x, 1), (None, b, 0), (Some(b), x, 1)]
        );
    }

    #[test]
    fn typed_mutation_cannot_change_shape_or_structure() {
        let mut g = Graph::new();
        let m = g.create(None, "m", AttributeMatrix::new(vec![3]).unwrap()).unwrap();
        let a = g.create(Some(m), "a", float_array(3)).unwrap();
        let s = g
            .create(Some(m), "s", StringArray::new(vec!["a".into(), "b".into(), "c".into()]))
            .unwrap();

        let array = g.get_as_mut::<DataArray>(a).unwrap();
        array.as_mut_slice::<f32>().unwrap()[2] = 4.5;
        assert!(array.set_f64(0, -1.0));
        assert!(!array.set_f64(3, 1.0));
        assert!(array.set_values(ArrayValues::Float32(vec![0.0; 4])).is_err());
        assert_eq!(array.as_slice::<f32>().unwrap(), &[-1.0, 0.0, 4.5]);

        let strings = g.get_as_mut::<StringArray>(s).unwrap();
        strings.values_mut().unwrap()[1] = "z".into();
        assert_eq!(strings.num_tuples(), 3);

        assert_eq!(g.get_as::<DataArray>(a).unwrap().num_tuples(), 3);
        g.check_integrity().unwrap();
    }

    #[test]
    fn removing_a_missing_edge_names_the_edge() {
        let mut g = Graph::new();
        let a = g.create(None, "a", DataGroup::new()).unwrap();
        let b = g.create(None, "b", DataGroup::new()).unwrap();
        let x = g.create(Some(a), "x", float_array(1)).unwrap();

        let err = g.remove_parent(x, Some(b)).unwrap_err();
        assert_eq!(err, GraphError::NotAChild { node: x, parent: b });
        assert_eq!(err.code(), codes::NOT_A_CHILD);
        assert_eq!(
            g.remove_parent(x, None),
            Err(GraphError::NotAChild {
                node: x,
                parent: NodeId::ROOT
            })
        );
        assert!(g.contains(x));

        g.remove_parent(x, Some(a)).unwrap();
        assert!(!g.contains(x));
        g.check_integrity().unwrap();
    }

    #[test]
    fn unresolved_reference_on_create_names_the_slot() {
        let mut g = Graph::new();
        let before = g.next_id();
        let mut mesh = MeshGeom::new(MeshKind::Triangle);
        mesh.set_reference(MeshSlot::Faces, Some(NodeId(999)));
        assert_eq!(
            g.create(None, "mesh", mesh),
            Err(GraphError::UnresolvedReference {
                slot: MeshSlot::Faces,
                target: NodeId(999)
            })
        );
        assert_eq!(g.next_id(), before);

        let live = g.create(None, "mesh", MeshGeom::new(MeshKind::Triangle)).unwrap();
        assert_eq!(
            g.set_mesh_reference(live, MeshSlot::Vertices, Some(NodeId(999))),
            Err(GraphError::DanglingReference {
                mesh: live,
                target: NodeId(999)
            })
        );
    }
}
