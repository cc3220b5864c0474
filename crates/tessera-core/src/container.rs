// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered child sets.
use std::collections::BTreeSet;

use crate::ident::NodeId;

/// Ordered set of child ids owned by the graph root or by a composite node.
///
/// Nodes themselves live in the [`Graph`](crate::Graph) arena; a container
/// only records which ids it references. Iteration is in id order, which is
/// also creation order, so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    children: BTreeSet<NodeId>,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if the container has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns `true` if `id` is a direct child.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.children.contains(&id)
    }

    /// Iterates direct children in id order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    pub(crate) fn insert(&mut self, id: NodeId) -> bool {
        self.children.insert(id)
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> bool {
        self.children.remove(&id)
    }
}

impl<'a> IntoIterator for &'a Container {
    type Item = NodeId;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, NodeId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter().copied()
    }
}
