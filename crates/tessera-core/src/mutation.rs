// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structural mutations produced by filter preflight.
//!
//! Preflight returns a [`MutationPlan`]: *primary* mutations are applied
//! before the filter's computation runs, *deferred* ones strictly after it
//! succeeds (for example renaming a temporary output over the original).
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::diagnostic::{codes, Diagnostic};
use crate::graph::{Graph, GraphError};
use crate::ident::DataPath;
use crate::node::{AttributeMatrix, DataArray, DataGroup, DataType};

/// How a mutation materializes new arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Structure only; new arrays carry a shape and no payload.
    Preflight,
    /// Arrays are allocated and filled with their initial value.
    Execute,
}

/// One structural change to a [`Graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Creates a numeric array.
    CreateArray {
        /// Location of the new array; its parent must exist.
        path: DataPath,
        /// Element type.
        dtype: DataType,
        /// Tuple dimensions.
        tuple_shape: Vec<usize>,
        /// Component dimensions.
        component_shape: Vec<usize>,
        /// Fill value used in [`ApplyMode::Execute`].
        init: f64,
    },
    /// Creates an empty group.
    CreateGroup {
        /// Location of the new group.
        path: DataPath,
    },
    /// Creates an empty attribute matrix.
    CreateAttributeMatrix {
        /// Location of the new matrix.
        path: DataPath,
        /// Tuple dimensions every child array must match.
        tuple_shape: Vec<usize>,
    },
    /// Removes a node from every parent; unowned descendants go with it.
    Delete {
        /// Node to delete.
        path: DataPath,
    },
    /// Renames a node in place.
    Rename {
        /// Node to rename.
        path: DataPath,
        /// New final component.
        new_name: String,
    },
    /// Copies a subtree with fresh ids.
    Copy {
        /// Subtree root.
        source: DataPath,
        /// Location of the copy.
        destination: DataPath,
    },
    /// Does nothing.
    NoOp,
}

/// Checks that `path` can be created: its parent resolves to a container
/// and nothing exists at `path` yet. Returns the parent.
pub(crate) fn check_creatable(
    graph: &Graph,
    path: &DataPath,
) -> Result<Option<crate::NodeId>, Diagnostic> {
    let parent = path.parent();
    let id = graph.resolve_container(&parent).map_err(|err| match err {
        GraphError::PathNotFound(_) => Diagnostic::new(
            codes::PARENT_NOT_FOUND,
            format!("cannot create {path}: parent container {parent} does not exist"),
        ),
        GraphError::NotAContainer(_) => Diagnostic::new(
            codes::NOT_A_CONTAINER,
            format!("cannot create {path}: {parent} is not a container"),
        ),
        other => other.into(),
    })?;
    if graph.find(path).is_some() {
        return Err(Diagnostic::new(
            codes::PATH_EXISTS,
            format!("cannot create {path}: path already exists"),
        ));
    }
    Ok(id)
}

pub(crate) fn target_name(path: &DataPath) -> Result<&str, Diagnostic> {
    path.target_name().ok_or_else(|| {
        Diagnostic::new(
            codes::INVALID_NAME,
            "the root container cannot be created, moved or renamed",
        )
    })
}

fn existing(graph: &Graph, path: &DataPath) -> Result<crate::NodeId, Diagnostic> {
    graph
        .find(path)
        .ok_or_else(|| Diagnostic::new(codes::PATH_NOT_FOUND, format!("{path} does not exist")))
}

impl Mutation {
    /// Applies the mutation, stopping at the first problem.
    pub fn apply(&self, graph: &mut Graph, mode: ApplyMode) -> Result<(), Diagnostic> {
        trace!(mutation = ?self, ?mode, "applying");
        match self {
            Self::CreateArray {
                path,
                dtype,
                tuple_shape,
                component_shape,
                init,
            } => {
                let parent = check_creatable(graph, path)?;
                let name = target_name(path)?;
                let array = match mode {
                    ApplyMode::Preflight => {
                        DataArray::shape_only(*dtype, tuple_shape.clone(), component_shape.clone())
                    }
                    ApplyMode::Execute => DataArray::filled(
                        *dtype,
                        tuple_shape.clone(),
                        component_shape.clone(),
                        *init,
                    ),
                }
                .map_err(|e| Diagnostic::new(codes::INVALID_SHAPE, format!("{path}: {e}")))?;
                graph.create(parent, name, array)?;
            }
            Self::CreateGroup { path } => {
                let parent = check_creatable(graph, path)?;
                graph.create(parent, target_name(path)?, DataGroup::new())?;
            }
            Self::CreateAttributeMatrix { path, tuple_shape } => {
                let parent = check_creatable(graph, path)?;
                let matrix = AttributeMatrix::new(tuple_shape.clone())
                    .map_err(|e| Diagnostic::new(codes::INVALID_SHAPE, format!("{path}: {e}")))?;
                graph.create(parent, target_name(path)?, matrix)?;
            }
            Self::Delete { path } => {
                let id = existing(graph, path)?;
                graph.remove(id);
            }
            Self::Rename { path, new_name } => {
                let id = existing(graph, path)?;
                graph.rename(id, new_name)?;
            }
            Self::Copy {
                source,
                destination,
            } => {
                let id = existing(graph, source)?;
                let parent = check_creatable(graph, destination)?;
                graph.copy_subtree(id, parent, target_name(destination)?)?;
            }
            Self::NoOp => {}
        }
        Ok(())
    }
}

/// Ordered mutations returned by a successful preflight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationPlan {
    /// Applied before the computation runs.
    pub primary: Vec<Mutation>,
    /// Applied after the computation succeeds.
    pub deferred: Vec<Mutation>,
}

impl MutationPlan {
    /// Empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a primary mutation.
    pub fn push(&mut self, mutation: Mutation) {
        self.primary.push(mutation);
    }

    /// Appends a deferred mutation.
    pub fn defer(&mut self, mutation: Mutation) {
        self.deferred.push(mutation);
    }

    /// Applies the primary list in order.
    pub fn apply_primary(&self, graph: &mut Graph, mode: ApplyMode) -> Result<(), Diagnostic> {
        apply_all(&self.primary, graph, mode)
    }

    /// Applies the deferred list in order.
    pub fn apply_deferred(&self, graph: &mut Graph, mode: ApplyMode) -> Result<(), Diagnostic> {
        apply_all(&self.deferred, graph, mode)
    }
}

fn apply_all(list: &[Mutation], graph: &mut Graph, mode: ApplyMode) -> Result<(), Diagnostic> {
    list.iter().try_for_each(|m| m.apply(graph, mode))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn path(s: &str) -> DataPath {
        s.parse().unwrap()
    }

    fn create_array(p: &str) -> Mutation {
        Mutation::CreateArray {
            path: path(p),
            dtype: DataType::Float32,
            tuple_shape: vec![4],
            component_shape: vec![1],
            init: 2.0,
        }
    }

    #[test]
    fn preflight_mode_creates_shape_only_arrays() {
        let mut g = Graph::new();
        create_array("a").apply(&mut g, ApplyMode::Preflight).unwrap();
        let id = g.find(&path("a")).unwrap();
        let array = g.get_as::<DataArray>(id).unwrap();
        assert!(!array.is_allocated());
        assert_eq!(array.num_tuples(), 4);
    }

    #[test]
    fn execute_mode_fills_arrays() {
        let mut g = Graph::new();
        create_array("a").apply(&mut g, ApplyMode::Execute).unwrap();
        let id = g.find(&path("a")).unwrap();
        let values = g.get_as::<DataArray>(id).unwrap().as_slice::<f32>().unwrap();
        assert!(values.iter().all(|v| (*v - 2.0).abs() < f32::EPSILON));
    }

    #[test]
    fn missing_parent_is_named_in_the_error() {
        let mut g = Graph::new();
        let err = create_array("nope/a")
            .apply(&mut g, ApplyMode::Execute)
            .unwrap_err();
        assert_eq!(err.code, codes::PARENT_NOT_FOUND);
        assert!(err.message.contains("nope"));
        assert!(g.is_empty());
    }

    #[test]
    fn plan_applies_primary_then_deferred() {
        let mut g = Graph::new();
        let mut plan = MutationPlan::new();
        plan.push(Mutation::CreateGroup { path: path("g") });
        plan.push(create_array("g/tmp"));
        plan.defer(Mutation::Rename {
            path: path("g/tmp"),
            new_name: "final".into(),
        });
        plan.apply_primary(&mut g, ApplyMode::Execute).unwrap();
        assert!(g.find(&path("g/tmp")).is_some());
        plan.apply_deferred(&mut g, ApplyMode::Execute).unwrap();
        assert!(g.find(&path("g/tmp")).is_none());
        assert!(g.find(&path("g/final")).is_some());
    }

    #[test]
    fn copy_and_delete_address_by_path() {
        let mut g = Graph::new();
        Mutation::CreateGroup { path: path("g") }
            .apply(&mut g, ApplyMode::Execute)
            .unwrap();
        create_array("g/a").apply(&mut g, ApplyMode::Execute).unwrap();
        Mutation::Copy {
            source: path("g"),
            destination: path("h"),
        }
        .apply(&mut g, ApplyMode::Execute)
        .unwrap();
        assert!(g.find(&path("h/a")).is_some());
        Mutation::Delete { path: path("g") }
            .apply(&mut g, ApplyMode::Execute)
            .unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(
            Mutation::Delete { path: path("g") }
                .apply(&mut g, ApplyMode::Execute)
                .unwrap_err()
                .code,
            codes::PATH_NOT_FOUND
        );
    }

    #[test]
    fn mutations_serialize_with_an_op_tag() {
        let json = serde_json::to_string(&Mutation::NoOp).unwrap();
        assert_eq!(json, r#"{"op":"no_op"}"#);
    }
}
