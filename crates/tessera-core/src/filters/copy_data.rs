// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::args::Arguments;
use crate::diagnostic::{codes, Diagnostic, Report};
use crate::filter::Filter;
use crate::graph::Graph;
use crate::mutation::{check_creatable, Mutation, MutationPlan};
use crate::node::AttributeMatrix;

use super::take;

/// Copies a node and its subtree to a new location with fresh ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyDataObject;

impl CopyDataObject {
    /// Subtree to copy.
    pub const SOURCE_PATH: &'static str = "source_path";
    /// Location of the copy.
    pub const DESTINATION_PATH: &'static str = "destination_path";
}

impl Filter for CopyDataObject {
    fn name(&self) -> &'static str {
        "CopyDataObject"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new()
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let source = take(&mut errors, args.path(Self::SOURCE_PATH));
        let destination = take(&mut errors, args.path(Self::DESTINATION_PATH));

        let source_id = source.and_then(|s| {
            let found = graph.find(s);
            if found.is_none() {
                errors.push(Diagnostic::new(
                    codes::PATH_NOT_FOUND,
                    format!("{s} does not exist"),
                ));
            }
            found
        });
        if let Some(destination) = destination {
            match check_creatable(graph, destination) {
                Err(d) => errors.push(d),
                Ok(parent) => {
                    let matrix = parent.and_then(|p| graph.get_as::<AttributeMatrix>(p));
                    let tuples = source_id
                        .and_then(|id| graph.node(id))
                        .and_then(|n| n.kind().num_tuples());
                    if let (Some(matrix), Some(tuples)) = (matrix, tuples) {
                        if matrix.num_tuples() != tuples {
                            errors.push(Diagnostic::new(
                                codes::TUPLE_MISMATCH,
                                format!(
                                    "{destination} requires {} tuples, source has {tuples}",
                                    matrix.num_tuples()
                                ),
                            ));
                        }
                    }
                }
            }
        }

        let mut plan = MutationPlan::new();
        if let (Some(source), Some(destination)) = (source, destination) {
            plan.push(Mutation::Copy {
                source: source.clone(),
                destination: destination.clone(),
            });
        }
        Report::from_parts(plan, errors, Vec::new())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::args::ArgValue;
    use crate::node::DataArray;

    #[test]
    fn copy_into_matrix_checks_tuples() {
        let mut g = Graph::new();
        g.create(None, "a", DataArray::new(vec![3], vec![1], vec![1_i32, 2, 3]).unwrap())
            .unwrap();
        g.create(None, "M", AttributeMatrix::new(vec![4]).unwrap()).unwrap();
        let args = Arguments::new()
            .with(CopyDataObject::SOURCE_PATH, ArgValue::Path("a".parse().unwrap()))
            .with(CopyDataObject::DESTINATION_PATH, ArgValue::Path("M/a".parse().unwrap()));
        assert_eq!(
            CopyDataObject.preflight(&g, &args).errors()[0].code,
            codes::TUPLE_MISMATCH
        );
    }
}
