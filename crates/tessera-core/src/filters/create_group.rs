// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::args::{ArgValue, Arguments};
use crate::diagnostic::{codes, Diagnostic, Report};
use crate::filter::Filter;
use crate::graph::Graph;
use crate::mutation::{check_creatable, Mutation, MutationPlan};
use crate::node::AttributeMatrix;

use super::take;

/// Creates an empty group.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateDataGroup;

impl CreateDataGroup {
    /// Location of the new group.
    pub const OUTPUT_PATH: &'static str = "output_path";
}

impl Filter for CreateDataGroup {
    fn name(&self) -> &'static str {
        "CreateDataGroup"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new()
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let mut plan = MutationPlan::new();
        if let Some(path) = take(&mut errors, args.path(Self::OUTPUT_PATH)) {
            match check_creatable(graph, path) {
                Ok(_) => plan.push(Mutation::CreateGroup { path: path.clone() }),
                Err(d) => errors.push(d),
            }
        }
        Report::from_parts(plan, errors, Vec::new())
    }
}

/// Creates an empty attribute matrix with a fixed tuple shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateAttributeMatrix;

impl CreateAttributeMatrix {
    /// Location of the new matrix.
    pub const OUTPUT_PATH: &'static str = "output_path";
    /// Tuple dimensions.
    pub const TUPLE_SHAPE: &'static str = "tuple_shape";
}

impl Filter for CreateAttributeMatrix {
    fn name(&self) -> &'static str {
        "CreateAttributeMatrix"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new().with(Self::TUPLE_SHAPE, ArgValue::Shape(vec![1]))
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let path = take(&mut errors, args.path(Self::OUTPUT_PATH));
        let shape = take(&mut errors, args.shape(Self::TUPLE_SHAPE));
        if shape.is_some_and(<[usize]>::is_empty) {
            errors.push(Diagnostic::new(
                codes::INVALID_SHAPE,
                "tuple shape must have at least one dimension",
            ));
        } else if let Some(Err(e)) = shape.map(|s| AttributeMatrix::new(s.to_vec())) {
            errors.push(Diagnostic::new(codes::INVALID_SHAPE, e.to_string()));
        }
        if let Some(path) = path {
            if let Err(d) = check_creatable(graph, path) {
                errors.push(d);
            }
        }
        let mut plan = MutationPlan::new();
        if let (Some(path), Some(shape)) = (path, shape) {
            plan.push(Mutation::CreateAttributeMatrix {
                path: path.clone(),
                tuple_shape: shape.to_vec(),
            });
        }
        Report::from_parts(plan, errors, Vec::new())
    }
}
