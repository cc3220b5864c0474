// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::args::{ArgValue, Arguments};
use crate::diagnostic::{codes, Diagnostic, Report};
use crate::filter::Filter;
use crate::graph::Graph;
use crate::mutation::{check_creatable, Mutation, MutationPlan};
use crate::node::{checked_product, AttributeMatrix, DataArray, DataType};

use super::take;

/// Creates a numeric array filled with a constant.
///
/// The whole effect is one primary [`Mutation::CreateArray`]; execute mode
/// allocates and fills the buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateDataArray;

impl CreateDataArray {
    /// Location of the new array.
    pub const OUTPUT_PATH: &'static str = "output_path";
    /// Element type.
    pub const DATA_TYPE: &'static str = "data_type";
    /// Tuple dimensions.
    pub const TUPLE_SHAPE: &'static str = "tuple_shape";
    /// Component dimensions.
    pub const COMPONENT_SHAPE: &'static str = "component_shape";
    /// Fill value.
    pub const INIT_VALUE: &'static str = "init_value";
}

impl Filter for CreateDataArray {
    fn name(&self) -> &'static str {
        "CreateDataArray"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new()
            .with(Self::DATA_TYPE, ArgValue::DataType(DataType::Float32))
            .with(Self::COMPONENT_SHAPE, ArgValue::Shape(vec![1]))
            .with(Self::INIT_VALUE, ArgValue::Float(0.0))
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let path = take(&mut errors, args.path(Self::OUTPUT_PATH));
        let dtype = take(&mut errors, args.data_type(Self::DATA_TYPE));
        let tuple_shape = take(&mut errors, args.shape(Self::TUPLE_SHAPE));
        let component_shape = take(&mut errors, args.shape(Self::COMPONENT_SHAPE));
        let init = take(&mut errors, args.float(Self::INIT_VALUE));

        if let (Some(dtype), Some(init)) = (dtype, init) {
            if !dtype.accepts(init) {
                errors.push(Diagnostic::new(
                    codes::VALUE_OUT_OF_RANGE,
                    format!("init value {init} does not fit {dtype}"),
                ));
            }
        }
        if let (Some(dtype), Some(ts), Some(cs)) = (dtype, tuple_shape, component_shape) {
            if let Err(e) = DataArray::shape_only(dtype, ts.to_vec(), cs.to_vec()) {
                errors.push(Diagnostic::new(codes::INVALID_SHAPE, e.to_string()));
            }
        }
        if let Some(path) = path {
            match check_creatable(graph, path) {
                Err(d) => errors.push(d),
                Ok(parent) => {
                    let matrix = parent.and_then(|p| graph.get_as::<AttributeMatrix>(p));
                    // an overflowing shape is already reported as INVALID_SHAPE
                    let tuples = tuple_shape.and_then(checked_product);
                    if let (Some(matrix), Some(tuples)) = (matrix, tuples) {
                        if matrix.num_tuples() != tuples {
                            errors.push(Diagnostic::new(
                                codes::TUPLE_MISMATCH,
                                format!(
                                    "{path} would have {tuples} tuples but its attribute matrix requires {}",
                                    matrix.num_tuples()
                                ),
                            ));
                        }
                    }
                }
            }
        }

        let mut plan = MutationPlan::new();
        if let (Some(path), Some(dtype), Some(ts), Some(cs), Some(init)) =
            (path, dtype, tuple_shape, component_shape, init)
        {
            plan.push(Mutation::CreateArray {
                path: path.clone(),
                dtype,
                tuple_shape: ts.to_vec(),
                component_shape: cs.to_vec(),
                init,
            });
        }
        Report::from_parts(plan, errors, Vec::new())
    }
}
