// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::args::Arguments;
use crate::diagnostic::{codes, Diagnostic, Diagnostics, Report};
use crate::filter::{ExecContext, Filter};
use crate::graph::Graph;
use crate::mutation::{check_creatable, Mutation, MutationPlan};
use crate::node::{AttributeMatrix, DataArray, Element};

use super::{fill_parallel, require_array, storage_id, take};

/// Stacks the components of several arrays into one.
///
/// Inputs must share element type and tuple count. Output tuple `t` holds
/// the components of every input's tuple `t`, in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombineArrays;

impl CombineArrays {
    /// Arrays to combine, in component order.
    pub const INPUT_PATHS: &'static str = "input_paths";
    /// Location of the combined array.
    pub const OUTPUT_PATH: &'static str = "output_path";
}

impl Filter for CombineArrays {
    fn name(&self) -> &'static str {
        "CombineArrays"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new()
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let inputs = take(&mut errors, args.paths(Self::INPUT_PATHS));
        let output = take(&mut errors, args.path(Self::OUTPUT_PATH));

        let mut arrays = Vec::new();
        if let Some(inputs) = inputs {
            if inputs.is_empty() {
                errors.push(Diagnostic::new(
                    codes::MISSING_ARGUMENT,
                    "at least one input array is required",
                ));
            }
            if let Err(found) = graph.validate_number_of_tuples(inputs) {
                errors.extend(found);
            }
            for path in inputs {
                if let Ok((_, array)) = require_array(graph, path) {
                    arrays.push((path, array));
                }
            }
        }
        if let Some((first, head)) = arrays.first() {
            for (path, array) in &arrays[1..] {
                if array.dtype() != head.dtype() {
                    errors.push(Diagnostic::new(
                        codes::TYPE_MISMATCH,
                        format!(
                            "{path} is {} but {first} is {}",
                            array.dtype(),
                            head.dtype()
                        ),
                    ));
                }
            }
        }
        let parent = output.and_then(|p| check_creatable(graph, p).map_err(|d| errors.push(d)).ok());

        let mut plan = MutationPlan::new();
        if !errors.is_empty() {
            return Report::fail(errors);
        }
        let (Some(output), Some((_, head))) = (output, arrays.first()) else {
            return Report::fail(errors);
        };
        let components: usize = arrays.iter().map(|(_, a)| a.num_components()).sum();
        if let Some(matrix) = parent.flatten().and_then(|p| graph.get_as::<AttributeMatrix>(p)) {
            if matrix.num_tuples() != head.num_tuples() {
                return Report::fail(vec![Diagnostic::new(
                    codes::TUPLE_MISMATCH,
                    format!(
                        "{output} requires {} tuples, inputs have {}",
                        matrix.num_tuples(),
                        head.num_tuples()
                    ),
                )]);
            }
        }
        plan.push(Mutation::CreateArray {
            path: output.clone(),
            dtype: head.dtype(),
            tuple_shape: head.tuple_shape().to_vec(),
            component_shape: vec![components],
            init: 0.0,
        });
        Report::ok(plan)
    }

    fn execute_impl(
        &self,
        graph: &mut Graph,
        args: &Arguments,
        ctx: &ExecContext<'_>,
    ) -> Result<(), Diagnostics> {
        let inputs = args.paths(Self::INPUT_PATHS).map_err(|e| vec![e.into()])?;
        let output = args.path(Self::OUTPUT_PATH).map_err(|e| vec![e.into()])?;
        let out_id = storage_id(graph, output).map_err(|d| vec![d])?;
        let mut sources = Vec::with_capacity(inputs.len());
        for path in inputs {
            let (_, array) = require_array(graph, path).map_err(|d| vec![d])?;
            if !array.is_allocated() {
                return Err(vec![Diagnostic::new(
                    codes::MISSING_STORAGE,
                    format!("{path} has no payload"),
                )]);
            }
            sources.push(array);
        }
        let Some(head) = sources.first() else {
            return Ok(());
        };
        let dtype = head.dtype();
        let tuples = head.num_tuples();
        // (component offset, component count) per input
        let mut layout = Vec::with_capacity(sources.len());
        let mut total = 0;
        for array in &sources {
            layout.push((total, array.num_components()));
            total += array.num_components();
        }
        let pick = |i: usize| -> (usize, usize) {
            let (t, c) = (i / total, i % total);
            let k = layout.partition_point(|(start, _)| *start <= c) - 1;
            (k, t * layout[k].1 + (c - layout[k].0))
        };

        let combined = crate::dispatch_dtype!(dtype, T => {
            let slices: Vec<&[T]> = sources.iter().filter_map(|a| a.as_slice::<T>()).collect();
            if slices.len() != sources.len() {
                return Err(vec![Diagnostic::new(codes::TYPE_MISMATCH, "inputs changed type")]);
            }
            let buf = fill_parallel(ctx, tuples * total, |i| {
                let (k, j) = pick(i);
                slices[k][j]
            })
            .map_err(|d| vec![d])?;
            T::wrap(buf)
        });

        graph
            .get_ref_as_mut::<DataArray>(out_id)
            .map_err(|e| vec![e.into()])?
            .set_values(combined)
            .map_err(|e| vec![Diagnostic::new(codes::INVALID_SHAPE, e.to_string())])?;
        Ok(())
    }
}
