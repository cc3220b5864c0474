// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::args::{ArgValue, Arguments};
use crate::diagnostic::{codes, Diagnostic, Diagnostics, Report};
use crate::filter::{ExecContext, Filter};
use crate::graph::Graph;
use crate::ident::{validate_name, DataPath};
use crate::mutation::{check_creatable, Mutation, MutationPlan};
use crate::node::{DataArray, DataType, Element};

use super::{fill_parallel, require_array, storage_id, take};

/// Converts an array to another element type.
///
/// Values pass through `f64` and saturate at the target range; floats are
/// truncated toward zero for integer targets. With `delete_original` the
/// result is written to a temporary sibling, then the original is deleted
/// and the temporary renamed, both as deferred mutations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertData;

impl ConvertData {
    /// Array to convert.
    pub const INPUT_PATH: &'static str = "input_path";
    /// Target element type.
    pub const DATA_TYPE: &'static str = "data_type";
    /// Name of the converted array (sibling of the input).
    pub const OUTPUT_NAME: &'static str = "output_name";
    /// Replace the input with the result.
    pub const DELETE_ORIGINAL: &'static str = "delete_original";

    fn temp_name(output_name: &str) -> String {
        format!("_{output_name}_converting")
    }

    /// Path the computation writes to.
    fn work_path(args: &Arguments) -> Option<DataPath> {
        let input = args.path(Self::INPUT_PATH).ok()?;
        let name = args.text(Self::OUTPUT_NAME).ok()?;
        if args.bool(Self::DELETE_ORIGINAL).unwrap_or(false) {
            input.with_name(&Self::temp_name(name)).ok()
        } else {
            input.with_name(name).ok()
        }
    }
}

fn narrows(from: DataType, to: DataType) -> bool {
    if from == to {
        return false;
    }
    if from.is_float() && !to.is_float() {
        return true;
    }
    let (lo_from, hi_from) = from.range();
    let (lo_to, hi_to) = to.range();
    lo_from < lo_to || hi_from > hi_to
}

impl Filter for ConvertData {
    fn name(&self) -> &'static str {
        "ConvertData"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new().with(Self::DELETE_ORIGINAL, ArgValue::Bool(false))
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let input = take(&mut errors, args.path(Self::INPUT_PATH));
        let dtype = take(&mut errors, args.data_type(Self::DATA_TYPE));
        let output_name = take(&mut errors, args.text(Self::OUTPUT_NAME));
        let delete_original = take(&mut errors, args.bool(Self::DELETE_ORIGINAL));

        if let Some(name) = output_name {
            if let Err(e) = validate_name(name) {
                errors.push(Diagnostic::new(codes::INVALID_NAME, e.to_string()));
            }
        }
        let source = input.and_then(|p| require_array(graph, p).map_err(|d| errors.push(d)).ok());
        if let (Some((_, array)), Some(dtype), Some(input)) = (source, dtype, input) {
            if narrows(array.dtype(), dtype) {
                warnings.push(Diagnostic::new(
                    codes::WARN_NARROWING,
                    format!("converting {input} from {} to {dtype} may lose values", array.dtype()),
                ));
            }
        }

        let mut plan = MutationPlan::new();
        let (Some(input), Some(dtype), Some(name), Some(delete_original), Some((_, array))) =
            (input, dtype, output_name, delete_original, source)
        else {
            return Report::from_parts(plan, errors, warnings);
        };
        if !errors.is_empty() {
            return Report::from_parts(plan, errors, warnings);
        }
        let Some(work) = Self::work_path(args) else {
            return Report::fail(errors).with_warnings(warnings);
        };
        if let Err(d) = check_creatable(graph, &work) {
            errors.push(d);
        }
        if delete_original && input.target_name() != Some(name) {
            match input.with_name(name) {
                Ok(final_path) if graph.find(&final_path).is_some() => {
                    errors.push(Diagnostic::new(
                        codes::PATH_EXISTS,
                        format!("cannot convert into {final_path}: path already exists"),
                    ));
                }
                _ => {}
            }
        }
        plan.push(Mutation::CreateArray {
            path: work.clone(),
            dtype,
            tuple_shape: array.tuple_shape().to_vec(),
            component_shape: array.component_shape().to_vec(),
            init: 0.0,
        });
        if delete_original {
            plan.defer(Mutation::Delete {
                path: input.clone(),
            });
            plan.defer(Mutation::Rename {
                path: work,
                new_name: name.to_owned(),
            });
        }
        Report::from_parts(plan, errors, warnings)
    }

    fn execute_impl(
        &self,
        graph: &mut Graph,
        args: &Arguments,
        ctx: &ExecContext<'_>,
    ) -> Result<(), Diagnostics> {
        let input = args.path(Self::INPUT_PATH).map_err(|e| vec![e.into()])?;
        let work = Self::work_path(args).ok_or_else(|| {
            vec![Diagnostic::new(
                codes::INVALID_NAME,
                "cannot derive the output path",
            )]
        })?;
        let out_id = storage_id(graph, &work).map_err(|d| vec![d])?;
        let (_, source) = require_array(graph, input).map_err(|d| vec![d])?;
        let values = source.values().ok_or_else(|| {
            vec![Diagnostic::new(
                codes::MISSING_STORAGE,
                format!("{input} has no payload"),
            )]
        })?;
        let target = graph
            .get_ref_as::<DataArray>(out_id)
            .map_err(|e| vec![e.into()])?
            .dtype();
        let len = values.len();

        let converted = crate::dispatch_dtype!(target, T => {
            let buf = fill_parallel(ctx, len, |i| {
                T::from_f64(values.get_f64(i).unwrap_or_default())
            })
            .map_err(|d| vec![d])?;
            T::wrap(buf)
        });

        graph
            .get_ref_as_mut::<DataArray>(out_id)
            .map_err(|e| vec![e.into()])?
            .set_values(converted)
            .map_err(|e| vec![Diagnostic::new(codes::INVALID_SHAPE, e.to_string())])?;
        ctx.message(format!("converted {len} values to {target}"));
        Ok(())
    }
}
