// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Built-in filters and the name-keyed filter registry.
use std::collections::BTreeMap;

use crate::args::ArgumentError;
use crate::diagnostic::{codes, Diagnostic, Diagnostics};
use crate::filter::{ExecContext, Filter};
use crate::graph::Graph;
use crate::ident::{DataPath, NodeId};
use crate::node::{DataArray, Element};
use crate::parallel::parallel_for_chunks;

mod combine_arrays;
mod convert_data;
mod copy_data;
mod create_array;
mod create_group;
mod delete_data;
mod rename_data;

pub use combine_arrays::CombineArrays;
pub use convert_data::ConvertData;
pub use copy_data::CopyDataObject;
pub use create_array::CreateDataArray;
pub use create_group::{CreateAttributeMatrix, CreateDataGroup};
pub use delete_data::DeleteData;
pub use rename_data::RenameData;

/// Filters resolvable by name.
#[derive(Default)]
pub struct FilterRegistry {
    filters: BTreeMap<&'static str, Box<dyn Filter>>,
}

impl FilterRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in filter.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(CreateDataArray));
        reg.register(Box::new(CreateDataGroup));
        reg.register(Box::new(CreateAttributeMatrix));
        reg.register(Box::new(DeleteData));
        reg.register(Box::new(RenameData));
        reg.register(Box::new(CopyDataObject));
        reg.register(Box::new(ConvertData));
        reg.register(Box::new(CombineArrays));
        reg
    }

    /// Registers a filter under its name. Returns the filter it replaced.
    pub fn register(&mut self, filter: Box<dyn Filter>) -> Option<Box<dyn Filter>> {
        self.filters.insert(filter.name(), filter)
    }

    /// Filter registered as `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        self.filters.get(name).map(AsRef::as_ref)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.filters.keys().copied()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.filters.keys()).finish()
    }
}

/// Moves an accessor error into `errors`.
fn take<T>(errors: &mut Diagnostics, value: Result<T, ArgumentError>) -> Option<T> {
    value.map_err(|e| errors.push(e.into())).ok()
}

/// Resolves `path` to an existing numeric array.
fn require_array<'g>(
    graph: &'g Graph,
    path: &DataPath,
) -> Result<(NodeId, &'g DataArray), Diagnostic> {
    let id = graph
        .find(path)
        .ok_or_else(|| Diagnostic::new(codes::PATH_NOT_FOUND, format!("{path} does not exist")))?;
    let array = graph.get_as::<DataArray>(id).ok_or_else(|| {
        Diagnostic::new(codes::NOT_AN_ARRAY, format!("{path} is not a numeric array"))
    })?;
    Ok((id, array))
}

/// Resolves `path` after the primary mutations ran and returns its id.
fn storage_id(graph: &Graph, path: &DataPath) -> Result<NodeId, Diagnostic> {
    graph.find(path).ok_or_else(|| {
        Diagnostic::new(
            codes::MISSING_STORAGE,
            format!("{path} is missing after the primary mutations"),
        )
    })
}

/// Elements processed between cancellation polls.
const BLOCK: usize = 16 * 1024;

/// Builds a buffer of `len` elements with `f(index)` on the worker pool.
///
/// Cancellation is polled and progress advanced once per block, never per
/// element.
fn fill_parallel<T, F>(ctx: &ExecContext<'_>, len: usize, f: F) -> Result<Vec<T>, Diagnostic>
where
    T: Element,
    F: Fn(usize) -> T + Sync,
{
    let mut out = vec![T::default(); len];
    parallel_for_chunks(&mut out, ctx.workers(), |offset, chunk| {
        for (b, block) in chunk.chunks_mut(BLOCK).enumerate() {
            ctx.check_cancel()?;
            let base = offset + b * BLOCK;
            for (i, slot) in block.iter_mut().enumerate() {
                *slot = f(base + i);
            }
            ctx.advance(block.len());
        }
        Ok::<(), Diagnostic>(())
    })?;
    Ok(out)
}
