// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::args::Arguments;
use crate::diagnostic::{codes, Diagnostic, Report};
use crate::filter::Filter;
use crate::graph::Graph;
use crate::ident::validate_name;
use crate::mutation::{Mutation, MutationPlan};

use super::take;

/// Renames a node in place. The name must be free in every parent of a
/// shared node.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameData;

impl RenameData {
    /// Node to rename.
    pub const SOURCE_PATH: &'static str = "source_path";
    /// New name.
    pub const NEW_NAME: &'static str = "new_name";
}

impl Filter for RenameData {
    fn name(&self) -> &'static str {
        "RenameData"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new()
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let source = take(&mut errors, args.path(Self::SOURCE_PATH));
        let new_name = take(&mut errors, args.text(Self::NEW_NAME));

        if let Some(name) = new_name {
            if let Err(e) = validate_name(name) {
                errors.push(Diagnostic::new(codes::INVALID_NAME, e.to_string()));
            }
        }
        if let Some(source) = source {
            match graph.find(source) {
                None => errors.push(Diagnostic::new(
                    codes::PATH_NOT_FOUND,
                    format!("{source} does not exist"),
                )),
                Some(id) => {
                    if let Some(name) = new_name {
                        for alias in graph.paths_of(id) {
                            let Ok(target) = alias.with_name(name) else {
                                continue;
                            };
                            if graph.find(&target).is_some_and(|other| other != id) {
                                errors.push(Diagnostic::new(
                                    codes::PATH_EXISTS,
                                    format!("cannot rename {alias}: {target} already exists"),
                                ));
                            }
                        }
                    }
                }
            }
        }

        let mut plan = MutationPlan::new();
        if let (Some(source), Some(name)) = (source, new_name) {
            plan.push(Mutation::Rename {
                path: source.clone(),
                new_name: name.to_owned(),
            });
        }
        Report::from_parts(plan, errors, Vec::new())
    }
}
