// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::args::Arguments;
use crate::diagnostic::{codes, Diagnostic, Report};
use crate::filter::Filter;
use crate::graph::Graph;
use crate::mutation::{Mutation, MutationPlan};

use super::take;

/// Removes one or more nodes (and whatever only they own).
///
/// Removing a node that has several parents detaches it from all of them;
/// preflight warns about that. A path lying under another listed path is
/// dropped from the plan with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteData;

impl DeleteData {
    /// Paths to remove.
    pub const REMOVED_PATHS: &'static str = "removed_paths";
}

impl Filter for DeleteData {
    fn name(&self) -> &'static str {
        "DeleteData"
    }

    fn default_arguments(&self) -> Arguments {
        Arguments::new()
    }

    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut plan = MutationPlan::new();
        let Some(paths) = take(&mut errors, args.paths(Self::REMOVED_PATHS)) else {
            return Report::fail(errors);
        };
        for (i, path) in paths.iter().enumerate() {
            let covered = paths
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && path != other && path.starts_with(other));
            if covered {
                warnings.push(Diagnostic::new(
                    codes::WARN_REDUNDANT_PATH,
                    format!("{path} is removed together with an enclosing path"),
                ));
                continue;
            }
            if paths[..i].contains(path) {
                continue;
            }
            let Some(id) = graph.find(path) else {
                errors.push(Diagnostic::new(
                    codes::PATH_NOT_FOUND,
                    format!("{path} does not exist"),
                ));
                continue;
            };
            let parents = graph.node(id).map_or(0, |n| n.parent_count());
            if parents > 1 {
                warnings.push(Diagnostic::new(
                    codes::WARN_SHARED_REMOVAL,
                    format!("{path} is shared by {parents} containers and is removed from all of them"),
                ));
            }
            plan.push(Mutation::Delete { path: path.clone() });
        }
        Report::from_parts(plan, errors, warnings)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::args::ArgValue;
    use crate::node::DataGroup;

    #[test]
    fn nested_and_shared_paths_produce_warnings() {
        let mut g = Graph::new();
        let a = g.create(None, "a", DataGroup::new()).unwrap();
        let b = g.create(None, "b", DataGroup::new()).unwrap();
        let x = g.create(Some(a), "x", DataGroup::new()).unwrap();
        g.set_additional_parent(x, Some(b)).unwrap();
        let args = Arguments::new().with(
            DeleteData::REMOVED_PATHS,
            ArgValue::Paths(vec!["a/x".parse().unwrap(), "a".parse().unwrap(), "b/x".parse().unwrap()]),
        );
        let report = DeleteData.preflight(&g, &args);
        let plan = report.result.clone().unwrap();
        assert_eq!(plan.primary.len(), 2);
        let warned: Vec<i32> = report.warnings.iter().map(|d| d.code).collect();
        assert_eq!(
            warned,
            vec![codes::WARN_REDUNDANT_PATH, codes::WARN_SHARED_REMOVAL]
        );
    }

    #[test]
    fn unknown_path_is_an_error() {
        let g = Graph::new();
        let args = Arguments::new().with(
            DeleteData::REMOVED_PATHS,
            ArgValue::Paths(vec!["gone".parse().unwrap()]),
        );
        assert_eq!(
            DeleteData.preflight(&g, &args).errors()[0].code,
            codes::PATH_NOT_FOUND
        );
    }
}
