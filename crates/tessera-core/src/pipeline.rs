// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered filter pipelines.
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::args::Arguments;
use crate::config::{ConfigError, CoreConfig};
use crate::diagnostic::{codes, Diagnostic, Diagnostics, Report};
use crate::filter::{execute_filter, preflight_filter, CancelToken, ExecContext, ProgressSink};
use crate::filters::FilterRegistry;
use crate::graph::Graph;
use crate::mutation::ApplyMode;

/// One pipeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Registered filter name.
    pub filter: String,
    /// Overrides for the filter's default arguments.
    #[serde(default)]
    pub arguments: Arguments,
}

/// Ordered list of filter invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<PipelineStep>,
}

fn tag(index: usize, step: &PipelineStep, diags: Diagnostics) -> Diagnostics {
    let prefix = format!("step {index} ({}): ", step.filter);
    diags.iter().map(|d| d.prefixed(&prefix)).collect()
}

impl Pipeline {
    /// Empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, filter: &str, arguments: Arguments) -> Self {
        self.steps.push(PipelineStep {
            filter: filter.to_owned(),
            arguments,
        });
        self
    }

    /// Loads a pipeline from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the pipeline as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Validates every step against a working copy of `graph`.
    ///
    /// Each step's mutations are applied to the copy in preflight mode so
    /// later steps see the structure earlier steps produce. Diagnostics are
    /// prefixed with the step index. Every step is checked even after an
    /// earlier one failed, so one run reports as much as possible.
    pub fn preflight(&self, graph: &Graph, registry: &FilterRegistry) -> Report<Graph> {
        let mut working = graph.deep_copy();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            let Some(filter) = registry.get(&step.filter) else {
                errors.push(Diagnostic::new(
                    codes::UNKNOWN_FILTER,
                    format!("step {index}: no filter named {:?}", step.filter),
                ));
                continue;
            };
            let report = preflight_filter(filter, &working, &step.arguments);
            warnings.extend(tag(index, step, report.warnings));
            match report.result {
                Ok(plan) => {
                    let applied = plan
                        .apply_primary(&mut working, ApplyMode::Preflight)
                        .and_then(|()| plan.apply_deferred(&mut working, ApplyMode::Preflight));
                    if let Err(d) = applied {
                        errors.extend(tag(index, step, vec![d]));
                    }
                }
                Err(found) => errors.extend(tag(index, step, found)),
            }
        }
        Report::from_parts(working, errors, warnings)
    }

    /// Runs every step against `graph`, stopping at the first failure.
    ///
    /// A failed run leaves the graph as the failing step left it; callers
    /// needing atomicity run against a [`Graph::deep_copy`].
    pub fn execute(
        &self,
        graph: &mut Graph,
        registry: &FilterRegistry,
        config: &CoreConfig,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Report<()> {
        let mut warnings = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(pipeline = %self.name, step = index, "pipeline cancelled");
                return Report::fail(vec![Diagnostic::new(
                    codes::CANCELLED,
                    format!("cancelled before step {index}"),
                )])
                .with_warnings(warnings);
            }
            let Some(filter) = registry.get(&step.filter) else {
                return Report::fail(vec![Diagnostic::new(
                    codes::UNKNOWN_FILTER,
                    format!("step {index}: no filter named {:?}", step.filter),
                )])
                .with_warnings(warnings);
            };
            let ctx = ExecContext::new(filter.name(), cancel, progress)
                .with_interval(config.progress_interval())
                .with_workers(config.workers);
            let report = execute_filter(filter, graph, &step.arguments, &ctx);
            warnings.extend(tag(index, step, report.warnings));
            if let Err(errors) = report.result {
                return Report::fail(tag(index, step, errors)).with_warnings(warnings);
            }
            info!(pipeline = %self.name, step = index, filter = filter.name(), "step complete");
        }
        Report::ok(()).with_warnings(warnings)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::args::ArgValue;
    use crate::filter::NullProgress;
    use crate::node::DataType;

    fn create(path: &str) -> Arguments {
        Arguments::new()
            .with("output_path", ArgValue::Path(path.parse().unwrap()))
            .with("tuple_shape", ArgValue::Shape(vec![4]))
            .with("data_type", ArgValue::DataType(DataType::Int32))
    }

    fn pipeline() -> Pipeline {
        Pipeline::new("demo")
            .step("CreateDataGroup", Arguments::new().with("output_path", ArgValue::Path("g".parse().unwrap())))
            .step("CreateDataArray", create("g/a"))
            .step(
                "RenameData",
                Arguments::new()
                    .with("source_path", ArgValue::Path("g/a".parse().unwrap()))
                    .with("new_name", ArgValue::Text("b".into())),
            )
    }

    #[test]
    fn later_steps_see_earlier_outputs() {
        let g = Graph::new();
        let report = pipeline().preflight(&g, &FilterRegistry::with_builtin());
        let working = report.result.unwrap();
        assert!(working.find(&"g/b".parse().unwrap()).is_some());
        assert!(g.is_empty());
    }

    #[test]
    fn preflight_tags_errors_with_the_step() {
        let g = Graph::new();
        let p = Pipeline::new("bad")
            .step("CreateDataArray", create("missing/a"))
            .step("Nope", Arguments::new());
        let report = p.preflight(&g, &FilterRegistry::with_builtin());
        let errors = report.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.starts_with("step 0 (CreateDataArray): "));
        assert_eq!(errors[1].code, codes::UNKNOWN_FILTER);
    }

    #[test]
    fn execute_runs_every_step() {
        let mut g = Graph::new();
        let cancel = CancelToken::new();
        let report = pipeline().execute(
            &mut g,
            &FilterRegistry::with_builtin(),
            &CoreConfig::default(),
            &cancel,
            &NullProgress,
        );
        assert!(report.is_ok(), "{:?}", report.errors());
        let id = g.find(&"g/b".parse().unwrap()).unwrap();
        let array = g.get_as::<crate::node::DataArray>(id).unwrap();
        assert!(array.is_allocated());
    }

    #[test]
    fn json_round_trip() {
        let p = pipeline();
        let json = serde_json::to_string(&p).unwrap();
        let back: Pipeline = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
