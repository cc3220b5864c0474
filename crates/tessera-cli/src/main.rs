// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tessera CLI
//!
//! Inspects persisted graphs without reading payloads, converts between the
//! packed and directory back ends, and runs JSON pipelines.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use tessera_core::io::{directory, packed, Directory, FactoryRegistry, Packed, ReadOptions, WriteSummary};
use tessera_core::{
    BackendKind, CancelToken, CoreConfig, FilterRegistry, Graph, NodeKind, Pipeline,
    ProgressMessage,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect, convert and run pipelines over Tessera graphs")]
struct Args {
    /// Config file (defaults to the platform config dir's tessera/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the structure of a stored graph (payloads are not read)
    Inspect {
        /// Packed file or directory store
        store: PathBuf,
        /// Back end; detected from the path when omitted
        #[arg(long, value_enum)]
        backend: Option<Format>,
    },
    /// Copy a stored graph into the other (or the same) back end
    Convert {
        /// Source store
        input: PathBuf,
        /// Destination store
        output: PathBuf,
        /// Source back end; detected when omitted
        #[arg(long, value_enum)]
        from: Option<Format>,
        /// Destination back end; config default when omitted
        #[arg(long, value_enum)]
        to: Option<Format>,
    },
    /// Preflight and execute a pipeline file
    Run {
        /// Pipeline JSON
        pipeline: PathBuf,
        /// Graph to start from; empty when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where to store the result
        #[arg(long)]
        output: Option<PathBuf>,
        /// Back end for the output; config default when omitted
        #[arg(long, value_enum)]
        backend: Option<Format>,
        /// Stop after preflight
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Packed,
    Directory,
}

impl From<Format> for BackendKind {
    fn from(f: Format) -> Self {
        match f {
            Format::Packed => Self::Packed,
            Format::Directory => Self::Directory,
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<CoreConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match ProjectDirs::from("dev", "flyingrobots", "tessera") {
            Some(dirs) => dirs.config_dir().join("config.json"),
            None => {
                warn!("could not resolve config dir; using defaults");
                return Ok(CoreConfig::default());
            }
        },
    };
    CoreConfig::load(&path).with_context(|| format!("load config {}", path.display()))
}

/// Explicit choice, else what an existing path looks like, else `fallback`.
fn backend_for(path: &Path, explicit: Option<Format>, fallback: BackendKind) -> BackendKind {
    if let Some(f) = explicit {
        return f.into();
    }
    if path.is_dir() {
        BackendKind::Directory
    } else if path.is_file() {
        BackendKind::Packed
    } else {
        fallback
    }
}

fn read_store(path: &Path, kind: BackendKind, options: ReadOptions) -> Result<Graph> {
    let graph = match kind {
        BackendKind::Packed => packed::read_file(path, &FactoryRegistry::<Packed>::builtin(), options),
        BackendKind::Directory => {
            directory::read_dir(path, &FactoryRegistry::<Directory>::builtin(), options)
        }
    };
    graph.with_context(|| format!("read {}", path.display()))
}

fn write_store(graph: &Graph, path: &Path, kind: BackendKind) -> Result<WriteSummary> {
    let summary = match kind {
        BackendKind::Packed => packed::write_file(graph, &FactoryRegistry::<Packed>::builtin(), path),
        BackendKind::Directory => {
            directory::write_dir(graph, &FactoryRegistry::<Directory>::builtin(), path)
        }
    };
    summary.with_context(|| format!("write {}", path.display()))
}

fn describe(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Array(a) => format!(
            "{} tuples={:?} components={:?}",
            a.dtype(),
            a.tuple_shape(),
            a.component_shape()
        ),
        NodeKind::AttributeMatrix(m) => format!("tuples={:?}", m.tuple_shape()),
        NodeKind::Strings(s) => format!("tuples={}", s.num_tuples()),
        NodeKind::Scalar(s) => format!("{} = {}", s.dtype(), s.as_f64()),
        NodeKind::Image(i) => format!("dims={:?}", i.dimensions()),
        NodeKind::Mesh(m) => {
            let refs: Vec<String> = m
                .references()
                .map(|(slot, id)| format!("{slot:?}={id}"))
                .collect();
            refs.join(" ")
        }
        NodeKind::Group(_) => String::new(),
    }
}

fn render_tree(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "next id {}, {} nodes", graph.next_id(), graph.len());
    graph.walk(|_, node, depth| {
        let shared = if node.parent_count() > 1 {
            format!(" (shared by {})", node.parent_count())
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{:indent$}{} {} [{}] {}{shared}",
            "",
            node.name(),
            node.id(),
            node.type_name(),
            describe(node.kind()),
            indent = depth * 2
        );
        true
    });
    out
}

fn run_pipeline(
    config: &CoreConfig,
    pipeline_path: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
    backend: Option<Format>,
    dry_run: bool,
) -> Result<()> {
    let pipeline = Pipeline::load(pipeline_path)
        .with_context(|| format!("load pipeline {}", pipeline_path.display()))?;
    let mut graph = match input {
        Some(path) => read_store(
            path,
            backend_for(path, None, config.default_backend),
            ReadOptions::from_config(config),
        )?,
        None => Graph::new(),
    };
    let filters = FilterRegistry::with_builtin();

    let report = pipeline.preflight(&graph, &filters);
    for w in &report.warnings {
        warn!(code = w.code, "{}", w.message);
    }
    if let Err(errors) = report.result {
        for e in &errors {
            tracing::error!(code = e.code, "{}", e.message);
        }
        bail!("preflight failed with {} error(s)", errors.len());
    }
    if dry_run {
        info!(steps = pipeline.steps.len(), "preflight ok");
        return Ok(());
    }

    let cancel = CancelToken::new();
    let progress = |m: &ProgressMessage| info!(filter = %m.filter, "{}", m.text);
    let report = pipeline.execute(&mut graph, &filters, config, &cancel, &progress);
    if let Err(errors) = report.result {
        for e in &errors {
            tracing::error!(code = e.code, "{}", e.message);
        }
        bail!("execution failed with {} error(s)", errors.len());
    }
    if let Some(path) = output {
        let kind = backend_for(path, backend, config.default_backend);
        let summary = write_store(&graph, path, kind)?;
        info!(payloads = summary.payloads, edges = summary.edges, "result written");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config(args.config.as_deref())?;

    match args.cmd {
        Command::Inspect { store, backend } => {
            let kind = backend_for(&store, backend, config.default_backend);
            let graph = read_store(&store, kind, ReadOptions::preflight())?;
            print!("{}", render_tree(&graph));
        }
        Command::Convert {
            input,
            output,
            from,
            to,
        } => {
            let graph = read_store(
                &input,
                backend_for(&input, from, config.default_backend),
                ReadOptions::from_config(&config),
            )?;
            let kind = to.map_or(config.default_backend, BackendKind::from);
            let summary = write_store(&graph, &output, kind)?;
            info!(
                nodes = graph.len(),
                payloads = summary.payloads,
                edges = summary.edges,
                "converted"
            );
        }
        Command::Run {
            pipeline,
            input,
            output,
            backend,
            dry_run,
        } => run_pipeline(
            &config,
            &pipeline,
            input.as_deref(),
            output.as_deref(),
            backend,
            dry_run,
        )?,
    }

    Ok(())
}
