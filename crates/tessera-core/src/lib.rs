// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! tessera-core: ID-addressed data graph for pipeline filters.
//!
//! A [`Graph`] is an arena of typed [`Node`]s addressed by monotonically
//! allocated [`NodeId`]s. Composite nodes hold a [`Container`] of child ids
//! and a node may sit in several containers at once, so the structure is a
//! DAG rather than a tree.
//!
//! Changes flow through the two-phase [`Filter`] contract: preflight
//! validates and describes the change as a [`MutationPlan`], execute applies
//! it. Graphs persist through the [`io`] module to either of two back ends,
//! with shared nodes written once and linked elsewhere.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

/// Typed argument bags handed to filters.
pub mod args;
/// Runtime configuration.
pub mod config;
mod container;
/// Numeric-code diagnostics and reports.
pub mod diagnostic;
pub mod filter;
/// Built-in filters and the name registry.
pub mod filters;
mod graph;
mod ident;
pub mod io;
pub mod mutation;
/// Node payload types.
pub mod node;
pub mod parallel;
pub mod pipeline;

pub use args::{ArgValue, ArgumentError, Arguments};
pub use config::{BackendKind, ConfigError, CoreConfig};
pub use container::Container;
pub use diagnostic::{codes, Diagnostic, Diagnostics, Report};
pub use filter::{
    execute_filter, preflight_filter, CancelToken, ExecContext, Filter, NullProgress,
    ProgressMessage, ProgressSink,
};
pub use filters::FilterRegistry;
pub use graph::{Graph, GraphError};
pub use ident::{validate_name, DataPath, NodeId, PathError};
pub use mutation::{ApplyMode, Mutation, MutationPlan};
pub use node::{
    checked_product, element_count, ArrayValues, AttributeMatrix, DataArray, DataGroup, DataType,
    Element, ImageGeom, MeshGeom, MeshKind, MeshSlot, Node, NodeKind, NodeVariant, ScalarData,
    ShapeError, StringArray,
};
pub use parallel::parallel_for_chunks;
pub use pipeline::{Pipeline, PipelineStep};
