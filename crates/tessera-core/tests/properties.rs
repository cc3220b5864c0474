// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
mod common;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use std::collections::BTreeSet;

use tessera_core::io::{directory, packed, Directory, FactoryRegistry, Packed, ReadOptions};
use tessera_core::{
    DataArray, DataGroup, DataType, Graph, MeshGeom, MeshKind, MeshSlot, Node, NodeId,
};

// Pinned so failures reproduce across machines; override with PROPTEST_SEED.
const SEED_BYTES: [u8; 32] = [
    0x7e, 0x55, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0,
];

fn runner(cases: u32) -> TestRunner {
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    TestRunner::new_with_rng(
        PropConfig {
            cases,
            ..PropConfig::default()
        },
        rng,
    )
}

#[derive(Debug, Clone)]
enum Op {
    /// Create under the n-th live container (root when there is none).
    Create(usize),
    /// Remove the n-th live node.
    Remove(usize),
    /// Share the n-th live node into the m-th live container.
    Share(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<usize>().prop_map(Op::Create),
        1 => any::<usize>().prop_map(Op::Remove),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Share(a, b)),
    ]
}

fn pick(ids: &[NodeId], n: usize) -> Option<NodeId> {
    (!ids.is_empty()).then(|| ids[n % ids.len()])
}

#[test]
fn ids_are_never_reused() {
    runner(128)
        .run(&prop::collection::vec(op(), 1..64), |ops| {
            let mut g = Graph::new();
            let mut issued: Vec<NodeId> = Vec::new();
            for (step, op) in ops.into_iter().enumerate() {
                let before = g.next_id();
                match op {
                    Op::Create(n) => {
                        let parent = pick(&g.ids(), n);
                        let id = g
                            .create(parent, &format!("n{step}"), DataGroup::new())
                            .expect("fresh name under a group");
                        prop_assert_eq!(id, before);
                        prop_assert!(issued.iter().all(|old| *old < id));
                        issued.push(id);
                    }
                    Op::Remove(n) => {
                        if let Some(id) = pick(&g.ids(), n) {
                            prop_assert!(g.remove(id));
                        }
                    }
                    Op::Share(a, b) => {
                        let ids = g.ids();
                        if let (Some(node), Some(parent)) = (pick(&ids, a), pick(&ids, b)) {
                            // cycles and duplicate names are refused, never half-applied
                            let _ = g.set_additional_parent(node, Some(parent));
                        }
                    }
                }
                prop_assert!(g.next_id() >= before);
                prop_assert!(g.ids().iter().all(|id| *id < g.next_id()));
                prop_assert!(g.check_integrity().is_ok());
            }
            Ok(())
        })
        .expect("id allocation property");
}

fn dtype() -> impl Strategy<Value = DataType> {
    prop::sample::select(DataType::ALL.to_vec())
}

#[test]
fn deep_copy_is_independent_for_every_element_type() {
    runner(96)
        .run(&(dtype(), 1_usize..64, 0_usize..64), |(dtype, len, index)| {
            let index = index % len;
            let mut g = Graph::new();
            let id = g
                .create(
                    None,
                    "values",
                    DataArray::filled(dtype, vec![len], vec![1], 0.0).expect("valid shape"),
                )
                .expect("create");
            let copy = g.deep_copy();

            let array = g.get_as_mut::<DataArray>(id).expect("array");
            prop_assert!(array.set_f64(index, 1.0));

            let original = g.get_as::<DataArray>(id).and_then(DataArray::values).expect("values");
            let copied = copy.get_as::<DataArray>(id).and_then(DataArray::values).expect("values");
            prop_assert_eq!(original.get_f64(index), Some(1.0));
            prop_assert_eq!(copied.get_f64(index), Some(0.0));
            prop_assert_eq!(copied.len(), len);
            Ok(())
        })
        .expect("deep copy property");
}

#[derive(Debug, Clone)]
enum Build {
    /// Group under the n-th live container.
    Group(usize),
    /// Two-tuple array under the n-th live container.
    Array(usize, f64),
    /// Point mesh under the n-th container, referencing the m-th array.
    Mesh(usize, usize),
    /// Share the n-th live node into the m-th live container.
    Share(usize, usize),
    /// Remove the n-th live node.
    Remove(usize),
}

fn build() -> impl Strategy<Value = Build> {
    prop_oneof![
        2 => any::<usize>().prop_map(Build::Group),
        3 => (any::<usize>(), -1.0e6_f64..1.0e6).prop_map(|(p, v)| Build::Array(p, v)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(p, a)| Build::Mesh(p, a)),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(n, p)| Build::Share(n, p)),
        1 => any::<usize>().prop_map(Build::Remove),
    ]
}

fn random_graph(steps: Vec<Build>) -> Graph {
    let mut g = Graph::new();
    for (step, build) in steps.into_iter().enumerate() {
        let ids = g.ids();
        let containers: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| g.node(*id).and_then(Node::children).is_some())
            .collect();
        let arrays: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| g.get_as::<DataArray>(*id).is_some())
            .collect();
        let name = format!("n{step}");
        match build {
            Build::Group(p) => {
                g.create(pick(&containers, p), &name, DataGroup::new())
                    .expect("group");
            }
            Build::Array(p, value) => {
                let array = DataArray::new(vec![2], vec![1], vec![value, -value]).expect("shape");
                g.create(pick(&containers, p), &name, array).expect("array");
            }
            Build::Mesh(p, a) => {
                let mesh = g
                    .create(pick(&containers, p), &name, MeshGeom::new(MeshKind::Vertex))
                    .expect("mesh");
                if let Some(vertices) = pick(&arrays, a) {
                    g.set_mesh_reference(mesh, MeshSlot::Vertices, Some(vertices))
                        .expect("live array");
                }
            }
            Build::Share(n, p) => {
                if let (Some(node), Some(parent)) = (pick(&ids, n), pick(&containers, p)) {
                    // cycles and existing edges are refused
                    let _ = g.set_additional_parent(node, Some(parent));
                }
            }
            Build::Remove(n) => {
                if let Some(id) = pick(&ids, n) {
                    g.remove(id);
                }
            }
        }
    }
    g
}

/// Distinct parent-child edges reachable from the root.
fn reachable_edges(g: &Graph) -> usize {
    let mut expanded = BTreeSet::new();
    let mut edges = 0;
    g.walk(|_, node, _| {
        edges += 1;
        expanded.insert(node.id())
    });
    edges
}

#[test]
fn random_shared_graphs_survive_both_back_ends() {
    let packed_reg = FactoryRegistry::<Packed>::builtin();
    let dir_reg = FactoryRegistry::<Directory>::builtin();
    runner(48)
        .run(&prop::collection::vec(build(), 1..32), |steps| {
            let g = random_graph(steps);
            prop_assert!(g.check_integrity().is_ok());
            let nodes = g.len();
            let edges = reachable_edges(&g);
            let parent_edges: usize = g
                .ids()
                .iter()
                .filter_map(|id| g.node(*id))
                .map(Node::parent_count)
                .sum();
            prop_assert_eq!(edges, parent_edges);

            let (bytes, summary) = packed::to_bytes(&g, &packed_reg).expect("encode");
            prop_assert_eq!(summary.payloads, nodes);
            prop_assert_eq!(summary.edges, edges);
            let back = packed::from_bytes(bytes, &packed_reg, ReadOptions::default()).expect("decode");
            common::assert_same_graph(&g, &back);

            let tmp = tempfile::tempdir().expect("tempdir");
            let store = tmp.path().join("store");
            let summary = directory::write_dir(&g, &dir_reg, &store).expect("write store");
            prop_assert_eq!(summary.payloads, nodes);
            prop_assert_eq!(summary.edges, edges);
            let back = directory::read_dir(&store, &dir_reg, ReadOptions::default()).expect("read store");
            common::assert_same_graph(&g, &back);
            Ok(())
        })
        .expect("round trip property");
}
