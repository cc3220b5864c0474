// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
mod common;

use std::path::Path;

use common::{assert_same_graph, assert_same_structure, path, sample_graph, SAMPLE_EDGES, SAMPLE_NODES};
use tessera_core::io::packed::PackedImage;
use tessera_core::io::{directory, packed, Directory, FactoryRegistry, Packed, ReadOptions};
use tessera_core::{DataArray, Graph, MeshGeom, MeshSlot, ScalarData, StringArray};

fn packed_round_trip(graph: &Graph, options: ReadOptions) -> Graph {
    let reg = FactoryRegistry::<Packed>::builtin();
    let (bytes, _) = packed::to_bytes(graph, &reg).expect("encode");
    packed::from_bytes(bytes, &reg, options).expect("decode")
}

fn dir_payload(root: &Path, rel: &str) -> Vec<u8> {
    std::fs::read(root.join(rel).join(directory::PAYLOAD)).expect("payload file")
}

#[test]
fn packed_write_counts_every_node_once_and_every_edge() {
    let reg = FactoryRegistry::<Packed>::builtin();
    let (_, summary) = packed::to_bytes(&sample_graph(), &reg).unwrap();
    assert_eq!(summary.payloads, SAMPLE_NODES);
    assert_eq!(summary.edges, SAMPLE_EDGES);
}

#[test]
fn directory_write_counts_match_packed() {
    let tmp = tempfile::tempdir().unwrap();
    let reg = FactoryRegistry::<Directory>::builtin();
    let summary = directory::write_dir(&sample_graph(), &reg, &tmp.path().join("store")).unwrap();
    assert_eq!(summary.payloads, SAMPLE_NODES);
    assert_eq!(summary.edges, SAMPLE_EDGES);
}

#[test]
fn packed_round_trip_is_isomorphic() {
    let g = sample_graph();
    let back = packed_round_trip(&g, ReadOptions::default());
    assert_same_graph(&g, &back);
    assert_eq!(back.len(), SAMPLE_NODES);
}

#[test]
fn packed_file_round_trip_is_isomorphic() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("graph.tsr");
    let g = sample_graph();
    let reg = FactoryRegistry::<Packed>::builtin();
    packed::write_file(&g, &reg, &file).unwrap();
    let back = packed::read_file(&file, &reg, ReadOptions::default()).unwrap();
    assert_same_graph(&g, &back);
}

#[test]
fn directory_round_trip_is_isomorphic() {
    let tmp = tempfile::tempdir().unwrap();
    let store = tmp.path().join("store");
    let g = sample_graph();
    let reg = FactoryRegistry::<Directory>::builtin();
    directory::write_dir(&g, &reg, &store).unwrap();
    let back = directory::read_dir(&store, &reg, ReadOptions::default()).unwrap();
    assert_same_graph(&g, &back);
}

#[test]
fn shared_nodes_keep_their_id_and_both_parents() {
    let back = packed_round_trip(&sample_graph(), ReadOptions::default());
    let phases = back.find(&path("Image/Cell Data/Phases")).unwrap();
    assert_eq!(back.find(&path("Meta/Phases")), Some(phases));
    assert_eq!(back.node(phases).unwrap().parent_count(), 2);

    let vertices = back.find(&path("Mesh/Vertices")).unwrap();
    assert_eq!(back.find(&path("Points/Vertices")), Some(vertices));
    let points = back.find(&path("Points")).unwrap();
    let mesh = back.find(&path("Mesh")).unwrap();
    let faces = back.find(&path("Mesh/Faces")).unwrap();
    assert_eq!(
        back.get_as::<MeshGeom>(points).unwrap().reference(MeshSlot::Vertices),
        Some(vertices)
    );
    let tri = back.get_as::<MeshGeom>(mesh).unwrap();
    assert_eq!(tri.reference(MeshSlot::Vertices), Some(vertices));
    assert_eq!(tri.reference(MeshSlot::Faces), Some(faces));
    assert_eq!(tri.reference(MeshSlot::Edges), None);
}

#[test]
fn packed_payload_bytes_survive_a_second_write() {
    let reg = FactoryRegistry::<Packed>::builtin();
    let (first, _) = packed::to_bytes(&sample_graph(), &reg).unwrap();
    let back = packed::from_bytes(first.clone(), &reg, ReadOptions::default()).unwrap();
    let (second, _) = packed::to_bytes(&back, &reg).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        PackedImage::decode(&first).unwrap().blobs,
        PackedImage::decode(&second).unwrap().blobs
    );
}

#[test]
fn directory_payload_files_are_byte_identical_after_rewrite() {
    let tmp = tempfile::tempdir().unwrap();
    let (a, b) = (tmp.path().join("a"), tmp.path().join("b"));
    let reg = FactoryRegistry::<Directory>::builtin();
    directory::write_dir(&sample_graph(), &reg, &a).unwrap();
    let back = directory::read_dir(&a, &reg, ReadOptions::default()).unwrap();
    directory::write_dir(&back, &reg, &b).unwrap();
    for rel in [
        "Image/Cell Data/Phases",
        "Image/Cell Data/Euler",
        "Mesh/Vertices",
        "Mesh/Faces",
        "Meta/Names",
        "Meta/Flag",
    ] {
        assert_eq!(dir_payload(&a, rel), dir_payload(&b, rel), "{rel}");
    }
    // little-endian i32 on disk, whatever the host
    assert_eq!(
        &dir_payload(&a, "Image/Cell Data/Phases")[8..12],
        &(-3_i32).to_le_bytes()
    );
    // shared arrays are stored once
    assert!(!a.join("Meta/Phases").exists());
    assert!(!a.join("Points/Vertices").exists());
}

#[test]
fn converting_between_back_ends_preserves_the_graph() {
    let tmp = tempfile::tempdir().unwrap();
    let store = tmp.path().join("store");
    let g = sample_graph();
    let from_packed = packed_round_trip(&g, ReadOptions::default());
    directory::write_dir(&from_packed, &FactoryRegistry::<Directory>::builtin(), &store).unwrap();
    let from_dir =
        directory::read_dir(&store, &FactoryRegistry::<Directory>::builtin(), ReadOptions::default())
            .unwrap();
    let again = packed_round_trip(&from_dir, ReadOptions::default());
    assert_same_graph(&g, &again);
}

#[test]
fn preflight_read_builds_structure_without_payloads() {
    let g = sample_graph();
    let shape = packed_round_trip(&g, ReadOptions::preflight());
    assert_same_structure(&g, &shape);

    let euler = shape.find(&path("Image/Cell Data/Euler")).unwrap();
    let array = shape.get_as::<DataArray>(euler).unwrap();
    assert!(!array.is_allocated());
    assert_eq!(array.tuple_shape(), &[4]);
    assert_eq!(array.component_shape(), &[3]);

    let names = shape.find(&path("Meta/Names")).unwrap();
    let strings = shape.get_as::<StringArray>(names).unwrap();
    assert_eq!(strings.num_tuples(), 3);
    assert!(strings.values().is_none());

    let count = shape.find(&path("Meta/Count")).unwrap();
    assert_eq!(shape.get_as::<ScalarData>(count).unwrap().get::<u64>(), Some(u64::MAX));
}

#[test]
fn directory_preflight_ignores_missing_payload_files() {
    let tmp = tempfile::tempdir().unwrap();
    let store = tmp.path().join("store");
    let reg = FactoryRegistry::<Directory>::builtin();
    let g = sample_graph();
    directory::write_dir(&g, &reg, &store).unwrap();
    std::fs::remove_file(store.join("Mesh/Vertices").join(directory::PAYLOAD)).unwrap();

    let shape = directory::read_dir(&store, &reg, ReadOptions::preflight()).unwrap();
    assert_same_structure(&g, &shape);
    let err = directory::read_dir(&store, &reg, ReadOptions::default()).unwrap_err();
    assert_eq!(err.code(), -6040, "{err}");
}

#[test]
fn non_importable_nodes_are_skipped_on_read() {
    let mut g = sample_graph();
    let vertices = g.find(&path("Mesh/Vertices")).unwrap();
    g.set_importable(vertices, false).unwrap();
    let back = packed_round_trip(&g, ReadOptions::default());
    assert!(!back.contains(vertices));
    assert!(back.find(&path("Points/Vertices")).is_none());
    let mesh = back.find(&path("Mesh")).unwrap();
    assert_eq!(
        back.get_as::<MeshGeom>(mesh).unwrap().reference(MeshSlot::Vertices),
        None
    );
    back.check_integrity().unwrap();
    // the allocator still covers the skipped id
    assert_eq!(back.next_id(), g.next_id());
}
