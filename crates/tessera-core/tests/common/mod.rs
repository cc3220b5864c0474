// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use tessera_core::{
    AttributeMatrix, DataArray, DataGroup, DataPath, Graph, ImageGeom, MeshGeom, MeshKind,
    MeshSlot, NodeId, ScalarData, StringArray,
};

/// Parses a path literal.
pub fn path(s: &str) -> DataPath {
    s.parse().expect("valid path literal")
}

/// Graph exercising every node type, two shared arrays and mesh references.
///
/// ```text
/// Image (ImageGeom 2x2x1)
///   Cell Data (AttributeMatrix [4])
///     Phases  i32 [4]x[1]        also under Meta
///     Euler   f32 [4]x[3]
/// Mesh (TriangleGeom)
///   Vertices f64 [3]x[3]         also under Points
///   Faces    u64 [1]x[3]
/// Points (VertexGeom)
/// Meta (DataGroup)
///   Names  strings
///   Count  u64 scalar
///   Flag   bool [2]x[1]
/// ```
pub fn sample_graph() -> Graph {
    let mut g = Graph::new();
    let image = g
        .create(
            None,
            "Image",
            ImageGeom::with_frame([2, 2, 1], [0.0, 0.0, 0.0], [0.5, 0.5, 1.0]).unwrap(),
        )
        .unwrap();
    let cells = g
        .create(Some(image), "Cell Data", AttributeMatrix::new(vec![4]).unwrap())
        .unwrap();
    let phases = g
        .create(
            Some(cells),
            "Phases",
            DataArray::new(vec![4], vec![1], vec![1_i32, 2, -3, i32::MAX]).unwrap(),
        )
        .unwrap();
    let euler: Vec<f32> = (0..12_u8).map(|i| f32::from(i) * 0.25).collect();
    g.create(Some(cells), "Euler", DataArray::new(vec![4], vec![3], euler).unwrap())
        .unwrap();

    let mesh = g
        .create(None, "Mesh", MeshGeom::new(MeshKind::Triangle))
        .unwrap();
    let vertices = g
        .create(
            Some(mesh),
            "Vertices",
            DataArray::new(
                vec![3],
                vec![3],
                vec![0.0_f64, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            )
            .unwrap(),
        )
        .unwrap();
    let faces = g
        .create(
            Some(mesh),
            "Faces",
            DataArray::new(vec![1], vec![3], vec![0_u64, 1, 2]).unwrap(),
        )
        .unwrap();
    g.set_mesh_reference(mesh, MeshSlot::Vertices, Some(vertices))
        .unwrap();
    g.set_mesh_reference(mesh, MeshSlot::Faces, Some(faces))
        .unwrap();

    let points = g
        .create(None, "Points", MeshGeom::new(MeshKind::Vertex))
        .unwrap();
    g.set_additional_parent(vertices, Some(points)).unwrap();
    g.set_mesh_reference(points, MeshSlot::Vertices, Some(vertices))
        .unwrap();

    let meta = g.create(None, "Meta", DataGroup::new()).unwrap();
    g.create(
        Some(meta),
        "Names",
        StringArray::new(vec!["alpha".into(), String::new(), "γ".into()]),
    )
    .unwrap();
    g.create(Some(meta), "Count", ScalarData::new(u64::MAX))
        .unwrap();
    g.create(
        Some(meta),
        "Flag",
        DataArray::new(vec![2], vec![1], vec![true, false]).unwrap(),
    )
    .unwrap();
    g.set_additional_parent(phases, Some(meta)).unwrap();
    g
}

/// Nodes in [`sample_graph`].
pub const SAMPLE_NODES: usize = 12;
/// Parent-child edges in [`sample_graph`], root edges included.
pub const SAMPLE_EDGES: usize = 14;

/// Asserts two graphs hold the same ids, edges, names, values and allocator.
pub fn assert_same_graph(left: &Graph, right: &Graph) {
    assert_eq!(left.next_id(), right.next_id(), "allocator differs");
    assert_eq!(left.root(), right.root(), "root container differs");
    assert_eq!(left.ids(), right.ids(), "id sets differ");
    for id in left.ids() {
        assert_eq!(left.node(id), right.node(id), "node {id} differs");
    }
}

/// Asserts two graphs agree on everything except array payloads.
pub fn assert_same_structure(left: &Graph, right: &Graph) {
    assert_eq!(left.next_id(), right.next_id(), "allocator differs");
    assert_eq!(left.root(), right.root(), "root container differs");
    assert_eq!(left.ids(), right.ids(), "id sets differ");
    for id in left.ids() {
        let (a, b) = (left.node(id).unwrap(), right.node(id).unwrap());
        assert_eq!(a.name(), b.name(), "name of {id}");
        assert_eq!(a.type_name(), b.type_name(), "type of {id}");
        assert_eq!(
            a.parents().collect::<Vec<NodeId>>(),
            b.parents().collect::<Vec<NodeId>>(),
            "parents of {id}"
        );
        assert_eq!(a.children(), b.children(), "children of {id}");
        assert_eq!(a.kind().num_tuples(), b.kind().num_tuples(), "tuples of {id}");
    }
}
