// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Built-in factories, one per node type. They only speak [`EntryRead`] and
//! [`GroupWrite`], so both back ends share them.
use super::factory::NodeFactory;
use super::reader::ReadContext;
use super::writer::WriteContext;
use super::{attrs, display_location, AttrMap, AttrValue, Backend, EntryRead, GroupWrite, IoError};
use crate::ident::{DataPath, NodeId};
use crate::node::{
    element_count, ArrayValues, AttributeMatrix, DataArray, DataGroup, DataType, ImageGeom,
    MeshGeom, MeshKind, MeshSlot, Node, NodeKind, ScalarData, ShapeError, StringArray,
};

fn shape_attr(shape: &[usize]) -> AttrValue {
    AttrValue::U64List(shape.iter().map(|&n| n as u64).collect())
}

fn wrong_kind(node: &Node, expected: &str) -> IoError {
    IoError::Encode(format!(
        "node {} is a {}, not a {expected}",
        node.id(),
        node.type_name()
    ))
}

fn malformed(path: &DataPath, err: &ShapeError) -> IoError {
    IoError::Malformed {
        what: display_location(path),
        reason: err.to_string(),
    }
}

fn expect_group(entry: &dyn EntryRead, group: bool) -> Result<(), IoError> {
    if entry.is_group() == group {
        return Ok(());
    }
    Err(IoError::Malformed {
        what: display_location(entry.path()),
        reason: if group { "expected a group" } else { "expected a dataset" }.into(),
    })
}

fn data_type(entry: &dyn EntryRead) -> Result<DataType, IoError> {
    entry
        .attr_str(attrs::DATA_TYPE)?
        .parse()
        .map_err(|e: crate::node::UnknownDataType| IoError::attr(entry.path(), attrs::DATA_TYPE, e.to_string()))
}

/// Writes a group with `attrs`, then `node`'s children into it.
fn write_composite<B: Backend>(
    ctx: &mut WriteContext<'_, B>,
    node: &Node,
    parent: &mut dyn GroupWrite,
    attrs: AttrMap,
) -> Result<(), IoError> {
    let mut group = parent.create_group(node.name(), attrs)?;
    ctx.write_children(node, group.as_mut())?;
    group.finish()
}

/// Inserts a composite node and reads its children.
fn read_composite<B: Backend>(
    ctx: &mut ReadContext<'_, B>,
    entry: &dyn EntryRead,
    parent: Option<NodeId>,
    id: NodeId,
    kind: NodeKind,
) -> Result<(), IoError> {
    expect_group(entry, true)?;
    ctx.insert(entry, parent, id, kind)?;
    ctx.read_children(entry, Some(id))
}

pub(crate) struct GroupFactory;

impl<B: Backend> NodeFactory<B> for GroupFactory {
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError> {
        read_composite(ctx, entry, parent, id, DataGroup::new().into())
    }

    fn write(&self, ctx: &mut WriteContext<'_, B>, node: &Node, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let attrs = ctx.object_attrs(node);
        write_composite(ctx, node, parent, attrs)
    }
}

pub(crate) struct AttributeMatrixFactory;

impl<B: Backend> NodeFactory<B> for AttributeMatrixFactory {
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError> {
        let shape = entry.attr_shape(attrs::TUPLE_SHAPE)?;
        let matrix =
            AttributeMatrix::new(shape).map_err(|e| IoError::attr(entry.path(), attrs::TUPLE_SHAPE, e.to_string()))?;
        read_composite(ctx, entry, parent, id, matrix.into())
    }

    fn write(&self, ctx: &mut WriteContext<'_, B>, node: &Node, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let NodeKind::AttributeMatrix(matrix) = node.kind() else {
            return Err(wrong_kind(node, "AttributeMatrix"));
        };
        let mut attrs = ctx.object_attrs(node);
        attrs.insert(attrs::TUPLE_SHAPE.into(), shape_attr(matrix.tuple_shape()));
        write_composite(ctx, node, parent, attrs)
    }
}

pub(crate) struct ArrayFactory;

impl<B: Backend> NodeFactory<B> for ArrayFactory {
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError> {
        expect_group(entry, false)?;
        let dtype = data_type(entry)?;
        let tuples = entry.attr_shape(attrs::TUPLE_SHAPE)?;
        let components = entry.attr_shape(attrs::COMPONENT_SHAPE)?;
        let elements = element_count(dtype, &tuples, &components)
            .map_err(|e| IoError::attr(entry.path(), attrs::TUPLE_SHAPE, e.to_string()))?;
        let expected = (elements * dtype.byte_size()) as u64;
        if entry.payload_len() != expected {
            return Err(IoError::attr(
                entry.path(),
                attrs::TUPLE_SHAPE,
                format!("shape needs {expected} bytes, payload records {}", entry.payload_len()),
            ));
        }
        let array = if ctx.is_preflight() {
            DataArray::shape_only(dtype, tuples, components)
        } else {
            let bytes = entry.read_payload()?;
            let values = ArrayValues::from_le_bytes(dtype, &bytes).map_err(|e| malformed(entry.path(), &e))?;
            DataArray::from_values(tuples, components, values)
        }
        .map_err(|e| malformed(entry.path(), &e))?;
        ctx.insert(entry, parent, id, array.into())
    }

    fn write(&self, ctx: &mut WriteContext<'_, B>, node: &Node, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let NodeKind::Array(array) = node.kind() else {
            return Err(wrong_kind(node, "DataArray"));
        };
        let Some(values) = array.values() else {
            return Err(IoError::Encode(format!(
                "array {} ({}) has no payload",
                node.name(),
                node.id()
            )));
        };
        let mut attrs = ctx.object_attrs(node);
        attrs.insert(attrs::DATA_TYPE.into(), AttrValue::Str(array.dtype().name().into()));
        attrs.insert(attrs::TUPLE_SHAPE.into(), shape_attr(array.tuple_shape()));
        attrs.insert(attrs::COMPONENT_SHAPE.into(), shape_attr(array.component_shape()));
        parent.write_dataset(node.name(), attrs, &values.to_le_bytes())
    }
}

pub(crate) struct StringArrayFactory;

impl<B: Backend> NodeFactory<B> for StringArrayFactory {
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError> {
        expect_group(entry, false)?;
        let count = usize::try_from(entry.attr_u64(attrs::TUPLE_COUNT)?)
            .map_err(|_| IoError::attr(entry.path(), attrs::TUPLE_COUNT, "count exceeds usize"))?;
        let strings = if ctx.is_preflight() {
            StringArray::shape_only(count)
        } else {
            let values = StringArray::decode(&entry.read_payload()?).map_err(|e| malformed(entry.path(), &e))?;
            if values.len() != count {
                return Err(IoError::attr(
                    entry.path(),
                    attrs::TUPLE_COUNT,
                    format!("records {count} strings, payload holds {}", values.len()),
                ));
            }
            StringArray::new(values)
        };
        ctx.insert(entry, parent, id, strings.into())
    }

    fn write(&self, ctx: &mut WriteContext<'_, B>, node: &Node, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let NodeKind::Strings(strings) = node.kind() else {
            return Err(wrong_kind(node, "StringArray"));
        };
        let Some(values) = strings.values() else {
            return Err(IoError::Encode(format!(
                "string array {} ({}) has no payload",
                node.name(),
                node.id()
            )));
        };
        let mut attrs = ctx.object_attrs(node);
        attrs.insert(attrs::TUPLE_COUNT.into(), AttrValue::U64(strings.num_tuples() as u64));
        parent.write_dataset(node.name(), attrs, &StringArray::encode(values))
    }
}

/// Scalars keep their value in an attribute so preflight reads see it.
pub(crate) struct ScalarFactory;

impl<B: Backend> NodeFactory<B> for ScalarFactory {
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError> {
        expect_group(entry, false)?;
        let dtype = data_type(entry)?;
        let Some(AttrValue::Bytes(bytes)) = entry.attr(attrs::VALUE) else {
            return Err(IoError::attr(entry.path(), attrs::VALUE, "expected bytes"));
        };
        let scalar = ScalarData::from_le_bytes(dtype, bytes).map_err(|e| malformed(entry.path(), &e))?;
        ctx.insert(entry, parent, id, scalar.into())
    }

    fn write(&self, ctx: &mut WriteContext<'_, B>, node: &Node, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let NodeKind::Scalar(scalar) = node.kind() else {
            return Err(wrong_kind(node, "ScalarData"));
        };
        let mut attrs = ctx.object_attrs(node);
        attrs.insert(attrs::DATA_TYPE.into(), AttrValue::Str(scalar.dtype().name().into()));
        attrs.insert(attrs::VALUE.into(), AttrValue::Bytes(scalar.to_le_bytes()));
        parent.write_dataset(node.name(), attrs, &[])
    }
}

pub(crate) struct ImageFactory;

impl<B: Backend> NodeFactory<B> for ImageFactory {
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError> {
        let dims = entry.attr_shape(attrs::DIMENSIONS)?;
        let dims = <[usize; 3]>::try_from(dims.as_slice())
            .map_err(|_| IoError::attr(entry.path(), attrs::DIMENSIONS, "expected 3 extents"))?;
        let origin = entry.attr_vec3(attrs::ORIGIN)?;
        let spacing = entry.attr_vec3(attrs::SPACING)?;
        let image = ImageGeom::with_frame(dims, origin, spacing)
            .map_err(|e| IoError::attr(entry.path(), attrs::DIMENSIONS, e.to_string()))?;
        read_composite(ctx, entry, parent, id, image.into())
    }

    fn write(&self, ctx: &mut WriteContext<'_, B>, node: &Node, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let NodeKind::Image(image) = node.kind() else {
            return Err(wrong_kind(node, "ImageGeom"));
        };
        let mut attrs = ctx.object_attrs(node);
        attrs.insert(attrs::DIMENSIONS.into(), shape_attr(&image.dimensions()));
        attrs.insert(attrs::ORIGIN.into(), AttrValue::F64List(image.origin().to_vec()));
        attrs.insert(attrs::SPACING.into(), AttrValue::F64List(image.spacing().to_vec()));
        write_composite(ctx, node, parent, attrs)
    }
}

const MESH_SLOTS: [(MeshSlot, &str); 3] = [
    (MeshSlot::Vertices, attrs::SHARED_VERTEX_LIST_ID),
    (MeshSlot::Edges, attrs::SHARED_EDGE_LIST_ID),
    (MeshSlot::Faces, attrs::SHARED_FACE_LIST_ID),
];

/// One instance per mesh kind; registered under the kind's type name.
pub(crate) struct MeshFactory(pub(crate) MeshKind);

impl<B: Backend> NodeFactory<B> for MeshFactory {
    fn read(
        &self,
        ctx: &mut ReadContext<'_, B>,
        entry: &dyn EntryRead,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), IoError> {
        let mut mesh = MeshGeom::new(self.0);
        for (slot, key) in MESH_SLOTS {
            mesh.set_reference(slot, entry.attr_opt_u64(key)?.map(NodeId));
        }
        // referenced arrays may come later in the walk; the reader checks
        // them once everything is materialized
        read_composite(ctx, entry, parent, id, mesh.into())
    }

    fn write(&self, ctx: &mut WriteContext<'_, B>, node: &Node, parent: &mut dyn GroupWrite) -> Result<(), IoError> {
        let NodeKind::Mesh(mesh) = node.kind() else {
            return Err(wrong_kind(node, self.0.type_name()));
        };
        let mut attrs = ctx.object_attrs(node);
        for (slot, key) in MESH_SLOTS {
            if let Some(target) = mesh.reference(slot) {
                attrs.insert(key.into(), AttrValue::U64(target.value()));
            }
        }
        write_composite(ctx, node, parent, attrs)
    }
}
