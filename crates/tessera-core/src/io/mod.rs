// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph persistence.
//!
//! Both back ends store the same logical hierarchy: groups carrying named
//! attributes, datasets carrying attributes plus one payload, and links
//! naming the location of an object written elsewhere. The generic
//! [`reader`] and [`writer`] drivers walk that hierarchy through the
//! object-safe [`EntryRead`] and [`GroupWrite`] traits and dispatch on each
//! object's `ObjectType` attribute through a per-back-end
//! [`FactoryRegistry`].
//!
//! Layout contract:
//! - the root group carries `NextObjectId`;
//! - every object carries `ObjectId` and `ObjectType`, and `Importable`
//!   when it should be skipped on reload;
//! - a node reachable from several parents is written once; every further
//!   edge is a link to the first location.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::graph::GraphError;
use crate::ident::{DataPath, NodeId};

pub mod directory;
mod factories;
pub mod factory;
pub mod packed;
pub mod reader;
pub mod writer;

pub use directory::Directory;
pub use factory::{FactoryRegistry, NodeFactory};
pub use packed::Packed;
pub use reader::{read_graph, ReadContext, ReadOptions};
pub use writer::{write_graph, WriteContext, WriteSummary};

/// Persisted attribute names.
pub mod attrs {
    /// Root group: id the allocator hands out next.
    pub const NEXT_OBJECT_ID: &str = "NextObjectId";
    /// Object id, stable for the life of the file.
    pub const OBJECT_ID: &str = "ObjectId";
    /// Factory dispatch key.
    pub const OBJECT_TYPE: &str = "ObjectType";
    /// `false` marks an object skipped on read.
    pub const IMPORTABLE: &str = "Importable";
    /// Array and attribute-matrix tuple shape.
    pub const TUPLE_SHAPE: &str = "TupleShape";
    /// Array component shape.
    pub const COMPONENT_SHAPE: &str = "ComponentShape";
    /// Element type name.
    pub const DATA_TYPE: &str = "DataType";
    /// String array length.
    pub const TUPLE_COUNT: &str = "TupleCount";
    /// Scalar value, little-endian bytes.
    pub const VALUE: &str = "Value";
    /// Image cell counts.
    pub const DIMENSIONS: &str = "Dimensions";
    /// Image origin.
    pub const ORIGIN: &str = "Origin";
    /// Image spacing.
    pub const SPACING: &str = "Spacing";
    /// Mesh vertex list id.
    pub const SHARED_VERTEX_LIST_ID: &str = "SharedVertexListId";
    /// Mesh edge list id.
    pub const SHARED_EDGE_LIST_ID: &str = "SharedEdgeListId";
    /// Mesh face list id.
    pub const SHARED_FACE_LIST_ID: &str = "SharedFaceListId";
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    /// Unsigned integer (ids, counts).
    U64(u64),
    /// Signed integer.
    I64(i64),
    /// Float.
    F64(f64),
    /// Flag.
    Bool(bool),
    /// Text.
    Str(String),
    /// Unsigned integer list (shapes).
    U64List(Vec<u64>),
    /// Float list.
    F64List(Vec<f64>),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl AttrValue {
    /// Short tag for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::U64(_) => "u64",
            Self::I64(_) => "i64",
            Self::F64(_) => "f64",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
            Self::U64List(_) => "u64_list",
            Self::F64List(_) => "f64_list",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// Attributes of one persisted object, sorted by name.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Persistence failure. Every variant has its own [`IoError::code`].
#[derive(Debug, Error)]
pub enum IoError {
    /// The store could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        /// File or directory that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Read or write failure on an open store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The root group has no `NextObjectId`.
    #[error("root group has no NextObjectId attribute")]
    MissingIdAllocator,
    /// `NextObjectId` is not an integer, or not above every stored id.
    #[error("invalid NextObjectId: {0}")]
    InvalidIdAllocator(String),
    /// An object has no `ObjectId`.
    #[error("{location}: missing ObjectId attribute")]
    MissingObjectId {
        /// Object location.
        location: String,
    },
    /// An object has no `ObjectType`.
    #[error("{location}: missing ObjectType attribute")]
    MissingObjectType {
        /// Object location.
        location: String,
    },
    /// No factory is registered for the stored type name.
    #[error("{location}: unknown object type {type_name:?}")]
    UnknownType {
        /// Stored type name.
        type_name: String,
        /// Object location.
        location: String,
    },
    /// An attribute is missing or has the wrong form.
    #[error("{location}: invalid attribute {attr}: {reason}")]
    InvalidAttribute {
        /// Object location.
        location: String,
        /// Attribute name.
        attr: String,
        /// What is wrong with it.
        reason: String,
    },
    /// A payload or section is shorter than recorded.
    #[error("{location}: truncated (expected {expected} bytes, found {actual})")]
    Truncated {
        /// Object or section.
        location: String,
        /// Recorded length.
        expected: u64,
        /// Available length.
        actual: u64,
    },
    /// Structural data could not be decoded.
    #[error("malformed {what}: {reason}")]
    Malformed {
        /// What failed to decode.
        what: String,
        /// Decoder message.
        reason: String,
    },
    /// A payload does not hash to its recorded digest.
    #[error("{location}: payload digest mismatch")]
    DigestMismatch {
        /// Object location.
        location: String,
    },
    /// The store was written by an unknown format version.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
    /// A link names a location that holds no object.
    #[error("{location}: link target {target} does not resolve")]
    DanglingLink {
        /// Link location.
        location: String,
        /// Recorded target.
        target: String,
    },
    /// A mesh attribute names an id that was never read.
    #[error("mesh {mesh} references missing array {target}")]
    DanglingReference {
        /// Mesh id.
        mesh: NodeId,
        /// Referenced id.
        target: NodeId,
    },
    /// Materializing an object violated a graph invariant.
    #[error("{location}: {source}")]
    Graph {
        /// Object location.
        location: String,
        /// Graph error.
        #[source]
        source: GraphError,
    },
    /// Two children of one group share a name.
    #[error("{location}: duplicate entry")]
    DuplicateEntry {
        /// Entry location.
        location: String,
    },
    /// The graph cannot be encoded as given.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl IoError {
    /// Stable numeric code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Open { .. } => -6001,
            Self::Io(_) => -6002,
            Self::MissingIdAllocator => -6010,
            Self::InvalidIdAllocator(_) => -6011,
            Self::MissingObjectId { .. } => -6020,
            Self::MissingObjectType { .. } => -6021,
            Self::UnknownType { .. } => -6030,
            Self::InvalidAttribute { .. } => -6031,
            Self::Truncated { .. } => -6040,
            Self::Malformed { .. } => -6041,
            Self::DigestMismatch { .. } => -6042,
            Self::UnsupportedVersion(_) => -6043,
            Self::DanglingLink { .. } => -6050,
            Self::DanglingReference { .. } => -6051,
            Self::Graph { .. } => -6060,
            Self::DuplicateEntry { .. } => -6061,
            Self::Encode(_) => -6070,
        }
    }

    pub(crate) fn graph(location: &DataPath, source: GraphError) -> Self {
        Self::Graph {
            location: display_location(location),
            source,
        }
    }

    pub(crate) fn attr(location: &DataPath, attr: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            location: display_location(location),
            attr: attr.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<IoError> for Diagnostic {
    fn from(err: IoError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// `/a/b` form of a location, `/` for the root group.
#[must_use]
pub fn display_location(path: &DataPath) -> String {
    format!("/{path}")
}

/// Read side of one persisted object.
///
/// Link entries never surface here: [`EntryRead::children`] resolves a link
/// to the object it names.
pub trait EntryRead {
    /// Name of the entry under its parent.
    fn name(&self) -> &str;
    /// Canonical location of the object.
    fn path(&self) -> &DataPath;
    /// Attributes.
    fn attrs(&self) -> &AttrMap;
    /// `true` for groups, `false` for datasets.
    fn is_group(&self) -> bool;
    /// Child entries of a group in stored order; empty for datasets.
    fn children(&self) -> Result<Vec<Box<dyn EntryRead + '_>>, IoError>;
    /// Recorded payload length of a dataset.
    fn payload_len(&self) -> u64;
    /// Reads the dataset payload, checking its length and, when enabled,
    /// its digest.
    fn read_payload(&self) -> Result<Vec<u8>, IoError>;

    /// Attribute `key`, if present.
    fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs().get(key)
    }

    /// Required unsigned integer attribute.
    fn attr_u64(&self, key: &str) -> Result<u64, IoError> {
        match self.attr(key) {
            Some(AttrValue::U64(v)) => Ok(*v),
            Some(other) => Err(IoError::attr(self.path(), key, format!("expected u64, found {}", other.kind()))),
            None => Err(IoError::attr(self.path(), key, "missing")),
        }
    }

    /// Optional unsigned integer attribute.
    fn attr_opt_u64(&self, key: &str) -> Result<Option<u64>, IoError> {
        match self.attr(key) {
            None => Ok(None),
            Some(_) => self.attr_u64(key).map(Some),
        }
    }

    /// Required string attribute.
    fn attr_str(&self, key: &str) -> Result<&str, IoError> {
        match self.attr(key) {
            Some(AttrValue::Str(v)) => Ok(v),
            Some(other) => Err(IoError::attr(self.path(), key, format!("expected str, found {}", other.kind()))),
            None => Err(IoError::attr(self.path(), key, "missing")),
        }
    }

    /// Required shape attribute.
    fn attr_shape(&self, key: &str) -> Result<Vec<usize>, IoError> {
        match self.attr(key) {
            Some(AttrValue::U64List(v)) => v
                .iter()
                .map(|&n| usize::try_from(n).map_err(|_| IoError::attr(self.path(), key, "extent exceeds usize")))
                .collect(),
            Some(other) => Err(IoError::attr(self.path(), key, format!("expected u64_list, found {}", other.kind()))),
            None => Err(IoError::attr(self.path(), key, "missing")),
        }
    }

    /// Required three-component float attribute.
    fn attr_vec3(&self, key: &str) -> Result<[f64; 3], IoError> {
        match self.attr(key) {
            Some(AttrValue::F64List(v)) => <[f64; 3]>::try_from(v.as_slice())
                .map_err(|_| IoError::attr(self.path(), key, format!("expected 3 values, found {}", v.len()))),
            Some(other) => Err(IoError::attr(self.path(), key, format!("expected f64_list, found {}", other.kind()))),
            None => Err(IoError::attr(self.path(), key, "missing")),
        }
    }
}

/// Write side of one group being populated.
pub trait GroupWrite {
    /// Location of this group.
    fn path(&self) -> &DataPath;
    /// Sets an attribute on this group.
    fn set_attr(&mut self, key: &str, value: AttrValue);
    /// Adds a child group and returns its writer.
    fn create_group(&mut self, name: &str, attrs: AttrMap) -> Result<Box<dyn GroupWrite + '_>, IoError>;
    /// Adds a child dataset with `payload`, recording its length and digest.
    fn write_dataset(&mut self, name: &str, attrs: AttrMap, payload: &[u8]) -> Result<(), IoError>;
    /// Adds a child link naming an object already written at `target`.
    fn write_link(&mut self, name: &str, target: &DataPath) -> Result<(), IoError>;
    /// Flushes the group. Writers must call this once after the last child.
    fn finish(self: Box<Self>) -> Result<(), IoError>;
}

/// Marker for a storage back end; selects a [`FactoryRegistry`].
pub trait Backend: Send + Sync + 'static {
    /// Short name used in logs.
    const NAME: &'static str;
}

/// BLAKE3 digest of a payload, hex encoded.
pub(crate) fn digest_hex(payload: &[u8]) -> String {
    hex::encode(blake3::hash(payload).as_bytes())
}

/// Checks a payload against its recorded length and digest.
pub(crate) fn verify_payload(
    path: &DataPath,
    payload: &[u8],
    expected_len: u64,
    expected_digest: &str,
    verify_digest: bool,
) -> Result<(), IoError> {
    let actual = payload.len() as u64;
    if actual != expected_len {
        return Err(IoError::Truncated {
            location: display_location(path),
            expected: expected_len,
            actual,
        });
    }
    if verify_digest && digest_hex(payload) != expected_digest {
        return Err(IoError::DigestMismatch {
            location: display_location(path),
        });
    }
    Ok(())
}
