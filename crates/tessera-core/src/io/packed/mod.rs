// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Single-file back end.
//!
//! A 64-byte header, a CBOR index of the hierarchy and an 8-byte aligned
//! blob section. See [`types`] for the layout.
use std::path::Path;

use tracing::debug;

use super::factory::FactoryRegistry;
use super::reader::{read_graph, ReadOptions};
use super::writer::{write_graph, WriteSummary};
use super::{Backend, GroupWrite, IoError};
use crate::graph::Graph;

mod read;
pub mod types;
mod write;

pub use types::{IndexChild, IndexDataset, IndexEntry, IndexGroup, PackedHeader};

/// Packed back end marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Packed;

impl Backend for Packed {
    const NAME: &'static str = "packed";
}

/// Encodes `graph` as a packed image.
pub fn to_bytes(
    graph: &Graph,
    registry: &FactoryRegistry<Packed>,
) -> Result<(Vec<u8>, WriteSummary), IoError> {
    let mut index = IndexGroup::default();
    let mut blobs = Vec::new();
    let mut root = Box::new(write::PackedGroupWriter::root(&mut index, &mut blobs));
    let summary = write_graph(graph, registry, root.as_mut())?;
    root.finish()?;
    Ok((write::encode(&index, &blobs)?, summary))
}

/// Writes `graph` to the file at `path`, replacing it.
pub fn write_file(
    graph: &Graph,
    registry: &FactoryRegistry<Packed>,
    path: &Path,
) -> Result<WriteSummary, IoError> {
    let (bytes, summary) = to_bytes(graph, registry)?;
    std::fs::write(path, &bytes).map_err(|source| IoError::Open {
        path: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "packed file written");
    Ok(summary)
}

/// Reads a graph from an in-memory packed image.
pub fn from_bytes(
    bytes: Vec<u8>,
    registry: &FactoryRegistry<Packed>,
    options: ReadOptions,
) -> Result<Graph, IoError> {
    let store = read::PackedStore::from_bytes(bytes, options.verify_digests)?;
    read_graph(&store.root(), registry, options)
}

/// Reads a graph from the file at `path`.
///
/// In preflight mode only the header and index are read from disk.
pub fn read_file(
    path: &Path,
    registry: &FactoryRegistry<Packed>,
    options: ReadOptions,
) -> Result<Graph, IoError> {
    let store = read::PackedStore::open(path, options.verify_digests)?;
    read_graph(&store.root(), registry, options)
}

/// Decoded packed image, for inspection and repair tools.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedImage {
    /// File header.
    pub header: PackedHeader,
    /// Decoded index.
    pub index: IndexGroup,
    /// Blob section.
    pub blobs: Vec<u8>,
}

impl PackedImage {
    /// Splits an encoded image into its sections.
    pub fn decode(bytes: &[u8]) -> Result<Self, IoError> {
        let header = read::validate_header(bytes, bytes.len() as u64)?;
        let index = read::decode_index(&read::slice(bytes, header.index_off(), header.index_len(), "index")?)?;
        let blobs = read::slice(bytes, header.blobs_off(), header.blobs_len(), "blob section")?;
        Ok(Self { header, index, blobs })
    }

    /// Re-encodes the image with a fresh header.
    pub fn encode(&self) -> Result<Vec<u8>, IoError> {
        write::encode(&self.index, &self.blobs)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::io::{attrs, AttrValue};
    use crate::node::{DataArray, DataGroup};

    fn sample() -> Graph {
        let mut g = Graph::new();
        let a = g.create(None, "A", DataGroup::new()).unwrap();
        let b = g.create(None, "B", DataGroup::new()).unwrap();
        let x = g
            .create(Some(a), "x", DataArray::new(vec![3], vec![1], vec![1.5_f32, 2.5, 3.5]).unwrap())
            .unwrap();
        g.set_additional_parent(x, Some(b)).unwrap();
        g
    }

    #[test]
    fn shared_array_is_one_blob_and_one_link() {
        let reg = FactoryRegistry::<Packed>::builtin();
        let (bytes, summary) = to_bytes(&sample(), &reg).unwrap();
        assert_eq!(summary, WriteSummary { payloads: 3, edges: 4 });
        let image = PackedImage::decode(&bytes).unwrap();
        assert_eq!(image.blobs.len(), 12);
        let b = &image.index.children[1];
        assert_eq!(b.name, "B");
        let IndexEntry::Group(group) = &b.entry else {
            panic!("B is not a group");
        };
        assert_eq!(
            group.children[0].entry,
            IndexEntry::Link { target: "A/x".into() }
        );
    }

    #[test]
    fn output_is_deterministic() {
        let reg = FactoryRegistry::<Packed>::builtin();
        let g = sample();
        assert_eq!(to_bytes(&g, &reg).unwrap().0, to_bytes(&g, &reg).unwrap().0);
    }

    #[test]
    fn bad_magic_and_version_are_distinct() {
        let reg = FactoryRegistry::<Packed>::builtin();
        let (bytes, _) = to_bytes(&sample(), &reg).unwrap();

        let mut magic = bytes.clone();
        magic[0] = b'X';
        let err = from_bytes(magic, &reg, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::Malformed { .. }), "{err}");

        let mut version = bytes;
        version[8] = 9;
        let err = from_bytes(version, &reg, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::UnsupportedVersion(9)), "{err}");
    }

    #[test]
    fn truncated_file_is_reported() {
        let reg = FactoryRegistry::<Packed>::builtin();
        let (bytes, _) = to_bytes(&sample(), &reg).unwrap();
        let cut = bytes[..bytes.len() - 4].to_vec();
        let err = from_bytes(cut, &reg, ReadOptions::default()).unwrap_err();
        assert_eq!(err.code(), -6040);
    }

    #[test]
    fn flipped_payload_byte_fails_digest_unless_disabled() {
        let reg = FactoryRegistry::<Packed>::builtin();
        let (mut bytes, _) = to_bytes(&sample(), &reg).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = from_bytes(bytes.clone(), &reg, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::DigestMismatch { .. }), "{err}");

        let lax = ReadOptions {
            verify_digests: false,
            ..ReadOptions::default()
        };
        assert!(from_bytes(bytes.clone(), &reg, lax).is_ok());
        // preflight never looks at payload bytes
        assert!(from_bytes(bytes, &reg, ReadOptions::preflight()).is_ok());
    }

    #[test]
    fn edited_index_round_trips_through_image() {
        let reg = FactoryRegistry::<Packed>::builtin();
        let (bytes, _) = to_bytes(&sample(), &reg).unwrap();
        let mut image = PackedImage::decode(&bytes).unwrap();
        image
            .index
            .attrs
            .insert(attrs::NEXT_OBJECT_ID.into(), AttrValue::U64(100));
        let g = from_bytes(image.encode().unwrap(), &reg, ReadOptions::default()).unwrap();
        assert_eq!(g.next_id().value(), 100);
    }
}
