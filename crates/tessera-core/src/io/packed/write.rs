// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packed writer.
//!
//! The hierarchy is collected into an in-memory [`IndexGroup`] tree while
//! payloads are appended to one blob buffer; [`encode`] then lays both out
//! behind the header. Output is deterministic for a given graph.

use super::types::{align8, IndexChild, IndexDataset, IndexEntry, IndexGroup, PackedHeader};
use crate::ident::DataPath;
use crate::io::{digest_hex, display_location, AttrMap, AttrValue, GroupWrite, IoError};

/// [`GroupWrite`] over one index group.
pub(crate) struct PackedGroupWriter<'a> {
    group: &'a mut IndexGroup,
    blobs: &'a mut Vec<u8>,
    path: DataPath,
}

impl<'a> PackedGroupWriter<'a> {
    pub(crate) fn root(group: &'a mut IndexGroup, blobs: &'a mut Vec<u8>) -> Self {
        Self {
            group,
            blobs,
            path: DataPath::root(),
        }
    }

    fn child_path(&self, name: &str) -> Result<DataPath, IoError> {
        if self.group.children.iter().any(|c| c.name == name) {
            return Err(IoError::DuplicateEntry {
                location: format!("{}/{name}", display_location(&self.path).trim_end_matches('/')),
            });
        }
        self.path
            .child(name)
            .map_err(|e| IoError::graph(&self.path, e.into()))
    }
}

impl GroupWrite for PackedGroupWriter<'_> {
    fn path(&self) -> &DataPath {
        &self.path
    }

    fn set_attr(&mut self, key: &str, value: AttrValue) {
        self.group.attrs.insert(key.to_owned(), value);
    }

    fn create_group(&mut self, name: &str, attrs: AttrMap) -> Result<Box<dyn GroupWrite + '_>, IoError> {
        let path = self.child_path(name)?;
        self.group.children.push(IndexChild {
            name: name.to_owned(),
            entry: IndexEntry::Group(IndexGroup {
                attrs,
                children: Vec::new(),
            }),
        });
        let Some(IndexChild {
            entry: IndexEntry::Group(group),
            ..
        }) = self.group.children.last_mut()
        else {
            return Err(IoError::Encode(format!("lost group {}", display_location(&path))));
        };
        Ok(Box::new(PackedGroupWriter {
            group,
            blobs: &mut *self.blobs,
            path,
        }))
    }

    fn write_dataset(&mut self, name: &str, attrs: AttrMap, payload: &[u8]) -> Result<(), IoError> {
        self.child_path(name)?;
        let offset = align8(self.blobs.len());
        self.blobs.resize(offset, 0);
        self.blobs.extend_from_slice(payload);
        self.group.children.push(IndexChild {
            name: name.to_owned(),
            entry: IndexEntry::Dataset(IndexDataset {
                attrs,
                offset: offset as u64,
                len: payload.len() as u64,
                digest: digest_hex(payload),
            }),
        });
        Ok(())
    }

    fn write_link(&mut self, name: &str, target: &DataPath) -> Result<(), IoError> {
        self.child_path(name)?;
        self.group.children.push(IndexChild {
            name: name.to_owned(),
            entry: IndexEntry::Link {
                target: target.to_string(),
            },
        });
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), IoError> {
        Ok(())
    }
}

/// Lays out header, CBOR index and blob section.
pub(crate) fn encode(index: &IndexGroup, blobs: &[u8]) -> Result<Vec<u8>, IoError> {
    let mut index_bytes = Vec::new();
    ciborium::into_writer(index, &mut index_bytes).map_err(|e| IoError::Encode(e.to_string()))?;

    let index_off = PackedHeader::SIZE;
    let blobs_off = align8(index_off + index_bytes.len());
    let header = PackedHeader::new(
        index_off as u64,
        index_bytes.len() as u64,
        blobs_off as u64,
        blobs.len() as u64,
    );

    let mut buf = Vec::with_capacity(blobs_off + blobs.len());
    buf.extend_from_slice(bytemuck::bytes_of(&header));
    buf.extend_from_slice(&index_bytes);
    buf.resize(blobs_off, 0);
    buf.extend_from_slice(blobs);
    Ok(buf)
}
