// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packed reader.
//!
//! Opening a store reads the header and the CBOR index and nothing else.
//! Payload bytes are fetched per dataset on demand, so a preflight read of a
//! large file costs one header and one index read.

use std::cell::RefCell;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use super::types::{IndexDataset, IndexEntry, IndexGroup, PackedHeader};
use crate::ident::DataPath;
use crate::io::{display_location, verify_payload, AttrMap, EntryRead, IoError};

/// Validates the header against the store size.
pub(crate) fn validate_header(bytes: &[u8], file_size: u64) -> Result<PackedHeader, IoError> {
    if bytes.len() < PackedHeader::SIZE {
        return Err(IoError::Truncated {
            location: "header".into(),
            expected: PackedHeader::SIZE as u64,
            actual: bytes.len() as u64,
        });
    }
    let header: PackedHeader = bytemuck::pod_read_unaligned(&bytes[..PackedHeader::SIZE]);
    if header.magic != PackedHeader::MAGIC {
        return Err(IoError::Malformed {
            what: "header".into(),
            reason: format!("bad magic {:?}", header.magic),
        });
    }
    if header.version() != PackedHeader::VERSION {
        return Err(IoError::UnsupportedVersion(header.version()));
    }
    for (name, off, len) in [
        ("index", header.index_off(), header.index_len()),
        ("blob section", header.blobs_off(), header.blobs_len()),
    ] {
        let end = off.saturating_add(len);
        if end > file_size {
            return Err(IoError::Truncated {
                location: name.into(),
                expected: end,
                actual: file_size,
            });
        }
    }
    Ok(header)
}

pub(crate) fn decode_index(bytes: &[u8]) -> Result<IndexGroup, IoError> {
    ciborium::from_reader(bytes).map_err(|e| IoError::Malformed {
        what: "index".into(),
        reason: e.to_string(),
    })
}

/// Bounds-checked slice of an in-memory image.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn slice(data: &[u8], offset: u64, len: u64, name: &str) -> Result<Vec<u8>, IoError> {
    let end = offset.saturating_add(len);
    if end > data.len() as u64 {
        return Err(IoError::Truncated {
            location: name.to_owned(),
            expected: end,
            actual: data.len() as u64,
        });
    }
    Ok(data[offset as usize..end as usize].to_vec())
}

enum Source {
    Bytes(Vec<u8>),
    File(RefCell<File>),
}

/// An opened packed store.
pub(crate) struct PackedStore {
    source: Source,
    header: PackedHeader,
    index: IndexGroup,
    verify: bool,
}

impl PackedStore {
    pub(crate) fn from_bytes(bytes: Vec<u8>, verify: bool) -> Result<Self, IoError> {
        let header = validate_header(&bytes, bytes.len() as u64)?;
        let index = decode_index(&slice(&bytes, header.index_off(), header.index_len(), "index")?)?;
        Ok(Self {
            source: Source::Bytes(bytes),
            header,
            index,
            verify,
        })
    }

    pub(crate) fn open(path: &Path, verify: bool) -> Result<Self, IoError> {
        let mut file = File::open(path).map_err(|source| IoError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let file_size = file.metadata()?.len();
        let mut head = Vec::with_capacity(PackedHeader::SIZE);
        (&mut file)
            .take(PackedHeader::SIZE as u64)
            .read_to_end(&mut head)?;
        let header = validate_header(&head, file_size)?;
        let store = Self {
            source: Source::File(RefCell::new(file)),
            header,
            index: IndexGroup::default(),
            verify,
        };
        let index = decode_index(&store.read_range(header.index_off(), header.index_len(), "index")?)?;
        Ok(Self { index, ..store })
    }

    fn read_range(&self, offset: u64, len: u64, name: &str) -> Result<Vec<u8>, IoError> {
        match &self.source {
            Source::Bytes(data) => slice(data, offset, len, name),
            Source::File(file) => {
                let size = usize::try_from(len).map_err(|_| IoError::Malformed {
                    what: name.to_owned(),
                    reason: format!("length {len} exceeds address space"),
                })?;
                let mut file = file.borrow_mut();
                file.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0; size];
                match file.read_exact(&mut buf) {
                    Ok(()) => Ok(buf),
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(IoError::Truncated {
                        location: name.to_owned(),
                        expected: offset.saturating_add(len),
                        actual: file.metadata().map_or(0, |m| m.len()),
                    }),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Root group as an entry.
    pub(crate) fn root(&self) -> PackedEntry<'_> {
        PackedEntry {
            store: self,
            name: String::new(),
            path: DataPath::root(),
            target: Target::Group(&self.index),
        }
    }

    /// Object stored at `path`; links never point at links.
    fn resolve(&self, path: &DataPath) -> Option<Target<'_>> {
        let mut target = Target::Group(&self.index);
        for part in path.parts() {
            let Target::Group(group) = target else {
                return None;
            };
            let child = group.children.iter().find(|c| &c.name == part)?;
            target = match &child.entry {
                IndexEntry::Group(g) => Target::Group(g),
                IndexEntry::Dataset(d) => Target::Dataset(d),
                IndexEntry::Link { .. } => return None,
            };
        }
        Some(target)
    }
}

#[derive(Clone, Copy)]
enum Target<'f> {
    Group(&'f IndexGroup),
    Dataset(&'f IndexDataset),
}

/// [`EntryRead`] over one resolved index entry.
pub(crate) struct PackedEntry<'f> {
    store: &'f PackedStore,
    name: String,
    path: DataPath,
    target: Target<'f>,
}

impl EntryRead for PackedEntry<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &DataPath {
        &self.path
    }

    fn attrs(&self) -> &AttrMap {
        match self.target {
            Target::Group(g) => &g.attrs,
            Target::Dataset(d) => &d.attrs,
        }
    }

    fn is_group(&self) -> bool {
        matches!(self.target, Target::Group(_))
    }

    fn children(&self) -> Result<Vec<Box<dyn EntryRead + '_>>, IoError> {
        let Target::Group(group) = self.target else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Box<dyn EntryRead + '_>> = Vec::with_capacity(group.children.len());
        for child in &group.children {
            let here = self
                .path
                .child(&child.name)
                .map_err(|e| IoError::graph(&self.path, e.into()))?;
            let (path, target) = match &child.entry {
                IndexEntry::Group(g) => (here, Target::Group(g)),
                IndexEntry::Dataset(d) => (here, Target::Dataset(d)),
                IndexEntry::Link { target } => {
                    let dangling = || IoError::DanglingLink {
                        location: display_location(&here),
                        target: target.clone(),
                    };
                    let path: DataPath = target.parse().map_err(|_| dangling())?;
                    let resolved = self.store.resolve(&path).ok_or_else(dangling)?;
                    (path, resolved)
                }
            };
            out.push(Box::new(PackedEntry {
                store: self.store,
                name: child.name.clone(),
                path,
                target,
            }));
        }
        Ok(out)
    }

    fn payload_len(&self) -> u64 {
        match self.target {
            Target::Group(_) => 0,
            Target::Dataset(d) => d.len,
        }
    }

    fn read_payload(&self) -> Result<Vec<u8>, IoError> {
        let Target::Dataset(d) = self.target else {
            return Err(IoError::Malformed {
                what: display_location(&self.path),
                reason: "groups have no payload".into(),
            });
        };
        let location = display_location(&self.path);
        let blobs_len = self.store.header.blobs_len();
        let end = d.offset.saturating_add(d.len);
        if end > blobs_len {
            return Err(IoError::Truncated {
                location,
                expected: end,
                actual: blobs_len,
            });
        }
        let bytes = self
            .store
            .read_range(self.store.header.blobs_off() + d.offset, d.len, &location)?;
        verify_payload(&self.path, &bytes, d.len, &d.digest, self.store.verify)?;
        Ok(bytes)
    }
}
