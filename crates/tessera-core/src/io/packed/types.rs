// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packed file layout.
//!
//! ```text
//! [header: 64 bytes][index: CBOR][pad to 8][blobs: 8-byte aligned payloads]
//! ```
//!
//! The header is `#[repr(C)]` with little-endian fields and derives
//! `bytemuck::Pod`, so it is read and written without unsafe code. The
//! index mirrors the logical hierarchy; dataset entries point into the blob
//! section by offset and length, relative to the section start.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::io::AttrMap;

/// Fixed-size file header (64 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PackedHeader {
    /// Magic bytes: `b"TSRPAK01"`.
    pub magic: [u8; 8],
    /// Format version.
    pub version_le: u32,
    /// Reserved flag bits, zero.
    pub flags_le: u32,
    /// Offset of the CBOR index.
    pub index_off_le: u64,
    /// Length of the CBOR index.
    pub index_len_le: u64,
    /// Offset of the blob section.
    pub blobs_off_le: u64,
    /// Length of the blob section.
    pub blobs_len_le: u64,
    /// Reserved for future header fields.
    pub reserved: [u8; 16],
}

const _: () = assert!(std::mem::size_of::<PackedHeader>() == 64);

impl PackedHeader {
    /// Magic bytes for format version 1.
    pub const MAGIC: [u8; 8] = *b"TSRPAK01";
    /// Current format version.
    pub const VERSION: u32 = 1;
    /// Header size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Header for the current version with the given section extents.
    #[must_use]
    pub fn new(index_off: u64, index_len: u64, blobs_off: u64, blobs_len: u64) -> Self {
        Self {
            magic: Self::MAGIC,
            version_le: Self::VERSION.to_le(),
            flags_le: 0,
            index_off_le: index_off.to_le(),
            index_len_le: index_len.to_le(),
            blobs_off_le: blobs_off.to_le(),
            blobs_len_le: blobs_len.to_le(),
            reserved: [0; 16],
        }
    }

    /// Returns the format version (converting from little-endian).
    #[must_use]
    pub fn version(&self) -> u32 {
        u32::from_le(self.version_le)
    }

    /// Returns the index offset (converting from little-endian).
    #[must_use]
    pub fn index_off(&self) -> u64 {
        u64::from_le(self.index_off_le)
    }

    /// Returns the index length (converting from little-endian).
    #[must_use]
    pub fn index_len(&self) -> u64 {
        u64::from_le(self.index_len_le)
    }

    /// Returns the blob section offset (converting from little-endian).
    #[must_use]
    pub fn blobs_off(&self) -> u64 {
        u64::from_le(self.blobs_off_le)
    }

    /// Returns the blob section length (converting from little-endian).
    #[must_use]
    pub fn blobs_len(&self) -> u64 {
        u64::from_le(self.blobs_len_le)
    }
}

/// Group in the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexGroup {
    /// Group attributes.
    pub attrs: AttrMap,
    /// Children in write order.
    pub children: Vec<IndexChild>,
}

/// Named child record of an [`IndexGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexChild {
    /// Name under the parent group.
    pub name: String,
    /// What the name refers to.
    pub entry: IndexEntry,
}

/// Dataset in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDataset {
    /// Dataset attributes.
    pub attrs: AttrMap,
    /// Payload offset relative to the blob section.
    pub offset: u64,
    /// Payload length.
    pub len: u64,
    /// Hex BLAKE3 digest of the payload.
    pub digest: String,
}

/// Child kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexEntry {
    /// Nested group.
    Group(IndexGroup),
    /// Dataset with a payload.
    Dataset(IndexDataset),
    /// Another location holding the object.
    Link {
        /// `/`-separated path from the root group.
        target: String,
    },
}

/// Rounds `n` up to a multiple of 8.
pub(crate) const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_accessors_round_trip_through_bytes() {
        let header = PackedHeader::new(64, 100, 168, 32);
        let bytes = bytemuck::bytes_of(&header).to_vec();
        assert_eq!(&bytes[..8], b"TSRPAK01");
        let back: PackedHeader = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(back.version(), PackedHeader::VERSION);
        assert_eq!(back.index_off(), 64);
        assert_eq!(back.index_len(), 100);
        assert_eq!(back.blobs_off(), 168);
        assert_eq!(back.blobs_len(), 32);
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(65), 72);
    }
}
