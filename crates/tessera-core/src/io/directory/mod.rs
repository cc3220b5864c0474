// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Directory-tree back end.
//!
//! ```text
//! store/
//!   group.json            root attributes + ordered child records
//!   A/group.json
//!   A/x/dataset.json      attributes, payload length, hex digest
//!   A/x/data.bin          raw little-endian payload
//! ```
//!
//! Links are child records naming the target's path from the store root.
//! Preflight reads open metadata files only.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::factory::FactoryRegistry;
use super::reader::{read_graph, ReadOptions};
use super::writer::{write_graph, WriteSummary};
use super::{
    digest_hex, display_location, verify_payload, AttrMap, AttrValue, Backend, EntryRead,
    GroupWrite, IoError,
};
use crate::graph::Graph;
use crate::ident::DataPath;

/// Group metadata file name.
pub const GROUP_META: &str = "group.json";
/// Dataset metadata file name.
pub const DATASET_META: &str = "dataset.json";
/// Dataset payload file name.
pub const PAYLOAD: &str = "data.bin";

/// Directory back end marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Directory;

impl Backend for Directory {
    const NAME: &'static str = "directory";
}

/// Child kinds in a [`GroupMeta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    /// Sub-directory with `group.json`.
    Group,
    /// Sub-directory with `dataset.json` and `data.bin`.
    Dataset,
    /// Reference to an object stored elsewhere.
    Link,
}

/// One child record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecord {
    /// Name under the parent group.
    pub name: String,
    /// What the name refers to.
    pub kind: ChildKind,
    /// Link target path, for links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Contents of `group.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMeta {
    /// Group attributes.
    pub attrs: AttrMap,
    /// Children in write order.
    pub children: Vec<ChildRecord>,
}

/// Contents of `dataset.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    /// Dataset attributes.
    pub attrs: AttrMap,
    /// Payload length in bytes.
    pub len: u64,
    /// Hex BLAKE3 digest of the payload.
    pub digest: String,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IoError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| IoError::Encode(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Loads a metadata file; `Ok(None)` when it does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, IoError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| IoError::Malformed {
            what: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// [`GroupWrite`] over one directory. Child records accumulate in memory
/// and land in `group.json` on [`GroupWrite::finish`].
struct DirGroupWriter {
    dir: PathBuf,
    path: DataPath,
    meta: GroupMeta,
}

impl DirGroupWriter {
    fn child(&self, name: &str) -> Result<(DataPath, PathBuf), IoError> {
        let path = self
            .path
            .child(name)
            .map_err(|e| IoError::graph(&self.path, e.into()))?;
        if self.meta.children.iter().any(|c| c.name == name) {
            return Err(IoError::DuplicateEntry {
                location: display_location(&path),
            });
        }
        if [GROUP_META, DATASET_META, PAYLOAD].contains(&name) {
            return Err(IoError::Encode(format!(
                "{}: name is reserved by the directory layout",
                display_location(&path)
            )));
        }
        let dir = self.dir.join(name);
        Ok((path, dir))
    }
}

impl GroupWrite for DirGroupWriter {
    fn path(&self) -> &DataPath {
        &self.path
    }

    fn set_attr(&mut self, key: &str, value: AttrValue) {
        self.meta.attrs.insert(key.to_owned(), value);
    }

    fn create_group(&mut self, name: &str, attrs: AttrMap) -> Result<Box<dyn GroupWrite + '_>, IoError> {
        let (path, dir) = self.child(name)?;
        fs::create_dir(&dir)?;
        self.meta.children.push(ChildRecord {
            name: name.to_owned(),
            kind: ChildKind::Group,
            target: None,
        });
        Ok(Box::new(DirGroupWriter {
            dir,
            path,
            meta: GroupMeta {
                attrs,
                children: Vec::new(),
            },
        }))
    }

    fn write_dataset(&mut self, name: &str, attrs: AttrMap, payload: &[u8]) -> Result<(), IoError> {
        let (_, dir) = self.child(name)?;
        fs::create_dir(&dir)?;
        fs::write(dir.join(PAYLOAD), payload)?;
        write_json(
            &dir.join(DATASET_META),
            &DatasetMeta {
                attrs,
                len: payload.len() as u64,
                digest: digest_hex(payload),
            },
        )?;
        self.meta.children.push(ChildRecord {
            name: name.to_owned(),
            kind: ChildKind::Dataset,
            target: None,
        });
        Ok(())
    }

    fn write_link(&mut self, name: &str, target: &DataPath) -> Result<(), IoError> {
        self.child(name)?;
        self.meta.children.push(ChildRecord {
            name: name.to_owned(),
            kind: ChildKind::Link,
            target: Some(target.to_string()),
        });
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), IoError> {
        write_json(&self.dir.join(GROUP_META), &self.meta)
    }
}

/// Writes `graph` as a new store at `dir`, which must be absent or empty.
pub fn write_dir(
    graph: &Graph,
    registry: &FactoryRegistry<Directory>,
    dir: &Path,
) -> Result<WriteSummary, IoError> {
    let open_err = |source: std::io::Error| IoError::Open {
        path: dir.display().to_string(),
        source,
    };
    fs::create_dir_all(dir).map_err(open_err)?;
    if fs::read_dir(dir).map_err(open_err)?.next().is_some() {
        return Err(open_err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "directory is not empty",
        )));
    }
    let mut root = Box::new(DirGroupWriter {
        dir: dir.to_path_buf(),
        path: DataPath::root(),
        meta: GroupMeta::default(),
    });
    let summary = write_graph(graph, registry, root.as_mut())?;
    root.finish()?;
    debug!(path = %dir.display(), "directory store written");
    Ok(summary)
}

/// Reads a graph from the store at `dir`.
pub fn read_dir(
    dir: &Path,
    registry: &FactoryRegistry<Directory>,
    options: ReadOptions,
) -> Result<Graph, IoError> {
    let store = DirStore {
        root: dir.to_path_buf(),
        verify: options.verify_digests,
    };
    let meta_path = dir.join(GROUP_META);
    let meta: GroupMeta = read_json(&meta_path)?.ok_or_else(|| IoError::Open {
        path: meta_path.display().to_string(),
        source: std::io::Error::new(ErrorKind::NotFound, "not a directory store"),
    })?;
    let root = DirEntry {
        store: &store,
        dir: dir.to_path_buf(),
        name: String::new(),
        path: DataPath::root(),
        meta: Meta::Group(meta),
    };
    read_graph(&root, registry, options)
}

struct DirStore {
    root: PathBuf,
    verify: bool,
}

impl DirStore {
    /// Loads whichever metadata file `dir` holds.
    fn load(&self, dir: &Path, path: &DataPath, expect: Option<ChildKind>) -> Result<Option<Meta>, IoError> {
        if expect != Some(ChildKind::Dataset) {
            if let Some(meta) = read_json::<GroupMeta>(&dir.join(GROUP_META))? {
                return Ok(Some(Meta::Group(meta)));
            }
        }
        if expect != Some(ChildKind::Group) {
            if let Some(meta) = read_json::<DatasetMeta>(&dir.join(DATASET_META))? {
                return Ok(Some(Meta::Dataset(meta)));
            }
        }
        debug!(location = %display_location(path), "no metadata file");
        Ok(None)
    }
}

enum Meta {
    Group(GroupMeta),
    Dataset(DatasetMeta),
}

struct DirEntry<'s> {
    store: &'s DirStore,
    dir: PathBuf,
    name: String,
    path: DataPath,
    meta: Meta,
}

impl EntryRead for DirEntry<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &DataPath {
        &self.path
    }

    fn attrs(&self) -> &AttrMap {
        match &self.meta {
            Meta::Group(g) => &g.attrs,
            Meta::Dataset(d) => &d.attrs,
        }
    }

    fn is_group(&self) -> bool {
        matches!(self.meta, Meta::Group(_))
    }

    fn children(&self) -> Result<Vec<Box<dyn EntryRead + '_>>, IoError> {
        let Meta::Group(group) = &self.meta else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Box<dyn EntryRead + '_>> = Vec::with_capacity(group.children.len());
        for record in &group.children {
            let here = self
                .path
                .child(&record.name)
                .map_err(|e| IoError::graph(&self.path, e.into()))?;
            let location = display_location(&here);
            let dangling = |target: &str| IoError::DanglingLink {
                location: location.clone(),
                target: target.to_owned(),
            };
            let (path, dir) = match record.kind {
                ChildKind::Group | ChildKind::Dataset => (here, self.dir.join(&record.name)),
                ChildKind::Link => {
                    let target = record.target.as_deref().unwrap_or_default();
                    let path = match target.parse::<DataPath>() {
                        Ok(path) if !path.is_root() => path,
                        _ => return Err(dangling(target)),
                    };
                    let dir = path.parts().iter().fold(self.store.root.clone(), |d, p| d.join(p));
                    (path, dir)
                }
            };
            let expect = (record.kind != ChildKind::Link).then_some(record.kind);
            let Some(meta) = self.store.load(&dir, &path, expect)? else {
                return Err(match record.kind {
                    ChildKind::Link => dangling(&path.to_string()),
                    _ => IoError::Malformed {
                        what: display_location(&path),
                        reason: "metadata file missing".into(),
                    },
                });
            };
            out.push(Box::new(DirEntry {
                store: self.store,
                dir,
                name: record.name.clone(),
                path,
                meta,
            }));
        }
        Ok(out)
    }

    fn payload_len(&self) -> u64 {
        match &self.meta {
            Meta::Group(_) => 0,
            Meta::Dataset(d) => d.len,
        }
    }

    fn read_payload(&self) -> Result<Vec<u8>, IoError> {
        let Meta::Dataset(d) = &self.meta else {
            return Err(IoError::Malformed {
                what: display_location(&self.path),
                reason: "groups have no payload".into(),
            });
        };
        let bytes = match fs::read(self.dir.join(PAYLOAD)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        verify_payload(&self.path, &bytes, d.len, &d.digest, self.store.verify)?;
        Ok(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::io::attrs;
    use crate::node::{DataArray, DataGroup};

    fn sample() -> Graph {
        let mut g = Graph::new();
        let a = g.create(None, "A", DataGroup::new()).unwrap();
        let b = g.create(None, "B", DataGroup::new()).unwrap();
        let x = g
            .create(Some(a), "x", DataArray::new(vec![2], vec![1], vec![7_u16, 9]).unwrap())
            .unwrap();
        g.set_additional_parent(x, Some(b)).unwrap();
        g
    }

    #[test]
    fn layout_records_links_as_child_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let summary = write_dir(&sample(), &FactoryRegistry::builtin(), &store).unwrap();
        assert_eq!(summary, WriteSummary { payloads: 3, edges: 4 });

        let b: GroupMeta = read_json(&store.join("B").join(GROUP_META)).unwrap().unwrap();
        assert_eq!(b.children[0].kind, ChildKind::Link);
        assert_eq!(b.children[0].target.as_deref(), Some("A/x"));
        assert!(!store.join("B").join("x").exists());
        assert_eq!(fs::read(store.join("A/x").join(PAYLOAD)).unwrap(), vec![7, 0, 9, 0]);

        let root: GroupMeta = read_json(&store.join(GROUP_META)).unwrap().unwrap();
        assert_eq!(root.attrs.get(attrs::NEXT_OBJECT_ID), Some(&AttrValue::U64(4)));
    }

    #[test]
    fn non_empty_target_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stray"), b"x").unwrap();
        let err = write_dir(&sample(), &FactoryRegistry::builtin(), dir.path()).unwrap_err();
        assert_eq!(err.code(), -6001);
    }

    #[test]
    fn missing_payload_file_is_truncation() {
        let dir = tempfile::tempdir().unwrap();
        write_dir(&sample(), &FactoryRegistry::builtin(), dir.path()).unwrap();
        fs::remove_file(dir.path().join("A/x").join(PAYLOAD)).unwrap();
        let reg = FactoryRegistry::builtin();
        let err = read_dir(dir.path(), &reg, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::Truncated { expected: 4, actual: 0, .. }), "{err}");
        assert!(read_dir(dir.path(), &reg, ReadOptions::preflight()).is_ok());
    }

    #[test]
    fn broken_link_is_dangling() {
        let dir = tempfile::tempdir().unwrap();
        write_dir(&sample(), &FactoryRegistry::builtin(), dir.path()).unwrap();
        let b_meta = dir.path().join("B").join(GROUP_META);
        let mut b: GroupMeta = read_json(&b_meta).unwrap().unwrap();
        b.children[0].target = Some("A/nothing".into());
        write_json(&b_meta, &b).unwrap();
        let err = read_dir(dir.path(), &FactoryRegistry::builtin(), ReadOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::DanglingLink { .. }), "{err}");
    }

    #[test]
    fn missing_store_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_dir(&dir.path().join("absent"), &FactoryRegistry::builtin(), ReadOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), -6001);
    }
}
