// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and path utilities.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strongly typed identifier for a node in a [`Graph`](crate::Graph).
///
/// Ids are allocated by the owning graph from a monotonic counter and are
/// never reused for the life of that graph, including across a persist and
/// reload cycle (the allocator value is persisted with the graph).
///
/// `NodeId(0)` is never allocated; it is reserved as [`NodeId::ROOT`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Sentinel naming the graph's root container in parent sets.
    pub const ROOT: Self = Self(0);

    /// First id handed out by a fresh allocator.
    pub const FIRST: Self = Self(1);

    /// Returns the raw integer value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error returned when parsing a [`DataPath`] or validating a node name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A path or name component is empty.
    #[error("empty path component")]
    EmptyComponent,
    /// A name contains the path separator.
    #[error("name {0:?} contains '/'")]
    ContainsSeparator(String),
    /// A name is `.` or `..`.
    #[error("name {0:?} is reserved")]
    Reserved(String),
}

/// Validates a single node name.
///
/// Names are unique among siblings only. They may not be empty and may not
/// contain the `/` separator used by [`DataPath`]; `.` and `..` are reserved.
pub fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::EmptyComponent);
    }
    if name == "." || name == ".." {
        return Err(PathError::Reserved(name.to_owned()));
    }
    if name.contains('/') {
        return Err(PathError::ContainsSeparator(name.to_owned()));
    }
    Ok(())
}

/// Name-based address of a node: the chain of sibling-unique names from the
/// root container down to the node.
///
/// Under sharing a node can be reachable through several paths; any of them
/// resolves to the same [`NodeId`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataPath(Vec<String>);

impl DataPath {
    /// The empty path, naming the root container itself.
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from components, validating each one.
    pub fn from_parts<I, S>(parts: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        for part in &parts {
            validate_name(part)?;
        }
        Ok(Self(parts))
    }

    /// Returns the path components.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the final component, if any.
    #[must_use]
    pub fn target_name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns the path with the final component removed.
    ///
    /// The parent of the root is the root.
    #[must_use]
    pub fn parent(&self) -> Self {
        let mut parts = self.0.clone();
        parts.pop();
        Self(parts)
    }

    /// Returns a new path with `name` appended.
    pub fn child(&self, name: &str) -> Result<Self, PathError> {
        validate_name(name)?;
        let mut parts = self.0.clone();
        parts.push(name.to_owned());
        Ok(Self(parts))
    }

    /// Returns a sibling path (same parent, different final component).
    pub fn with_name(&self, name: &str) -> Result<Self, PathError> {
        self.parent().child(name)
    }

    /// Returns `true` when `self` is `other` or lies beneath it.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl FromStr for DataPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_parts(trimmed.split('/'))
    }
}

impl TryFrom<String> for DataPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataPath> for String {
    fn from(value: DataPath) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let path: DataPath = "Image/Cell Data/Phases".parse().unwrap();
        assert_eq!(path.parts().len(), 3);
        assert_eq!(path.target_name(), Some("Phases"));
        assert_eq!(path.to_string(), "Image/Cell Data/Phases");
        assert_eq!(path.parent().to_string(), "Image/Cell Data");
    }

    #[test]
    fn empty_string_is_root() {
        let path: DataPath = "/".parse().unwrap();
        assert!(path.is_root());
        assert!(path.parent().is_root());
    }

    #[test]
    fn empty_inner_component_is_rejected() {
        assert_eq!(
            "a//b".parse::<DataPath>(),
            Err(PathError::EmptyComponent)
        );
        assert!(matches!(
            DataPath::root().child("x/y"),
            Err(PathError::ContainsSeparator(_))
        ));
    }

    #[test]
    fn prefix_check_respects_components() {
        let a: DataPath = "Group/Array".parse().unwrap();
        let g: DataPath = "Group".parse().unwrap();
        let gr: DataPath = "Gro".parse().unwrap();
        assert!(a.starts_with(&g));
        assert!(!a.starts_with(&gr));
    }
}
