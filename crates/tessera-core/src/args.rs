// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filter arguments.
//!
//! Arguments are a name-keyed bag of tagged values. Filters publish their
//! defaults; callers override a subset; typed accessors turn a missing or
//! mistyped entry into an [`ArgumentError`] that converts into a
//! [`Diagnostic`].
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostic::{codes, Diagnostic};
use crate::ident::DataPath;
use crate::node::DataType;

/// One argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    /// Flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Free text.
    Text(String),
    /// Single data path.
    Path(DataPath),
    /// List of data paths.
    Paths(Vec<DataPath>),
    /// Element type.
    DataType(DataType),
    /// Dimension list.
    Shape(Vec<usize>),
}

impl ArgValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Path(_) => "path",
            Self::Paths(_) => "paths",
            Self::DataType(_) => "data_type",
            Self::Shape(_) => "shape",
        }
    }
}

/// Error from a typed argument accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// No value under this key.
    #[error("missing argument {0:?}")]
    Missing(String),
    /// The value has a different type.
    #[error("argument {key:?} is a {found}, expected {expected}")]
    WrongType {
        /// Argument key.
        key: String,
        /// Requested type.
        expected: &'static str,
        /// Stored type.
        found: &'static str,
    },
}

impl From<ArgumentError> for Diagnostic {
    fn from(err: ArgumentError) -> Self {
        let code = match err {
            ArgumentError::Missing(_) => codes::MISSING_ARGUMENT,
            ArgumentError::WrongType { .. } => codes::ARGUMENT_TYPE,
        };
        Self::new(code, err.to_string())
    }
}

/// Name-keyed argument bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, ArgValue>);

macro_rules! accessor {
    ($fn:ident, $variant:ident, $ret:ty, $kind:literal, |$v:ident| $conv:expr) => {
        #[doc = concat!("Reads a `", $kind, "` argument.")]
        pub fn $fn(&self, key: &str) -> Result<$ret, ArgumentError> {
            match self.0.get(key) {
                None => Err(ArgumentError::Missing(key.to_owned())),
                Some(ArgValue::$variant($v)) => Ok($conv),
                Some(other) => Err(ArgumentError::WrongType {
                    key: key.to_owned(),
                    expected: $kind,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl Arguments {
    /// Empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: ArgValue) -> Self {
        self.0.insert(key.to_owned(), value);
        self
    }

    /// Inserts or replaces a value.
    pub fn set(&mut self, key: &str, value: ArgValue) {
        self.0.insert(key.to_owned(), value);
    }

    /// Raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    /// Returns `self` with every key of `defaults` that `self` lacks filled in.
    #[must_use]
    pub fn merged_over(&self, defaults: &Self) -> Self {
        let mut out = defaults.clone();
        for (k, v) in &self.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    accessor!(bool, Bool, bool, "bool", |v| *v);
    accessor!(text, Text, &str, "text", |v| v.as_str());
    accessor!(path, Path, &DataPath, "path", |v| v);
    accessor!(paths, Paths, &[DataPath], "paths", |v| v.as_slice());
    accessor!(data_type, DataType, DataType, "data_type", |v| *v);
    accessor!(shape, Shape, &[usize], "shape", |v| v.as_slice());

    /// Reads an integer argument.
    pub fn int(&self, key: &str) -> Result<i64, ArgumentError> {
        match self.0.get(key) {
            None => Err(ArgumentError::Missing(key.to_owned())),
            Some(ArgValue::Int(v)) => Ok(*v),
            Some(other) => Err(ArgumentError::WrongType {
                key: key.to_owned(),
                expected: "int",
                found: other.kind(),
            }),
        }
    }

    /// Reads a float argument; integers widen.
    pub fn float(&self, key: &str) -> Result<f64, ArgumentError> {
        match self.0.get(key) {
            None => Err(ArgumentError::Missing(key.to_owned())),
            Some(ArgValue::Float(v)) => Ok(*v),
            Some(ArgValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(ArgumentError::WrongType {
                key: key.to_owned(),
                expected: "float",
                found: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn accessors_report_missing_and_wrong_type() {
        let args = Arguments::new().with("n", ArgValue::Int(3));
        assert_eq!(args.int("n"), Ok(3));
        assert_eq!(args.float("n"), Ok(3.0));
        assert_eq!(args.text("x"), Err(ArgumentError::Missing("x".into())));
        let err = args.bool("n").unwrap_err();
        assert_eq!(Diagnostic::from(err).code, codes::ARGUMENT_TYPE);
    }

    #[test]
    fn overrides_win_over_defaults() {
        let defaults = Arguments::new()
            .with("a", ArgValue::Int(1))
            .with("b", ArgValue::Bool(false));
        let args = Arguments::new().with("b", ArgValue::Bool(true));
        let merged = args.merged_over(&defaults);
        assert_eq!(merged.int("a"), Ok(1));
        assert_eq!(merged.bool("b"), Ok(true));
    }

    #[test]
    fn json_shape_is_tagged() {
        let args = Arguments::new().with("p", ArgValue::Path("a/b".parse().unwrap()));
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"p":{"type":"path","value":"a/b"}}"#);
        let back: Arguments = serde_json::from_str(&json).unwrap();
        assert_eq!(back, args);
    }
}
