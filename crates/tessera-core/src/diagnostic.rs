// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Numeric-code-plus-message diagnostics.
//!
//! Validation never throws: preflight and the graph's aggregate validators
//! return lists of [`Diagnostic`]s so a single run surfaces every problem.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable diagnostic codes.
///
/// Codes are negative, grouped by concern. Persistence failures use the
/// `-6000` range and are produced by [`IoError::code`](crate::io::IoError::code).
pub mod codes {
    /// A required argument is missing.
    pub const MISSING_ARGUMENT: i32 = -1000;
    /// An argument has the wrong type.
    pub const ARGUMENT_TYPE: i32 = -1001;
    /// An argument value is outside its accepted range.
    pub const ARGUMENT_RANGE: i32 = -1002;

    /// A referenced path does not resolve.
    pub const PATH_NOT_FOUND: i32 = -2000;
    /// The parent container of a path to create does not exist.
    pub const PARENT_NOT_FOUND: i32 = -2001;
    /// A path to create already exists.
    pub const PATH_EXISTS: i32 = -2002;
    /// The node at a path is not an array.
    pub const NOT_AN_ARRAY: i32 = -2003;
    /// The node at a path cannot hold children.
    pub const NOT_A_CONTAINER: i32 = -2004;
    /// A name is invalid.
    pub const INVALID_NAME: i32 = -2005;
    /// A node is not a child of the given container.
    pub const NOT_A_CHILD: i32 = -2006;

    /// Arrays disagree on tuple count.
    pub const TUPLE_MISMATCH: i32 = -3000;
    /// An array shape is invalid.
    pub const INVALID_SHAPE: i32 = -3001;
    /// Arrays disagree on element type.
    pub const TYPE_MISMATCH: i32 = -3002;
    /// A value does not fit the target element type.
    pub const VALUE_OUT_OF_RANGE: i32 = -3003;

    /// Execution observed the cancellation flag.
    pub const CANCELLED: i32 = -4000;
    /// A mutation could not be applied.
    pub const MUTATION_FAILED: i32 = -4001;
    /// Storage expected to be present after the primary mutations is missing.
    pub const MISSING_STORAGE: i32 = -4002;

    /// No filter is registered under the requested name.
    pub const UNKNOWN_FILTER: i32 = -5000;

    /// Removing a shared node detaches it from every parent.
    pub const WARN_SHARED_REMOVAL: i32 = 100;
    /// Conversion may lose precision or saturate.
    pub const WARN_NARROWING: i32 = 101;
    /// A path is covered by another path in the same request.
    pub const WARN_REDUNDANT_PATH: i32 = 102;
}

/// One error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable numeric code (see [`codes`]).
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns a copy with `prefix` prepended to the message.
    #[must_use]
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self {
            code: self.code,
            message: format!("{prefix}{}", self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Ordered list of diagnostics.
pub type Diagnostics = Vec<Diagnostic>;

/// Value-or-errors plus warnings.
///
/// Warnings are kept on both the success and the failure path so callers
/// can show the full diagnostic set of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report<T> {
    /// Result value or the aggregated errors.
    pub result: Result<T, Diagnostics>,
    /// Non-fatal findings.
    pub warnings: Diagnostics,
}

impl<T> Report<T> {
    /// Successful report with no warnings.
    pub fn ok(value: T) -> Self {
        Self {
            result: Ok(value),
            warnings: Vec::new(),
        }
    }

    /// Failed report.
    pub fn fail(errors: Diagnostics) -> Self {
        Self {
            result: Err(errors),
            warnings: Vec::new(),
        }
    }

    /// Builds a report from collected errors: `Ok(value)` when `errors` is
    /// empty, `Err(errors)` otherwise.
    pub fn from_parts(value: T, errors: Diagnostics, warnings: Diagnostics) -> Self {
        let result = if errors.is_empty() {
            Ok(value)
        } else {
            Err(errors)
        };
        Self { result, warnings }
    }

    /// Attaches warnings.
    #[must_use]
    pub fn with_warnings(mut self, warnings: Diagnostics) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Returns `true` for the success path.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Errors, empty on success.
    #[must_use]
    pub fn errors(&self) -> &[Diagnostic] {
        match &self.result {
            Ok(_) => &[],
            Err(errors) => errors,
        }
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Report<U> {
        Report {
            result: self.result.map(f),
            warnings: self.warnings,
        }
    }
}

impl<T> From<Result<T, Diagnostics>> for Report<T> {
    fn from(result: Result<T, Diagnostics>) -> Self {
        Self {
            result,
            warnings: Vec::new(),
        }
    }
}
