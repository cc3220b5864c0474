// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed array payloads.
//!
//! A [`DataArray`] is a flat buffer of one element type, viewed as
//! `tuples x components`. The buffer is optional: a shape-only array (no
//! values) is what preflight-mode mutations and preflight reads produce, so
//! structure can be inspected without paying for the payload.
//!
//! Persisted payload bytes are always little-endian regardless of host.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Element type of a [`DataArray`] or [`ScalarData`](super::ScalarData).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Boolean, persisted as one byte per element.
    Bool,
}

impl DataType {
    /// Every supported element type, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
        Self::Bool,
    ];

    /// Canonical lower-case name, as persisted in the `DataType` attribute.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
        }
    }

    /// Size of one persisted element in bytes.
    #[must_use]
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::Bool => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Returns `true` for the two floating-point types.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Inclusive value range representable by this type, as `f64`.
    ///
    /// 64-bit integer bounds are rounded to the nearest `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
    pub fn range(self) -> (f64, f64) {
        match self {
            Self::Int8 => (i8::MIN as f64, i8::MAX as f64),
            Self::UInt8 => (0.0, u8::MAX as f64),
            Self::Int16 => (i16::MIN as f64, i16::MAX as f64),
            Self::UInt16 => (0.0, u16::MAX as f64),
            Self::Int32 => (i32::MIN as f64, i32::MAX as f64),
            Self::UInt32 => (0.0, u32::MAX as f64),
            Self::Int64 => (i64::MIN as f64, i64::MAX as f64),
            Self::UInt64 => (0.0, u64::MAX as f64),
            Self::Float32 => (f32::MIN as f64, f32::MAX as f64),
            Self::Float64 => (f64::MIN, f64::MAX),
            Self::Bool => (0.0, 1.0),
        }
    }

    /// Returns `true` when `value` is exactly representable in range
    /// (integers must also be whole numbers).
    #[must_use]
    pub fn accepts(self, value: f64) -> bool {
        if !value.is_finite() {
            return self.is_float();
        }
        let (lo, hi) = self.range();
        if value < lo || value > hi {
            return false;
        }
        self.is_float() || value.fract() == 0.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown [`DataType`] name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown data type {0:?}")]
pub struct UnknownDataType(pub String);

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| UnknownDataType(s.to_owned()))
    }
}

/// Shape and payload validation failures for arrays.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// A shape has no dimensions.
    #[error("{0} shape must have at least one dimension")]
    EmptyShape(&'static str),
    /// A component dimension is zero.
    #[error("component dimensions must be non-zero")]
    ZeroComponent,
    /// Buffer length does not match `tuples * components`.
    #[error("buffer holds {actual} elements, shape requires {expected}")]
    LengthMismatch {
        /// Element count implied by the shape.
        expected: usize,
        /// Element count actually supplied.
        actual: usize,
    },
    /// Buffer element type does not match the array's declared type.
    #[error("buffer type {actual} does not match array type {expected}")]
    TypeMismatch {
        /// Declared array element type.
        expected: DataType,
        /// Element type of the supplied buffer.
        actual: DataType,
    },
    /// Persisted bytes are not a whole number of elements.
    #[error("{len} bytes is not a multiple of element size {size}")]
    RaggedBytes {
        /// Byte length supplied.
        len: usize,
        /// Element size for the declared type.
        size: usize,
    },
    /// Persisted string payload is malformed.
    #[error("malformed string payload")]
    MalformedStrings,
    /// The shape's element count or byte size does not fit in memory.
    #[error("shape {shape:?} is too large to address")]
    TooLarge {
        /// Offending dimensions, tuple then component.
        shape: Vec<usize>,
    },
}

/// Rust element type that can live in an [`ArrayValues`] buffer.
pub trait Element: Copy + PartialEq + fmt::Debug + Default + Send + Sync + 'static {
    /// Matching runtime type tag.
    const DTYPE: DataType;

    /// Borrows the buffer as `&[Self]` if it holds this element type.
    fn slice(values: &ArrayValues) -> Option<&[Self]>;
    /// Borrows the buffer as `&mut [Self]` if it holds this element type.
    fn slice_mut(values: &mut ArrayValues) -> Option<&mut [Self]>;
    /// Wraps a vector of this element type.
    fn wrap(values: Vec<Self>) -> ArrayValues;
    /// Widens to `f64` (lossy above 2^53 for 64-bit integers).
    fn to_f64(self) -> f64;
    /// Narrows from `f64` with saturating `as` semantics.
    fn from_f64(value: f64) -> Self;
}

macro_rules! numeric_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DataType = DataType::$variant;

            fn slice(values: &ArrayValues) -> Option<&[Self]> {
                match values {
                    ArrayValues::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(values: &mut ArrayValues) -> Option<&mut [Self]> {
                match values {
                    ArrayValues::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> ArrayValues {
                ArrayValues::$variant(values)
            }

            #[allow(
                clippy::cast_lossless,
                clippy::cast_precision_loss,
                clippy::unnecessary_cast
            )]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::unnecessary_cast
            )]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

numeric_element!(i8, Int8);
numeric_element!(u8, UInt8);
numeric_element!(i16, Int16);
numeric_element!(u16, UInt16);
numeric_element!(i32, Int32);
numeric_element!(u32, UInt32);
numeric_element!(i64, Int64);
numeric_element!(u64, UInt64);
numeric_element!(f32, Float32);
numeric_element!(f64, Float64);

impl Element for bool {
    const DTYPE: DataType = DataType::Bool;

    fn slice(values: &ArrayValues) -> Option<&[Self]> {
        match values {
            ArrayValues::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(values: &mut ArrayValues) -> Option<&mut [Self]> {
        match values {
            ArrayValues::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn wrap(values: Vec<Self>) -> ArrayValues {
        ArrayValues::Bool(values)
    }

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }
}

/// Runs `$body` with `$T` bound to the Rust element type for `$dtype`.
///
/// ```ignore
/// let n = dispatch_dtype!(dtype, T => std::mem::size_of::<T>());
/// ```
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::DataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::DataType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::DataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::DataType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::DataType::Bool => {
                type $T = bool;
                $body
            }
        }
    };
}

/// Owned element buffer of one runtime element type.
///
/// Every variant owns its storage; cloning an `ArrayValues` never shares a
/// buffer with the original.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    /// `i8` elements.
    Int8(Vec<i8>),
    /// `u8` elements.
    UInt8(Vec<u8>),
    /// `i16` elements.
    Int16(Vec<i16>),
    /// `u16` elements.
    UInt16(Vec<u16>),
    /// `i32` elements.
    Int32(Vec<i32>),
    /// `u32` elements.
    UInt32(Vec<u32>),
    /// `i64` elements.
    Int64(Vec<i64>),
    /// `u64` elements.
    UInt64(Vec<u64>),
    /// `f32` elements.
    Float32(Vec<f32>),
    /// `f64` elements.
    Float64(Vec<f64>),
    /// `bool` elements.
    Bool(Vec<bool>),
}

macro_rules! each_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            ArrayValues::Int8($v) => $body,
            ArrayValues::UInt8($v) => $body,
            ArrayValues::Int16($v) => $body,
            ArrayValues::UInt16($v) => $body,
            ArrayValues::Int32($v) => $body,
            ArrayValues::UInt32($v) => $body,
            ArrayValues::Int64($v) => $body,
            ArrayValues::UInt64($v) => $body,
            ArrayValues::Float32($v) => $body,
            ArrayValues::Float64($v) => $body,
            ArrayValues::Bool($v) => $body,
        }
    };
}

impl ArrayValues {
    /// Allocates `len` elements of `dtype`, each set to `init` (cast).
    #[must_use]
    pub fn filled(dtype: DataType, len: usize, init: f64) -> Self {
        dispatch_dtype!(dtype, T => T::wrap(vec![T::from_f64(init); len]))
    }

    /// Runtime element type of this buffer.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::UInt8(_) => DataType::UInt8,
            Self::Int16(_) => DataType::Int16,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Bool(_) => DataType::Bool,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        each_values!(self, v => v.len())
    }

    /// Returns `true` when the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads element `index` widened to `f64`.
    #[must_use]
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        each_values!(self, v => v.get(index).map(|x| Element::to_f64(*x)))
    }

    /// Writes element `index` from an `f64` (saturating cast). Returns
    /// `false` when `index` is out of bounds.
    pub fn set_f64(&mut self, index: usize, value: f64) -> bool {
        each_values!(self, v => match v.get_mut(index) {
            Some(slot) => {
                *slot = Element::from_f64(value);
                true
            }
            None => false,
        })
    }

    /// Encodes the buffer as little-endian bytes.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bool(v) => v.iter().map(|b| u8::from(*b)).collect(),
            Self::Int8(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::UInt8(v) => v.clone(),
            Self::Int16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::UInt16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Int32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::UInt32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Int64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::UInt64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Float32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Float64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }

    /// Decodes little-endian bytes into a buffer of `dtype`.
    pub fn from_le_bytes(dtype: DataType, bytes: &[u8]) -> Result<Self, ShapeError> {
        let size = dtype.byte_size();
        if bytes.len() % size != 0 {
            return Err(ShapeError::RaggedBytes {
                len: bytes.len(),
                size,
            });
        }
        macro_rules! decode {
            ($t:ty, $variant:ident) => {
                Self::$variant(
                    bytes
                        .chunks_exact(size)
                        .map(|c| {
                            let mut raw = [0u8; std::mem::size_of::<$t>()];
                            raw.copy_from_slice(c);
                            <$t>::from_le_bytes(raw)
                        })
                        .collect(),
                )
            };
        }
        Ok(match dtype {
            DataType::Bool => Self::Bool(bytes.iter().map(|b| *b != 0).collect()),
            DataType::UInt8 => Self::UInt8(bytes.to_vec()),
            DataType::Int8 => decode!(i8, Int8),
            DataType::Int16 => decode!(i16, Int16),
            DataType::UInt16 => decode!(u16, UInt16),
            DataType::Int32 => decode!(i32, Int32),
            DataType::UInt32 => decode!(u32, UInt32),
            DataType::Int64 => decode!(i64, Int64),
            DataType::UInt64 => decode!(u64, UInt64),
            DataType::Float32 => decode!(f32, Float32),
            DataType::Float64 => decode!(f64, Float64),
        })
    }
}

/// Product of `shape`, or `None` on overflow. Any zero dimension makes the
/// product zero regardless of the order of the others.
#[must_use]
pub fn checked_product(shape: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape.iter().try_fold(1_usize, |acc, d| acc.checked_mul(*d))
}

fn too_large(tuple_shape: &[usize], component_shape: &[usize]) -> ShapeError {
    ShapeError::TooLarge {
        shape: tuple_shape.iter().chain(component_shape).copied().collect(),
    }
}

/// Element count of a `tuple_shape x component_shape` array.
///
/// Fails with [`ShapeError::TooLarge`] when the count, or its size in bytes
/// for `dtype`, exceeds what a buffer can hold.
pub fn element_count(
    dtype: DataType,
    tuple_shape: &[usize],
    component_shape: &[usize],
) -> Result<usize, ShapeError> {
    let elements = checked_product(tuple_shape)
        .zip(checked_product(component_shape))
        .and_then(|(t, c)| t.checked_mul(c))
        .filter(|n| {
            n.checked_mul(dtype.byte_size())
                .is_some_and(|bytes| isize::try_from(bytes).is_ok())
        });
    elements.ok_or_else(|| too_large(tuple_shape, component_shape))
}

/// Products of shapes that passed [`check_shapes`] never overflow.
fn product(shape: &[usize]) -> usize {
    checked_product(shape).unwrap_or(usize::MAX)
}

fn check_shapes(
    dtype: DataType,
    tuple_shape: &[usize],
    component_shape: &[usize],
) -> Result<usize, ShapeError> {
    if tuple_shape.is_empty() {
        return Err(ShapeError::EmptyShape("tuple"));
    }
    if component_shape.is_empty() {
        return Err(ShapeError::EmptyShape("component"));
    }
    if component_shape.contains(&0) {
        return Err(ShapeError::ZeroComponent);
    }
    element_count(dtype, tuple_shape, component_shape)
}

/// Typed n-dimensional array node payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    dtype: DataType,
    tuple_shape: Vec<usize>,
    component_shape: Vec<usize>,
    values: Option<ArrayValues>,
}

impl DataArray {
    /// Builds an array from a typed buffer.
    pub fn new<T: Element>(
        tuple_shape: Vec<usize>,
        component_shape: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self, ShapeError> {
        Self::from_values(tuple_shape, component_shape, T::wrap(values))
    }

    /// Builds an array from an untyped buffer.
    pub fn from_values(
        tuple_shape: Vec<usize>,
        component_shape: Vec<usize>,
        values: ArrayValues,
    ) -> Result<Self, ShapeError> {
        let expected = check_shapes(values.dtype(), &tuple_shape, &component_shape)?;
        if values.len() != expected {
            return Err(ShapeError::LengthMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            dtype: values.dtype(),
            tuple_shape,
            component_shape,
            values: Some(values),
        })
    }

    /// Allocates an array with every element set to `init`.
    pub fn filled(
        dtype: DataType,
        tuple_shape: Vec<usize>,
        component_shape: Vec<usize>,
        init: f64,
    ) -> Result<Self, ShapeError> {
        let len = check_shapes(dtype, &tuple_shape, &component_shape)?;
        Ok(Self {
            dtype,
            tuple_shape,
            component_shape,
            values: Some(ArrayValues::filled(dtype, len, init)),
        })
    }

    /// Describes an array without allocating its payload.
    pub fn shape_only(
        dtype: DataType,
        tuple_shape: Vec<usize>,
        component_shape: Vec<usize>,
    ) -> Result<Self, ShapeError> {
        check_shapes(dtype, &tuple_shape, &component_shape)?;
        Ok(Self {
            dtype,
            tuple_shape,
            component_shape,
            values: None,
        })
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Tuple dimensions.
    #[must_use]
    pub fn tuple_shape(&self) -> &[usize] {
        &self.tuple_shape
    }

    /// Component dimensions.
    #[must_use]
    pub fn component_shape(&self) -> &[usize] {
        &self.component_shape
    }

    /// Number of tuples (product of the tuple shape).
    #[must_use]
    pub fn num_tuples(&self) -> usize {
        product(&self.tuple_shape)
    }

    /// Number of components per tuple.
    #[must_use]
    pub fn num_components(&self) -> usize {
        product(&self.component_shape)
    }

    /// Total element count implied by the shape.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_tuples().saturating_mul(self.num_components())
    }

    /// Returns `true` when the shape implies no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when the payload is present.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.values.is_some()
    }

    /// Payload buffer, absent for shape-only arrays.
    #[must_use]
    pub fn values(&self) -> Option<&ArrayValues> {
        self.values.as_ref()
    }

    /// Writes element `index` from an `f64` (saturating cast). Returns
    /// `false` when the payload is unallocated or `index` is out of bounds.
    pub fn set_f64(&mut self, index: usize, value: f64) -> bool {
        self.values
            .as_mut()
            .is_some_and(|values| values.set_f64(index, value))
    }

    /// Typed view of the payload.
    #[must_use]
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        self.values.as_ref().and_then(T::slice)
    }

    /// Typed mutable view of the payload.
    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        self.values.as_mut().and_then(T::slice_mut)
    }

    /// Installs a payload, checking type and length against the shape.
    pub fn set_values(&mut self, values: ArrayValues) -> Result<(), ShapeError> {
        if values.dtype() != self.dtype {
            return Err(ShapeError::TypeMismatch {
                expected: self.dtype,
                actual: values.dtype(),
            });
        }
        if values.len() != self.len() {
            return Err(ShapeError::LengthMismatch {
                expected: self.len(),
                actual: values.len(),
            });
        }
        self.values = Some(values);
        Ok(())
    }

    /// Drops the payload, keeping the shape.
    pub fn clear_values(&mut self) {
        self.values = None;
    }
}

/// One string per tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringArray {
    num_tuples: usize,
    values: Option<Vec<String>>,
}

impl StringArray {
    /// Builds a populated string array.
    #[must_use]
    pub fn new(values: Vec<String>) -> Self {
        Self {
            num_tuples: values.len(),
            values: Some(values),
        }
    }

    /// Describes a string array without its payload.
    #[must_use]
    pub fn shape_only(num_tuples: usize) -> Self {
        Self {
            num_tuples,
            values: None,
        }
    }

    /// Number of tuples (strings).
    #[must_use]
    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }

    /// Payload, absent for shape-only arrays.
    #[must_use]
    pub fn values(&self) -> Option<&[String]> {
        self.values.as_deref()
    }

    /// Mutable payload. The tuple count is fixed by the shape.
    pub fn values_mut(&mut self) -> Option<&mut [String]> {
        self.values.as_deref_mut()
    }

    /// Encodes as a sequence of `u32` little-endian length-prefixed UTF-8 strings.
    #[must_use]
    pub fn encode(values: &[String]) -> Vec<u8> {
        let mut out = Vec::new();
        for s in values {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        out
    }

    /// Decodes the format produced by [`StringArray::encode`].
    pub fn decode(mut bytes: &[u8]) -> Result<Vec<String>, ShapeError> {
        let mut out = Vec::new();
        while !bytes.is_empty() {
            let Some((len_raw, rest)) = bytes.split_first_chunk::<4>() else {
                return Err(ShapeError::MalformedStrings);
            };
            let len = u32::from_le_bytes(*len_raw) as usize;
            if rest.len() < len {
                return Err(ShapeError::MalformedStrings);
            }
            let (s, rest) = rest.split_at(len);
            let s = std::str::from_utf8(s).map_err(|_| ShapeError::MalformedStrings)?;
            out.push(s.to_owned());
            bytes = rest;
        }
        Ok(out)
    }
}

/// Single typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarData {
    value: ArrayValues,
}

impl ScalarData {
    /// Wraps one typed value.
    #[must_use]
    pub fn new<T: Element>(value: T) -> Self {
        Self {
            value: T::wrap(vec![value]),
        }
    }

    /// Builds a scalar of `dtype` from an `f64` (saturating cast).
    #[must_use]
    pub fn from_f64(dtype: DataType, value: f64) -> Self {
        Self {
            value: ArrayValues::filled(dtype, 1, value),
        }
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        self.value.dtype()
    }

    /// Typed value, if `T` matches the element type.
    #[must_use]
    pub fn get<T: Element>(&self) -> Option<T> {
        T::slice(&self.value).and_then(|s| s.first().copied())
    }

    /// Value widened to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.value.get_f64(0).unwrap_or_default()
    }

    /// Replaces the value, keeping the element type.
    pub fn set_f64(&mut self, value: f64) {
        self.value.set_f64(0, value);
    }

    /// Little-endian encoding of the value.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.value.to_le_bytes()
    }

    /// Decodes one value of `dtype`.
    pub fn from_le_bytes(dtype: DataType, bytes: &[u8]) -> Result<Self, ShapeError> {
        let value = ArrayValues::from_le_bytes(dtype, bytes)?;
        if value.len() != 1 {
            return Err(ShapeError::LengthMismatch {
                expected: 1,
                actual: value.len(),
            });
        }
        Ok(Self { value })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn le_bytes_round_trip_every_type() {
        for dtype in DataType::ALL {
            let mut values = ArrayValues::filled(dtype, 4, 1.0);
            values.set_f64(2, 0.0);
            let bytes = values.to_le_bytes();
            assert_eq!(bytes.len(), 4 * dtype.byte_size());
            let back = ArrayValues::from_le_bytes(dtype, &bytes).unwrap();
            assert_eq!(back, values, "{dtype}");
        }
    }

    #[test]
    fn ragged_bytes_are_rejected() {
        let err = ArrayValues::from_le_bytes(DataType::Float32, &[0u8; 7]).unwrap_err();
        assert_eq!(err, ShapeError::RaggedBytes { len: 7, size: 4 });
    }

    #[test]
    fn shape_checks_buffer_length() {
        let err = DataArray::new(vec![3], vec![2], vec![0f32; 5]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::LengthMismatch {
                expected: 6,
                actual: 5
            }
        );
        let ok = DataArray::new(vec![3], vec![2], vec![0f32; 6]).unwrap();
        assert_eq!(ok.num_tuples(), 3);
        assert_eq!(ok.num_components(), 2);
        assert_eq!(ok.as_slice::<f32>().map(<[f32]>::len), Some(6));
        assert!(ok.as_slice::<f64>().is_none());
    }

    #[test]
    fn overflowing_shapes_are_rejected() {
        let huge = DataArray::shape_only(DataType::Float32, vec![usize::MAX / 2, 4], vec![1]);
        assert!(matches!(huge, Err(ShapeError::TooLarge { .. })), "{huge:?}");
        // fits in usize elements but not in bytes
        let wide = DataArray::shape_only(DataType::Float64, vec![usize::MAX / 4], vec![1]);
        assert!(matches!(wide, Err(ShapeError::TooLarge { .. })), "{wide:?}");
        // a zero tuple dimension wins over an overflowing neighbour
        let empty = DataArray::shape_only(DataType::UInt8, vec![usize::MAX, usize::MAX, 0], vec![1]).unwrap();
        assert_eq!(empty.len(), 0);
        assert_eq!(checked_product(&[usize::MAX, 2]), None);
        assert_eq!(element_count(DataType::Int16, &[3, 4], &[2]), Ok(24));
    }

    #[test]
    fn shape_only_has_no_payload() {
        let arr = DataArray::shape_only(DataType::UInt16, vec![10, 2], vec![1]).unwrap();
        assert!(!arr.is_allocated());
        assert_eq!(arr.len(), 20);
    }

    #[test]
    fn data_type_range_checks() {
        assert!(DataType::UInt8.accepts(255.0));
        assert!(!DataType::UInt8.accepts(256.0));
        assert!(!DataType::Int32.accepts(0.5));
        assert!(DataType::Float32.accepts(0.5));
        assert!(DataType::Float64.accepts(f64::NAN));
        assert_eq!("float64".parse::<DataType>(), Ok(DataType::Float64));
    }

    #[test]
    fn strings_round_trip() {
        let values = vec!["alpha".to_owned(), String::new(), "γ".to_owned()];
        let bytes = StringArray::encode(&values);
        assert_eq!(StringArray::decode(&bytes).unwrap(), values);
        assert_eq!(
            StringArray::decode(&bytes[..bytes.len() - 1]),
            Err(ShapeError::MalformedStrings)
        );
    }

    #[test]
    fn scalar_keeps_its_type() {
        let s = ScalarData::new(7u16);
        assert_eq!(s.dtype(), DataType::UInt16);
        assert_eq!(s.get::<u16>(), Some(7));
        assert_eq!(s.get::<i16>(), None);
        assert_eq!(s.as_f64(), 7.0);
    }
}
