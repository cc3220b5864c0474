// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Plain and tuple-constrained composite nodes.
use crate::container::Container;
use super::array::{checked_product, ShapeError};

/// Plain composite node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataGroup {
    pub(crate) children: Container,
}

impl DataGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct children.
    #[must_use]
    pub fn children(&self) -> &Container {
        &self.children
    }
}

/// Composite node whose array children all share one tuple shape.
///
/// The graph rejects inserting (or sharing) an array whose tuple count does
/// not equal [`AttributeMatrix::num_tuples`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMatrix {
    tuple_shape: Vec<usize>,
    num_tuples: usize,
    pub(crate) children: Container,
}

impl AttributeMatrix {
    /// Creates an empty matrix with the given tuple shape.
    ///
    /// Fails with [`ShapeError::TooLarge`] when the tuple count overflows.
    pub fn new(tuple_shape: Vec<usize>) -> Result<Self, ShapeError> {
        let num_tuples = checked_product(&tuple_shape).ok_or_else(|| ShapeError::TooLarge {
            shape: tuple_shape.clone(),
        })?;
        Ok(Self {
            tuple_shape,
            num_tuples,
            children: Container::new(),
        })
    }

    /// Tuple dimensions every child array must match.
    #[must_use]
    pub fn tuple_shape(&self) -> &[usize] {
        &self.tuple_shape
    }

    /// Number of tuples implied by the shape.
    #[must_use]
    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }

    /// Direct children.
    #[must_use]
    pub fn children(&self) -> &Container {
        &self.children
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tuple_count_is_checked_at_construction() {
        assert_eq!(AttributeMatrix::new(vec![2, 3]).unwrap().num_tuples(), 6);
        assert_eq!(AttributeMatrix::new(vec![usize::MAX, 0]).unwrap().num_tuples(), 0);
        assert_eq!(
            AttributeMatrix::new(vec![usize::MAX / 2, 4]),
            Err(ShapeError::TooLarge {
                shape: vec![usize::MAX / 2, 4]
            })
        );
    }
}
