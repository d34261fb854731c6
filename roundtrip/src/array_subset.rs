//! Array subsets.
//!
//! An [`ArraySubset`] represents a subset of an array or chunk.
//!
//! [`Array`](crate::array::Array) store and retrieve methods take an [`ArraySubset`] parameter,
//! and chunk grids express the chunks intersecting a subset as an [`ArraySubset`] of chunk indices.

use std::{fmt::Display, ops::Range};

use itertools::izip;
use thiserror::Error;

use crate::array::{ArrayIndices, ArrayShape};

/// An array subset.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ArraySubset {
    /// The start of the array subset.
    start: ArrayIndices,
    /// The shape of the array subset.
    shape: ArrayShape,
}

impl Display for ArraySubset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_ranges())
    }
}

impl<T: IntoIterator<Item = Range<u64>>> From<T> for ArraySubset {
    fn from(ranges: T) -> Self {
        let (start, shape) = ranges
            .into_iter()
            .map(|range| (range.start, range.end.saturating_sub(range.start)))
            .unzip();
        Self { start, shape }
    }
}

impl ArraySubset {
    /// Create a new array subset from a list of [`Range`]s.
    #[must_use]
    pub fn new_with_ranges(ranges: &[Range<u64>]) -> Self {
        Self::from(ranges.iter().cloned())
    }

    /// Create a new array subset with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create a new array subset.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the size of `start` and `shape` do not match.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(
                start.len(),
                shape.len(),
            ))
        }
    }

    /// Return the array subset as a vec of ranges.
    #[must_use]
    pub fn to_ranges(&self) -> Vec<Range<u64>> {
        std::iter::zip(&self.start, &self.shape)
            .map(|(&start, &size)| start..start + size)
            .collect()
    }

    /// Return the start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Returns if the array subset is empty (i.e. has a zero element in its shape).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|i| i == &0)
    }

    /// Return the dimensionality of the array subset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the end (exclusive) of the array subset.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// Return the number of elements of the array subset.
    ///
    /// Equal to the product of the components of its shape.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns [`true`] if the array subset contains `indices`.
    #[must_use]
    pub fn contains(&self, indices: &[u64]) -> bool {
        indices.len() == self.dimensionality()
            && izip!(indices, &self.start, &self.shape).all(|(&i, &o, &s)| i >= o && i < o + s)
    }

    /// Returns an iterator over the indices of elements within the subset, in C order.
    #[must_use]
    pub fn indices(&self) -> Indices {
        Indices::new(self.clone())
    }

    /// Return the overlapping subset between this array subset and `subset_other`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the dimensionality of `subset_other` does not match the dimensionality of this array subset.
    pub fn overlap(&self, subset_other: &Self) -> Result<Self, IncompatibleDimensionalityError> {
        if subset_other.dimensionality() == self.dimensionality() {
            let ranges = izip!(
                &self.start,
                &self.shape,
                subset_other.start(),
                subset_other.shape(),
            )
            .map(|(start, size, other_start, other_size)| {
                let overlap_start = *std::cmp::max(start, other_start);
                let overlap_end = std::cmp::min(start + size, other_start + other_size);
                overlap_start..overlap_end.max(overlap_start)
            });
            Ok(Self::from(ranges))
        } else {
            Err(IncompatibleDimensionalityError::new(
                subset_other.dimensionality(),
                self.dimensionality(),
            ))
        }
    }

    /// Return the subset relative to `offset`.
    ///
    /// Creates an array subset starting at [`ArraySubset::start()`] - `offset`.
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if the length of `offset` does not match the dimensionality of this array subset
    /// or `offset` is beyond the start of the subset.
    pub fn relative_to(&self, offset: &[u64]) -> Result<Self, ArraySubsetError> {
        if offset.len() != self.dimensionality() {
            Err(IncompatibleDimensionalityError::new(offset.len(), self.dimensionality()).into())
        } else if std::iter::zip(self.start(), offset).any(|(start, offset)| start < offset) {
            Err(IncompatibleOffsetError {
                offset: offset.to_vec(),
                start: self.start.clone(),
            }
            .into())
        } else {
            Ok(Self {
                start: std::iter::zip(self.start(), offset)
                    .map(|(start, offset)| start - offset)
                    .collect(),
                shape: self.shape.clone(),
            })
        }
    }

    /// Returns true if the array subset is within the bounds of an `ArraySubset` with zero origin and a shape of `array_shape`.
    #[must_use]
    pub fn inbounds_shape(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(self.start(), self.shape(), array_shape)
                .all(|(start, shape, array_shape)| start + shape <= *array_shape)
    }
}

/// An iterator over the multidimensional indices of the elements in an [`ArraySubset`].
///
/// A zero dimensional subset yields a single empty index.
#[derive(Clone, Debug)]
pub struct Indices {
    subset: ArraySubset,
    next: Option<ArrayIndices>,
}

impl Indices {
    fn new(subset: ArraySubset) -> Self {
        let next = if subset.is_empty() {
            None
        } else {
            Some(subset.start.clone())
        };
        Self { subset, next }
    }
}

impl Iterator for Indices {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut next = current.clone();
        for axis in (0..next.len()).rev() {
            next[axis] += 1;
            if next[axis] < self.subset.start[axis] + self.subset.shape[axis] {
                self.next = Some(next);
                return Some(current);
            }
            next[axis] = self.subset.start[axis];
        }
        // wrapped on every axis, so `current` was the last index
        Some(current)
    }
}

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An incompatible offset error.
#[derive(Clone, Debug, Error)]
#[error("incompatible offset {offset:?} for start {start:?}")]
pub struct IncompatibleOffsetError {
    offset: ArrayIndices,
    start: ArrayIndices,
}

/// Array subset errors.
#[derive(Clone, Debug, Error)]
pub enum ArraySubsetError {
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// An incompatible offset.
    #[error(transparent)]
    IncompatibleOffset(#[from] IncompatibleOffsetError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_subset() {
        let subset = ArraySubset::new_with_ranges(&[0..5, 0..5]);
        assert_eq!(subset.num_elements(), 25);
        assert_eq!(subset.end_exc(), vec![5, 5]);
        assert!(subset.contains(&[4, 4]));
        assert!(!subset.contains(&[5, 0]));
        assert!(!subset.contains(&[1]));
        assert!(subset.inbounds_shape(&[5, 5]));
        assert!(!subset.inbounds_shape(&[4, 5]));
        assert!(!subset.inbounds_shape(&[5, 5, 5]));
        assert_eq!(subset.to_string(), "[0..5, 0..5]");

        assert!(ArraySubset::new_with_start_shape(vec![0, 0], vec![1]).is_err());
        assert!(ArraySubset::new_with_ranges(&[0..0, 0..5]).is_empty());
    }

    #[test]
    fn array_subset_overlap() {
        let a = ArraySubset::new_with_ranges(&[0..4, 0..4]);
        let b = ArraySubset::new_with_ranges(&[2..6, 3..8]);
        assert_eq!(
            a.overlap(&b).unwrap(),
            ArraySubset::new_with_ranges(&[2..4, 3..4])
        );
        let c = ArraySubset::new_with_ranges(&[5..6, 0..1]);
        assert!(a.overlap(&c).unwrap().is_empty());
        assert!(a.overlap(&ArraySubset::new_with_ranges(&[0..1])).is_err());
    }

    #[test]
    fn array_subset_relative_to() {
        let subset = ArraySubset::new_with_ranges(&[2..4, 3..5]);
        assert_eq!(
            subset.relative_to(&[2, 2]).unwrap(),
            ArraySubset::new_with_ranges(&[0..2, 1..3])
        );
        assert!(subset.relative_to(&[3, 0]).is_err());
        assert!(subset.relative_to(&[0]).is_err());
    }

    #[test]
    fn array_subset_iter_indices() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        let expected = vec![vec![1, 1], vec![1, 2], vec![2, 1], vec![2, 2]];
        assert_eq!(subset.indices().collect::<Vec<_>>(), expected);

        let scalar = ArraySubset::new_with_shape(vec![]);
        assert_eq!(scalar.indices().collect::<Vec<_>>(), vec![Vec::<u64>::new()]);

        let empty = ArraySubset::new_with_ranges(&[0..2, 3..3]);
        assert_eq!(empty.indices().count(), 0);
    }
}
