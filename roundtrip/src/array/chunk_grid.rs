//! The `regular` chunk grid.
//!
//! See <https://zarr-specs.readthedocs.io/en/latest/v3/chunk-grids/regular-grid/index.html>.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ArrayCreateError, ArrayIndices, ArrayShape};
use crate::{
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
    metadata::MetadataV3,
};

const REGULAR: &str = "regular";

/// The default target number of elements per chunk.
pub const DEFAULT_CHUNK_TARGET_ELEMENTS: u64 = 65536;

/// The shape of a chunk. All dimensions must be non-zero.
pub type ChunkShape = Vec<NonZeroU64>;

/// Configuration parameters for a `regular` chunk grid.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegularChunkGridConfiguration {
    /// The chunk shape.
    pub chunk_shape: ChunkShape,
}

/// A `regular` chunk grid.
///
/// Every chunk has the same shape. Chunks on the upper boundary of the array extend past it,
/// and their elements outside of the array are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularChunkGrid {
    chunk_shape: ChunkShape,
}

/// A [`RegularChunkGrid`] creation error.
#[derive(Clone, Debug, Error)]
#[error("invalid regular chunk shape {0:?}, all elements must be non-zero")]
pub struct RegularChunkGridCreateError(ArrayShape);

impl RegularChunkGrid {
    /// Create a new `regular` chunk grid with chunk shape `chunk_shape`.
    #[must_use]
    pub fn new(chunk_shape: ChunkShape) -> Self {
        Self { chunk_shape }
    }

    /// Create a new `regular` chunk grid from a chunk shape with [`u64`] elements.
    ///
    /// # Errors
    /// Returns a [`RegularChunkGridCreateError`] if any element of `chunk_shape` is zero.
    pub fn new_u64(chunk_shape: &[u64]) -> Result<Self, RegularChunkGridCreateError> {
        chunk_shape
            .iter()
            .map(|&s| NonZeroU64::new(s))
            .collect::<Option<ChunkShape>>()
            .map(Self::new)
            .ok_or_else(|| RegularChunkGridCreateError(chunk_shape.to_vec()))
    }

    /// Create a `regular` chunk grid for an array of `array_shape` with chunks of roughly `target_elements` elements.
    ///
    /// Starts from the array shape and halves the largest dimension until the chunk has at most `target_elements` elements.
    #[must_use]
    pub fn new_guessed(array_shape: &[u64], target_elements: u64) -> Self {
        let target_elements = target_elements.max(1);
        let mut chunk_shape: Vec<u64> = array_shape.iter().map(|&s| s.max(1)).collect();
        while chunk_shape.iter().product::<u64>() > target_elements {
            let Some(largest) = chunk_shape
                .iter_mut()
                .reduce(|largest, s| if *s > *largest { s } else { largest })
            else {
                break;
            };
            *largest = largest.div_ceil(2);
        }
        Self::new(
            chunk_shape
                .into_iter()
                .filter_map(NonZeroU64::new)
                .collect(),
        )
    }

    /// Create a `regular` chunk grid from metadata.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError::UnsupportedChunkGrid`] if the metadata is not a valid `regular` chunk grid.
    pub fn from_metadata(metadata: &MetadataV3) -> Result<Self, ArrayCreateError> {
        if metadata.name() != REGULAR {
            return Err(ArrayCreateError::UnsupportedChunkGrid(metadata.to_string()));
        }
        let configuration: RegularChunkGridConfiguration = metadata
            .to_configuration()
            .map_err(|_| ArrayCreateError::UnsupportedChunkGrid(metadata.to_string()))?;
        Ok(Self::new(configuration.chunk_shape))
    }

    /// Create the metadata of the chunk grid.
    #[must_use]
    pub fn create_metadata(&self) -> MetadataV3 {
        let configuration = RegularChunkGridConfiguration {
            chunk_shape: self.chunk_shape.clone(),
        };
        MetadataV3::new_with_serializable_configuration(REGULAR, &configuration)
            .unwrap_or_else(|_| MetadataV3::new(REGULAR))
    }

    /// Return the dimensionality of the grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.chunk_shape.len()
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[NonZeroU64] {
        &self.chunk_shape
    }

    /// Return the chunk shape as an [`ArrayShape`].
    #[must_use]
    pub fn chunk_shape_u64(&self) -> ArrayShape {
        self.chunk_shape.iter().copied().map(NonZeroU64::get).collect()
    }

    /// Return the number of chunks along each dimension of an array with `array_shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_shape` does not match the dimensionality of the grid.
    pub fn grid_shape(&self, array_shape: &[u64]) -> Result<ArrayShape, IncompatibleDimensionalityError> {
        self.check_dimensionality(array_shape.len())?;
        Ok(std::iter::zip(array_shape, &self.chunk_shape)
            .map(|(a, s)| a.div_ceil(s.get()))
            .collect())
    }

    /// Return the subset of the array covered by the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_indices` does not match the dimensionality of the grid.
    pub fn subset(&self, chunk_indices: &[u64]) -> Result<ArraySubset, IncompatibleDimensionalityError> {
        self.check_dimensionality(chunk_indices.len())?;
        let ranges = std::iter::zip(chunk_indices, &self.chunk_shape)
            .map(|(i, s)| i * s.get()..(i + 1) * s.get());
        Ok(ArraySubset::from(ranges))
    }

    /// Return the chunk indices of the chunk holding the element at `array_indices`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_indices` does not match the dimensionality of the grid.
    pub fn chunk_indices(&self, array_indices: &[u64]) -> Result<ArrayIndices, IncompatibleDimensionalityError> {
        self.check_dimensionality(array_indices.len())?;
        Ok(std::iter::zip(array_indices, &self.chunk_shape)
            .map(|(i, s)| i / s.get())
            .collect())
    }

    /// Return the subset of chunk indices of the chunks intersecting `array_subset`.
    ///
    /// The subset is empty if `array_subset` is empty.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_subset` does not match the dimensionality of the grid.
    pub fn chunks_in_array_subset(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<ArraySubset, IncompatibleDimensionalityError> {
        self.check_dimensionality(array_subset.dimensionality())?;
        if array_subset.is_empty() {
            return Ok(ArraySubset::new_with_shape(vec![0; self.dimensionality()]));
        }
        let ranges = itertools::izip!(array_subset.start(), array_subset.end_exc(), &self.chunk_shape)
            .map(|(start, end, s)| start / s.get()..(end - 1) / s.get() + 1);
        Ok(ArraySubset::from(ranges))
    }

    fn check_dimensionality(&self, dimensionality: usize) -> Result<(), IncompatibleDimensionalityError> {
        if dimensionality == self.dimensionality() {
            Ok(())
        } else {
            Err(IncompatibleDimensionalityError::new(
                dimensionality,
                self.dimensionality(),
            ))
        }
    }
}
