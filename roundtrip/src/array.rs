//! Chunked arrays.
//!
//! An array is a node in a group, at `<group>/<name>/`, with metadata in `zarr.json` and
//! chunks under `c/` keyed by the `default` chunk key encoding.
//!
//! Arrays are created with an [`ArrayBuilder`] or opened from existing metadata with [`Array::open`].
//! Data is stored and retrieved for whole chunks or for any [`ArraySubset`], as bytes, element vectors or [`ndarray::ArrayD`].
//! Elements of chunks that were never written read back as the fill value.

mod array_errors;
mod array_sync_readable;
mod array_sync_writable;
pub mod chunk_grid;
pub mod chunk_key_encoding;
pub mod codec;
pub mod data_type;
mod element;

use std::sync::Arc;

use roundtrip_storage::{StorageError, StoreKey, StorePrefix};
use serde_json::Value;

pub use self::{
    array_errors::{ArrayCreateError, ArrayError},
    chunk_grid::{ChunkShape, RegularChunkGrid},
    chunk_key_encoding::DefaultChunkKeyEncoding,
    codec::CodecChain,
    data_type::DataType,
    element::Element,
};
use crate::{
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
    metadata::{ArrayMetadataV3, ZARR_JSON},
};

/// An array shape. Dimensions may be zero.
pub type ArrayShape = Vec<u64>;

/// An array index.
pub type ArrayIndices = Vec<u64>;

/// The fill value of an array, as the little endian bytes of a single element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FillValue(Vec<u8>);

impl FillValue {
    /// Create a new fill value from little endian element bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the little endian bytes of the fill value.
    #[must_use]
    pub fn as_le_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `num_elements` repetitions of the fill value.
    #[must_use]
    pub fn repeat(&self, num_elements: usize) -> Vec<u8> {
        self.0.repeat(num_elements)
    }
}

/// A chunked array.
///
/// The array metadata held by an [`Array`] is not persisted until [`Array::store_metadata`] is called,
/// so changes such as [`Array::set_shape`] can be staged while chunks are written.
#[derive(Debug)]
pub struct Array<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    path: StorePrefix,
    data_type: DataType,
    fill_value: FillValue,
    chunk_grid: RegularChunkGrid,
    chunk_key_encoding: DefaultChunkKeyEncoding,
    codecs: CodecChain,
    metadata: ArrayMetadataV3,
}

impl<TStorage: ?Sized> Array<TStorage> {
    /// Create an array in `storage` at `path` with `metadata`.
    ///
    /// This does not write to the store, use [`Array::store_metadata`] to write `metadata` to `storage`.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError`] if any metadata is invalid or unsupported.
    pub fn new_with_metadata(
        storage: Arc<TStorage>,
        path: StorePrefix,
        metadata: ArrayMetadataV3,
    ) -> Result<Self, ArrayCreateError> {
        let data_type = DataType::from_metadata(&metadata.data_type)?;
        let fill_value = data_type.fill_value_from_metadata(&metadata.fill_value)?;
        let chunk_grid = RegularChunkGrid::from_metadata(&metadata.chunk_grid)?;
        if chunk_grid.dimensionality() != metadata.shape.len() {
            return Err(ArrayCreateError::InvalidChunkGridDimensionality(
                chunk_grid.dimensionality(),
                metadata.shape.len(),
            ));
        }
        let chunk_key_encoding = DefaultChunkKeyEncoding::from_metadata(&metadata.chunk_key_encoding)?;
        let codecs = CodecChain::from_metadata(&metadata.codecs)?;
        if let Some(dimension_names) = &metadata.dimension_names {
            if dimension_names.len() != metadata.shape.len() {
                return Err(ArrayCreateError::InvalidDimensionNames(
                    dimension_names.len(),
                    metadata.shape.len(),
                ));
            }
        }
        Ok(Self {
            storage,
            path,
            data_type,
            fill_value,
            chunk_grid,
            chunk_key_encoding,
            codecs,
            metadata,
        })
    }

    /// Get the node path.
    #[must_use]
    pub const fn path(&self) -> &StorePrefix {
        &self.path
    }

    /// Get the data type.
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Get the fill value.
    #[must_use]
    pub const fn fill_value(&self) -> &FillValue {
        &self.fill_value
    }

    /// Get the array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    /// Get the array dimensionality.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.metadata.shape.len()
    }

    /// Get the chunk grid.
    #[must_use]
    pub const fn chunk_grid(&self) -> &RegularChunkGrid {
        &self.chunk_grid
    }

    /// Get the dimension names.
    #[must_use]
    pub fn dimension_names(&self) -> Option<&[Option<String>]> {
        self.metadata.dimension_names.as_deref()
    }

    /// Get the attributes.
    #[must_use]
    pub const fn attributes(&self) -> &serde_json::Map<String, Value> {
        &self.metadata.attributes
    }

    /// Get the array metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ArrayMetadataV3 {
        &self.metadata
    }

    /// Set the array shape.
    ///
    /// The new shape is staged until [`Array::store_metadata`] is called.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `shape` does not match the dimensionality of the array.
    pub fn set_shape(&mut self, shape: ArrayShape) -> Result<(), IncompatibleDimensionalityError> {
        if shape.len() == self.dimensionality() {
            self.metadata.shape = shape;
            Ok(())
        } else {
            Err(IncompatibleDimensionalityError::new(
                shape.len(),
                self.dimensionality(),
            ))
        }
    }

    /// Return the key of the metadata document of the array.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the key is invalid.
    pub fn metadata_key(&self) -> Result<StoreKey, StorageError> {
        Ok(self.path.key(ZARR_JSON)?)
    }

    /// Return the key of the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the key is invalid.
    pub fn chunk_key(&self, chunk_indices: &[u64]) -> Result<StoreKey, StorageError> {
        Ok(self.path.key(&self.chunk_key_encoding.encode(chunk_indices))?)
    }

    /// Return the subset of the whole array.
    #[must_use]
    pub fn subset_all(&self) -> ArraySubset {
        ArraySubset::new_with_shape(self.metadata.shape.clone())
    }

    fn chunk_num_elements(&self) -> usize {
        usize_from(self.chunk_grid.chunk_shape_u64().iter().product::<u64>())
    }
}

/// An [`Array`] builder.
///
/// Defaults to:
/// - a regular chunk grid with chunks of roughly [`DEFAULT_CHUNK_TARGET_ELEMENTS`](chunk_grid::DEFAULT_CHUNK_TARGET_ELEMENTS) elements,
/// - the default fill value of the data type,
/// - the `default` chunk key encoding with the `/` separator,
/// - the [`CodecChain::default_codecs`], and
/// - no attributes or dimension names.
#[derive(Debug, Clone)]
pub struct ArrayBuilder {
    shape: ArrayShape,
    data_type: DataType,
    chunk_grid: Option<RegularChunkGrid>,
    chunk_target_elements: u64,
    codecs: CodecChain,
    attributes: serde_json::Map<String, Value>,
    dimension_names: Option<Vec<Option<String>>>,
}

impl ArrayBuilder {
    /// Create a new array builder for an array of `shape` and `data_type`.
    #[must_use]
    pub fn new(shape: ArrayShape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            chunk_grid: None,
            chunk_target_elements: chunk_grid::DEFAULT_CHUNK_TARGET_ELEMENTS,
            codecs: CodecChain::default_codecs(),
            attributes: serde_json::Map::new(),
            dimension_names: None,
        }
    }

    /// Set the chunk grid. Overrides the chunk target elements.
    pub fn chunk_grid(&mut self, chunk_grid: RegularChunkGrid) -> &mut Self {
        self.chunk_grid = Some(chunk_grid);
        self
    }

    /// Set the target number of elements of a guessed chunk shape.
    pub fn chunk_target_elements(&mut self, chunk_target_elements: u64) -> &mut Self {
        self.chunk_target_elements = chunk_target_elements;
        self
    }

    /// Set the codecs.
    pub fn codecs(&mut self, codecs: CodecChain) -> &mut Self {
        self.codecs = codecs;
        self
    }

    /// Set the attributes.
    pub fn attributes(&mut self, attributes: serde_json::Map<String, Value>) -> &mut Self {
        self.attributes = attributes;
        self
    }

    /// Set the dimension names.
    pub fn dimension_names<I, D>(&mut self, dimension_names: I) -> &mut Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        self.dimension_names = Some(
            dimension_names
                .into_iter()
                .map(|name| Some(name.into()))
                .collect(),
        );
        self
    }

    /// Build the array metadata.
    #[must_use]
    pub fn build_metadata(&self) -> ArrayMetadataV3 {
        let chunk_grid = self.chunk_grid.clone().unwrap_or_else(|| {
            RegularChunkGrid::new_guessed(&self.shape, self.chunk_target_elements)
        });
        ArrayMetadataV3 {
            zarr_format: monostate::MustBe!(3u64),
            node_type: monostate::MustBe!("array"),
            shape: self.shape.clone(),
            data_type: self.data_type.metadata(),
            chunk_grid: chunk_grid.create_metadata(),
            chunk_key_encoding: DefaultChunkKeyEncoding::default().create_metadata(),
            fill_value: self.data_type.default_fill_value_metadata(),
            codecs: self.codecs.create_metadatas(),
            attributes: self.attributes.clone(),
            dimension_names: self.dimension_names.clone(),
        }
    }

    /// Build into an [`Array`] at `path` in `storage`.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError`] if the builder is in an invalid state.
    pub fn build<TStorage: ?Sized>(
        &self,
        storage: Arc<TStorage>,
        path: StorePrefix,
    ) -> Result<Array<TStorage>, ArrayCreateError> {
        Array::new_with_metadata(storage, path, self.build_metadata())
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn usize_from(value: u64) -> usize {
    value as usize
}

/// The offset of `indices` in a C order array of `shape`.
fn ravel_indices(indices: &[u64], shape: &[u64]) -> u64 {
    std::iter::zip(indices, shape).fold(0, |offset, (i, s)| offset * s + i)
}

/// Copy the elements of a region of shape `region_shape` between two C order byte buffers.
///
/// The region starts at `src_start` in `src` of shape `src_shape` and at `dst_start` in `dst` of shape `dst_shape`.
#[allow(clippy::too_many_arguments)]
fn copy_region_bytes(
    src: &[u8],
    src_shape: &[u64],
    src_start: &[u64],
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_start: &[u64],
    region_shape: &[u64],
    element_size: usize,
) {
    let Some((&run_elements, outer_shape)) = region_shape.split_last() else {
        dst[..element_size].copy_from_slice(&src[..element_size]);
        return;
    };
    let run_bytes = usize_from(run_elements) * element_size;
    let outer = ArraySubset::new_with_shape(outer_shape.iter().copied().chain([1]).collect());
    for indices in outer.indices() {
        let offset = |start: &[u64], shape: &[u64]| {
            let indices: ArrayIndices = std::iter::zip(&indices, start).map(|(i, s)| i + s).collect();
            usize_from(ravel_indices(&indices, shape)) * element_size
        };
        let src_offset = offset(src_start, src_shape);
        let dst_offset = offset(dst_start, dst_shape);
        dst[dst_offset..dst_offset + run_bytes]
            .copy_from_slice(&src[src_offset..src_offset + run_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use roundtrip_storage::store::MemoryStore;

    use super::*;

    #[test]
    fn array_builder_metadata() {
        let mut builder = ArrayBuilder::new(vec![4, 61, 120], DataType::Float32);
        builder
            .dimension_names(["time", "latitude", "longitude"])
            .codecs(CodecChain::new(codec::BytesCodec::default(), vec![]));
        let metadata = builder.build_metadata();
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            serde_json::json!({
                "zarr_format": 3,
                "node_type": "array",
                "shape": [4, 61, 120],
                "data_type": "float32",
                "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [4, 61, 120]}},
                "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
                "fill_value": "NaN",
                "codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
                "dimension_names": ["time", "latitude", "longitude"]
            })
        );
    }

    #[test]
    fn array_invalid_metadata() {
        let store = Arc::new(MemoryStore::new());
        let mut metadata = ArrayBuilder::new(vec![4, 4], DataType::Int64).build_metadata();
        metadata.dimension_names = Some(vec![Some("x".to_string())]);
        assert!(matches!(
            Array::new_with_metadata(store.clone(), StorePrefix::root(), metadata),
            Err(ArrayCreateError::InvalidDimensionNames(1, 2))
        ));

        let mut metadata = ArrayBuilder::new(vec![4, 4], DataType::Int64).build_metadata();
        metadata.chunk_grid = RegularChunkGrid::new_u64(&[2]).unwrap().create_metadata();
        assert!(matches!(
            Array::new_with_metadata(store.clone(), StorePrefix::root(), metadata),
            Err(ArrayCreateError::InvalidChunkGridDimensionality(1, 2))
        ));

        let mut metadata = ArrayBuilder::new(vec![4, 4], DataType::Int64).build_metadata();
        metadata.fill_value = Value::from("NaN");
        assert!(matches!(
            Array::new_with_metadata(store, StorePrefix::root(), metadata),
            Err(ArrayCreateError::InvalidFillValueMetadata { .. })
        ));
    }

    #[test]
    fn array_keys() {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new(vec![4, 4], DataType::Int64)
            .build(store.clone(), StorePrefix::new("grib_test/t/").unwrap())
            .unwrap();
        assert_eq!(array.metadata_key().unwrap().as_str(), "grib_test/t/zarr.json");
        assert_eq!(array.chunk_key(&[1, 2]).unwrap().as_str(), "grib_test/t/c/1/2");

        let scalar = ArrayBuilder::new(vec![], DataType::Float64)
            .build(store, StorePrefix::new("grib_test/step/").unwrap())
            .unwrap();
        assert_eq!(scalar.chunk_key(&[]).unwrap().as_str(), "grib_test/step/c");
    }

    #[test]
    fn array_set_shape() {
        let store = Arc::new(MemoryStore::new());
        let mut array = ArrayBuilder::new(vec![4, 4], DataType::Int64)
            .build(store, StorePrefix::root())
            .unwrap();
        array.set_shape(vec![5, 4]).unwrap();
        assert_eq!(array.shape(), &[5, 4]);
        assert!(array.set_shape(vec![5]).is_err());
    }

    #[test]
    fn copy_region() {
        // 3x4 source, copy the 2x2 region at (1, 1) into the origin of a 2x3 destination
        let src: Vec<u8> = (0..12).collect();
        let mut dst = vec![0u8; 6];
        copy_region_bytes(&src, &[3, 4], &[1, 1], &mut dst, &[2, 3], &[0, 0], &[2, 2], 1);
        assert_eq!(dst, vec![5, 6, 0, 9, 10, 0]);

        let mut dst = vec![0u8; 2];
        copy_region_bytes(&[7, 8], &[], &[], &mut dst, &[], &[], &[], 2);
        assert_eq!(dst, vec![7, 8]);
    }
}
