use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use roundtrip_storage::{ReadableStorageTraits, StorageError, StorePrefix};

use super::{
    copy_region_bytes, usize_from, Array, ArrayCreateError, ArrayError, Element,
};
use crate::{array_subset::ArraySubset, metadata::{ArrayMetadataV3, ZARR_JSON}};

impl<TStorage: ?Sized + ReadableStorageTraits> Array<TStorage> {
    /// Open an existing array in `storage` at `path`.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError`] if there is a storage error, or the metadata is missing, unparseable or unsupported.
    pub fn open(storage: Arc<TStorage>, path: StorePrefix) -> Result<Self, ArrayCreateError> {
        let key = path.key(ZARR_JSON).map_err(StorageError::from)?;
        let metadata = storage
            .get(&key)?
            .ok_or(ArrayCreateError::MissingMetadata)?;
        let metadata: ArrayMetadataV3 = serde_json::from_slice(&metadata)
            .map_err(|err| ArrayCreateError::UnparseableMetadata(key, err.to_string()))?;
        Self::new_with_metadata(storage, path, metadata)
    }

    /// Read and decode the chunk at `chunk_indices` into its little endian bytes.
    ///
    /// A chunk that does not exist in the store is returned filled with the fill value.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if there is a storage or codec error.
    pub fn retrieve_chunk(&self, chunk_indices: &[u64]) -> Result<Vec<u8>, ArrayError> {
        let num_elements = self.chunk_num_elements();
        let element_size = self.data_type.size();
        let key = self.chunk_key(chunk_indices)?;
        match self.storage.get(&key)? {
            Some(encoded) => Ok(self.codecs.decode(
                encoded.to_vec(),
                element_size,
                num_elements * element_size,
            )?),
            None => Ok(self.fill_value.repeat(num_elements)),
        }
    }

    /// Read and decode the `array_subset` of the array into its little endian bytes.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `array_subset` is not within the bounds of the array, or
    ///  - there is a storage or codec error.
    pub fn retrieve_array_subset(&self, array_subset: &ArraySubset) -> Result<Vec<u8>, ArrayError> {
        if !array_subset.inbounds_shape(self.shape()) {
            return Err(ArrayError::InvalidArraySubset(
                array_subset.clone(),
                self.shape().to_vec(),
            ));
        }
        let element_size = self.data_type.size();
        let mut subset_bytes = vec![0; usize_from(array_subset.num_elements()) * element_size];
        let chunk_shape = self.chunk_grid.chunk_shape_u64();
        let chunks = self.chunk_grid.chunks_in_array_subset(array_subset)?;
        for chunk_indices in chunks.indices() {
            let chunk_subset = self.chunk_grid.subset(&chunk_indices)?;
            let overlap = chunk_subset.overlap(array_subset)?;
            let chunk_bytes = self.retrieve_chunk(&chunk_indices)?;
            copy_region_bytes(
                &chunk_bytes,
                &chunk_shape,
                overlap.relative_to(chunk_subset.start())?.start(),
                &mut subset_bytes,
                array_subset.shape(),
                overlap.relative_to(array_subset.start())?.start(),
                overlap.shape(),
                element_size,
            );
        }
        Ok(subset_bytes)
    }

    /// Read and decode the `array_subset` of the array into a vector of its elements.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the element type does not match the data type or [`Array::retrieve_array_subset`] fails.
    pub fn retrieve_array_subset_elements<T: Element>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<Vec<T>, ArrayError> {
        T::validate_data_type(self.data_type())?;
        let bytes = self.retrieve_array_subset(array_subset)?;
        T::from_array_bytes(self.data_type(), &bytes)
    }

    /// Read and decode the `array_subset` of the array into an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the element type does not match the data type or [`Array::retrieve_array_subset`] fails.
    pub fn retrieve_array_subset_ndarray<T: Element>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<ArrayD<T>, ArrayError> {
        let elements = self.retrieve_array_subset_elements(array_subset)?;
        let shape: Vec<usize> = array_subset.shape().iter().copied().map(usize_from).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), elements)
            .map_err(|_| ArrayError::InvalidDataShape(shape.clone(), shape))
    }
}

#[cfg(test)]
mod tests {
    use roundtrip_storage::{store::MemoryStore, WritableStorageTraits};

    use super::*;
    use crate::array::{codec::BytesCodec, ArrayBuilder, CodecChain, DataType, RegularChunkGrid};

    #[test]
    fn array_open_missing() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            Array::open(store.clone(), StorePrefix::new("g/a/").unwrap()),
            Err(ArrayCreateError::MissingMetadata)
        ));
        store
            .set(&"g/a/zarr.json".try_into().unwrap(), b"{}".to_vec().into())
            .unwrap();
        assert!(matches!(
            Array::open(store, StorePrefix::new("g/a/").unwrap()),
            Err(ArrayCreateError::UnparseableMetadata(..))
        ));
    }

    #[test]
    fn array_retrieve_fill_value() {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new(vec![3, 3], DataType::Float32)
            .chunk_grid(RegularChunkGrid::new_u64(&[2, 2]).unwrap())
            .build(store, StorePrefix::root())
            .unwrap();
        let elements: Vec<f32> = array
            .retrieve_array_subset_elements(&array.subset_all())
            .unwrap();
        assert_eq!(elements.len(), 9);
        assert!(elements.iter().all(|e| e.is_nan()));
        assert!(matches!(
            array.retrieve_array_subset_elements::<f64>(&array.subset_all()),
            Err(ArrayError::IncompatibleElementType)
        ));
        assert!(matches!(
            array.retrieve_array_subset(&ArraySubset::new_with_ranges(&[0..4, 0..3])),
            Err(ArrayError::InvalidArraySubset(..))
        ));
    }

    #[test]
    fn array_retrieve_corrupt_chunk() {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new(vec![2], DataType::Int64)
            .codecs(CodecChain::new(BytesCodec::default(), vec![]))
            .build(store.clone(), StorePrefix::root())
            .unwrap();
        store
            .set(&array.chunk_key(&[0]).unwrap(), vec![0; 3].into())
            .unwrap();
        assert!(matches!(
            array.retrieve_chunk(&[0]),
            Err(ArrayError::CodecError(_))
        ));
    }
}
