use ndarray::ArrayViewD;
use roundtrip_storage::{ReadableStorageTraits, StorageError, WritableStorageTraits};

use super::{copy_region_bytes, usize_from, Array, ArrayError, Element};
use crate::array_subset::ArraySubset;

impl<TStorage: ?Sized + WritableStorageTraits> Array<TStorage> {
    /// Store the metadata of the array.
    ///
    /// # Errors
    /// Returns [`StorageError`] if there is an underlying store error.
    pub fn store_metadata(&self) -> Result<(), StorageError> {
        let key = self.metadata_key()?;
        let json = serde_json::to_vec_pretty(&self.metadata)
            .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))?;
        log::trace!("storing metadata of array {}", self.path);
        self.storage.set(&key, json.into())
    }

    /// Encode the little endian `chunk_bytes` and store them at `chunk_indices`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the length of `chunk_bytes` does not match the chunk size, or
    ///  - there is a codec or storage error.
    pub fn store_chunk(&self, chunk_indices: &[u64], chunk_bytes: Vec<u8>) -> Result<(), ArrayError> {
        let element_size = self.data_type.size();
        let expected_size = self.chunk_num_elements() * element_size;
        if chunk_bytes.len() != expected_size {
            return Err(ArrayError::InvalidBytesInputSize(
                chunk_bytes.len(),
                expected_size as u64,
            ));
        }
        let key = self.chunk_key(chunk_indices)?;
        let encoded = self.codecs.encode(chunk_bytes, element_size)?;
        self.storage.set(&key, encoded.into())?;
        Ok(())
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits + WritableStorageTraits> Array<TStorage> {
    /// Encode the little endian `subset_bytes` and store them in `array_subset`.
    ///
    /// Only the chunks intersecting `array_subset` are written.
    /// Chunks that are only partially covered are read, updated, and written back.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `array_subset` is not within the bounds of the array,
    ///  - the length of `subset_bytes` does not match the subset, or
    ///  - there is a codec or storage error.
    pub fn store_array_subset(
        &self,
        array_subset: &ArraySubset,
        subset_bytes: &[u8],
    ) -> Result<(), ArrayError> {
        if !array_subset.inbounds_shape(self.shape()) {
            return Err(ArrayError::InvalidArraySubset(
                array_subset.clone(),
                self.shape().to_vec(),
            ));
        }
        let element_size = self.data_type.size();
        let expected_size = usize_from(array_subset.num_elements()) * element_size;
        if subset_bytes.len() != expected_size {
            return Err(ArrayError::InvalidBytesInputSize(
                subset_bytes.len(),
                expected_size as u64,
            ));
        }

        let chunk_shape = self.chunk_grid.chunk_shape_u64();
        let chunks = self.chunk_grid.chunks_in_array_subset(array_subset)?;
        for chunk_indices in chunks.indices() {
            let chunk_subset = self.chunk_grid.subset(&chunk_indices)?;
            let overlap = chunk_subset.overlap(array_subset)?;
            let mut chunk_bytes = if overlap == chunk_subset {
                vec![0; self.chunk_num_elements() * element_size]
            } else {
                self.retrieve_chunk(&chunk_indices)?
            };
            copy_region_bytes(
                subset_bytes,
                array_subset.shape(),
                overlap.relative_to(array_subset.start())?.start(),
                &mut chunk_bytes,
                &chunk_shape,
                overlap.relative_to(chunk_subset.start())?.start(),
                overlap.shape(),
                element_size,
            );
            self.store_chunk(&chunk_indices, chunk_bytes)?;
        }
        Ok(())
    }

    /// Encode `subset_elements` and store them in `array_subset`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the element type does not match the data type or [`Array::store_array_subset`] fails.
    pub fn store_array_subset_elements<T: Element>(
        &self,
        array_subset: &ArraySubset,
        subset_elements: &[T],
    ) -> Result<(), ArrayError> {
        let bytes = T::to_array_bytes(self.data_type(), subset_elements)?;
        self.store_array_subset(array_subset, &bytes)
    }

    /// Encode `subset_array` and store it in the array subset starting at `subset_start`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the element type does not match the data type or [`Array::store_array_subset`] fails.
    pub fn store_array_subset_ndarray<T: Element>(
        &self,
        subset_start: &[u64],
        subset_array: ArrayViewD<'_, T>,
    ) -> Result<(), ArrayError> {
        let subset_shape = subset_array.shape().iter().map(|&s| s as u64).collect();
        let array_subset = ArraySubset::new_with_start_shape(subset_start.to_vec(), subset_shape)?;
        let elements: Vec<T> = subset_array.iter().copied().collect();
        self.store_array_subset_elements(&array_subset, &elements)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::{array, ArrayD};
    use roundtrip_storage::{
        storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter, store::MemoryStore,
        StorePrefix,
    };

    use super::*;
    use crate::array::{ArrayBuilder, DataType, RegularChunkGrid};

    #[test]
    fn array_store_retrieve_subset() {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new(vec![4, 5], DataType::Float64)
            .chunk_grid(RegularChunkGrid::new_u64(&[2, 2]).unwrap())
            .build(store.clone(), StorePrefix::new("g/a/").unwrap())
            .unwrap();
        array.store_metadata().unwrap();

        let data: ArrayD<f64> = ArrayD::from_shape_fn(ndarray::IxDyn(&[4, 5]), |idx| {
            (idx[0] * 10 + idx[1]) as f64
        });
        array.store_array_subset_ndarray(&[0, 0], data.view()).unwrap();
        assert_eq!(
            array.retrieve_array_subset_ndarray::<f64>(&array.subset_all()).unwrap(),
            data
        );

        let subset = ArraySubset::new_with_ranges(&[1..3, 2..5]);
        assert_eq!(
            array.retrieve_array_subset_elements::<f64>(&subset).unwrap(),
            vec![12.0, 13.0, 14.0, 22.0, 23.0, 24.0]
        );

        let reopened = Array::open(store, StorePrefix::new("g/a/").unwrap()).unwrap();
        assert_eq!(reopened.metadata(), array.metadata());
        assert_eq!(
            reopened.retrieve_array_subset_ndarray::<f64>(&reopened.subset_all()).unwrap(),
            data
        );
    }

    #[test]
    fn array_store_partial_chunk() {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new(vec![3, 3], DataType::Int64)
            .chunk_grid(RegularChunkGrid::new_u64(&[2, 2]).unwrap())
            .build(store, StorePrefix::root())
            .unwrap();
        array
            .store_array_subset_ndarray(&[1, 1], array![[1i64, 2], [3, 4]].into_dyn().view())
            .unwrap();
        assert_eq!(
            array.retrieve_array_subset_elements::<i64>(&array.subset_all()).unwrap(),
            vec![0, 0, 0, 0, 1, 2, 0, 3, 4]
        );
    }

    #[test]
    fn array_store_scalar() {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new(vec![], DataType::NumpyTimeDelta64)
            .build(store.clone(), StorePrefix::new("g/step/").unwrap())
            .unwrap();
        array
            .store_array_subset_elements(&array.subset_all(), &[3_600_000_000_000i64])
            .unwrap();
        assert!(store.get(&array.chunk_key(&[]).unwrap()).unwrap().is_some());
        assert_eq!(
            array.retrieve_array_subset_elements::<i64>(&array.subset_all()).unwrap(),
            vec![3_600_000_000_000]
        );
    }

    #[test]
    fn array_store_only_intersecting_chunks() {
        let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
        let array = ArrayBuilder::new(vec![4, 4], DataType::Float32)
            .chunk_grid(RegularChunkGrid::new_u64(&[2, 2]).unwrap())
            .build(store.clone(), StorePrefix::root())
            .unwrap();
        array
            .store_array_subset_elements(&ArraySubset::new_with_ranges(&[0..2, 0..4]), &[1.0f32; 8])
            .unwrap();
        assert_eq!(store.writes(), 2);
        assert_eq!(store.reads(), 0);
        let mut written: Vec<String> = store.written_keys().iter().map(|k| k.to_string()).collect();
        written.sort();
        assert_eq!(written, vec!["c/0/0", "c/0/1"]);
    }

    #[test]
    fn array_store_invalid() {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new(vec![2, 2], DataType::Float32)
            .build(store, StorePrefix::root())
            .unwrap();
        assert!(matches!(
            array.store_array_subset_elements(&array.subset_all(), &[1.0f32; 3]),
            Err(ArrayError::InvalidBytesInputSize(12, 16))
        ));
        assert!(matches!(
            array.store_array_subset_elements(&array.subset_all(), &[1i64; 4]),
            Err(ArrayError::IncompatibleElementType)
        ));
        assert!(matches!(
            array.store_array_subset_elements(&ArraySubset::new_with_ranges(&[1..3, 0..2]), &[1.0f32; 4]),
            Err(ArrayError::InvalidArraySubset(..))
        ));
        assert!(matches!(
            array.store_chunk(&[0, 0], vec![0; 3]),
            Err(ArrayError::InvalidBytesInputSize(3, 16))
        ));
    }
}
