use roundtrip_storage::{StorageError, StoreKey};
use serde_json::Value;
use thiserror::Error;

use super::{codec::CodecError, ArrayShape};
use crate::array_subset::{ArraySubset, ArraySubsetError, IncompatibleDimensionalityError};

/// An array creation error.
#[derive(Clone, Debug, Error)]
pub enum ArrayCreateError {
    /// Unsupported data type.
    #[error("unsupported data type {0}")]
    UnsupportedDataType(String),
    /// Invalid fill value metadata.
    #[error("invalid fill value metadata for data type `{data_type_name}`: {fill_value_metadata}")]
    InvalidFillValueMetadata {
        /// The data type name.
        data_type_name: String,
        /// The fill value metadata.
        fill_value_metadata: Value,
    },
    /// Unsupported chunk grid.
    #[error("unsupported chunk grid {0}")]
    UnsupportedChunkGrid(String),
    /// Unsupported chunk key encoding.
    #[error("unsupported chunk key encoding {0}")]
    UnsupportedChunkKeyEncoding(String),
    /// Unsupported codec.
    #[error("unsupported codec {0}")]
    UnsupportedCodec(String),
    /// The dimensionality of the chunk grid does not match the array shape.
    #[error("chunk grid dimensionality {0} does not match array dimensionality {1}")]
    InvalidChunkGridDimensionality(usize, usize),
    /// The number of dimension names does not match the array dimensionality.
    #[error("the number of dimension names {0} does not match array dimensionality {1}")]
    InvalidDimensionNames(usize, usize),
    /// Unparseable metadata.
    #[error("unparseable metadata at {0}: {1}")]
    UnparseableMetadata(StoreKey, String),
    /// Storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// Missing metadata.
    #[error("array metadata is missing")]
    MissingMetadata,
}

/// Array errors.
#[derive(Clone, Debug, Error)]
pub enum ArrayError {
    /// A store error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// A codec error.
    #[error(transparent)]
    CodecError(#[from] CodecError),
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// An [`ArraySubsetError`].
    #[error(transparent)]
    ArraySubsetError(#[from] ArraySubsetError),
    /// Incompatible array subset.
    #[error("array subset {_0} is not compatible with array shape {_1:?}")]
    InvalidArraySubset(ArraySubset, ArrayShape),
    /// An unexpected bytes input size.
    #[error("got bytes with size {_0:?}, expected a multiple of {_1:?}")]
    InvalidBytesInputSize(usize, u64),
    /// Incompatible element size.
    #[error("the element type does not match the data type")]
    IncompatibleElementType,
    /// Invalid data shape.
    #[error("data has shape {_0:?}, expected {_1:?}")]
    InvalidDataShape(Vec<usize>, Vec<usize>),
}
