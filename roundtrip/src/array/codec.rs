//! Array codecs.
//!
//! A chunk is encoded by the `bytes` array to bytes codec followed by zero or more bytes to bytes codecs.
//! Supported codecs:
//! - `bytes`: little or big endian serialisation of elements,
//! - `gzip` (feature `gzip`): [gzip](https://datatracker.ietf.org/doc/html/rfc1952) compression.

#[cfg(feature = "gzip")]
mod gzip;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "gzip")]
pub use gzip::{GzipCodec, GzipCodecConfiguration};

use super::ArrayCreateError;
use crate::metadata::MetadataV3;

/// A codec error.
#[derive(Clone, Debug, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// An unexpected decoded size.
    #[error("got decoded size {_0}, expected {_1}")]
    UnexpectedDecodedSize(usize, usize),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

/// Traits for bytes to bytes codecs.
pub trait BytesToBytesCodecTraits: std::fmt::Debug + Send + Sync {
    /// Create the metadata of the codec.
    fn create_metadata(&self) -> MetadataV3;

    /// Encode bytes.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails.
    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails.
    fn decode(&self, encoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError>;
}

/// The endianness of each element in an array.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little endian.
    #[default]
    Little,
    /// Big endian.
    Big,
}

/// Configuration parameters for the `bytes` codec.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BytesCodecConfiguration {
    /// The target endianness.
    #[serde(default)]
    pub endian: Endianness,
}

/// The `bytes` array to bytes codec.
///
/// Decoded chunks are always little endian, so a big endian codec swaps the bytes of every element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BytesCodec {
    endian: Endianness,
}

impl BytesCodec {
    const NAME: &'static str = "bytes";

    /// Create a new `bytes` codec.
    #[must_use]
    pub const fn new(endian: Endianness) -> Self {
        Self { endian }
    }

    fn create_metadata(&self) -> MetadataV3 {
        let configuration = BytesCodecConfiguration {
            endian: self.endian,
        };
        MetadataV3::new_with_serializable_configuration(Self::NAME, &configuration)
            .unwrap_or_else(|_| MetadataV3::new(Self::NAME))
    }

    fn swap(&self, mut bytes: Vec<u8>, element_size: usize) -> Vec<u8> {
        if self.endian == Endianness::Big && element_size > 1 {
            bytes
                .chunks_exact_mut(element_size)
                .for_each(<[u8]>::reverse);
        }
        bytes
    }
}

/// A chain of codecs, an array to bytes codec followed by bytes to bytes codecs.
#[derive(Clone, Debug)]
pub struct CodecChain {
    array_to_bytes: BytesCodec,
    bytes_to_bytes: Vec<Arc<dyn BytesToBytesCodecTraits>>,
}

impl CodecChain {
    /// Create a new codec chain.
    #[must_use]
    pub fn new(
        array_to_bytes: BytesCodec,
        bytes_to_bytes: Vec<Arc<dyn BytesToBytesCodecTraits>>,
    ) -> Self {
        Self {
            array_to_bytes,
            bytes_to_bytes,
        }
    }

    /// The default codec chain: little endian `bytes`, then `gzip` when the `gzip` feature is enabled.
    #[must_use]
    pub fn default_codecs() -> Self {
        #[cfg(feature = "gzip")]
        let bytes_to_bytes: Vec<Arc<dyn BytesToBytesCodecTraits>> =
            vec![Arc::new(GzipCodec::default())];
        #[cfg(not(feature = "gzip"))]
        let bytes_to_bytes: Vec<Arc<dyn BytesToBytesCodecTraits>> = vec![];
        Self::new(BytesCodec::default(), bytes_to_bytes)
    }

    /// Create a codec chain from metadata.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError::UnsupportedCodec`] if a codec is not supported or its configuration is invalid.
    pub fn from_metadata(metadatas: &[MetadataV3]) -> Result<Self, ArrayCreateError> {
        let unsupported = |metadata: &MetadataV3| ArrayCreateError::UnsupportedCodec(metadata.to_string());
        let Some((first, rest)) = metadatas.split_first() else {
            return Err(ArrayCreateError::UnsupportedCodec(
                "an array to bytes codec is required".to_string(),
            ));
        };
        if first.name() != BytesCodec::NAME {
            return Err(unsupported(first));
        }
        let configuration: BytesCodecConfiguration =
            first.to_configuration().map_err(|_| unsupported(first))?;
        let mut bytes_to_bytes: Vec<Arc<dyn BytesToBytesCodecTraits>> = Vec::with_capacity(rest.len());
        for metadata in rest {
            match metadata.name() {
                #[cfg(feature = "gzip")]
                GzipCodec::NAME => {
                    let configuration: GzipCodecConfiguration =
                        metadata.to_configuration().map_err(|_| unsupported(metadata))?;
                    let codec = GzipCodec::new(configuration.level).map_err(|_| unsupported(metadata))?;
                    bytes_to_bytes.push(Arc::new(codec));
                }
                _ => return Err(unsupported(metadata)),
            }
        }
        Ok(Self::new(BytesCodec::new(configuration.endian), bytes_to_bytes))
    }

    /// Create the metadata of the codec chain.
    #[must_use]
    pub fn create_metadatas(&self) -> Vec<MetadataV3> {
        std::iter::once(self.array_to_bytes.create_metadata())
            .chain(self.bytes_to_bytes.iter().map(|codec| codec.create_metadata()))
            .collect()
    }

    /// Encode decoded (little endian) chunk bytes.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails.
    pub fn encode(&self, decoded_value: Vec<u8>, element_size: usize) -> Result<Vec<u8>, CodecError> {
        let mut value = self.array_to_bytes.swap(decoded_value, element_size);
        for codec in &self.bytes_to_bytes {
            value = codec.encode(value)?;
        }
        Ok(value)
    }

    /// Decode encoded chunk bytes into decoded (little endian) bytes of `decoded_size`.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails or the decoded size is unexpected.
    pub fn decode(
        &self,
        encoded_value: Vec<u8>,
        element_size: usize,
        decoded_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let mut value = encoded_value;
        for codec in self.bytes_to_bytes.iter().rev() {
            value = codec.decode(value)?;
        }
        if value.len() != decoded_size {
            return Err(CodecError::UnexpectedDecodedSize(value.len(), decoded_size));
        }
        Ok(self.array_to_bytes.swap(value, element_size))
    }
}
